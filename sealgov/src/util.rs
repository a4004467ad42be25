use ed25519_dalek::{Keypair, PublicKey, SecretKey};
use rand::rngs::OsRng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fresh ed25519 key pair from the OS rng
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let keypair = Keypair::generate(&mut OsRng);
    (keypair.secret, keypair.public)
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let (secret, public) = generate_keypair();
        assert_eq!(PublicKey::from(&secret), public);
        let (other, _) = generate_keypair();
        assert_ne!(secret.as_bytes(), other.as_bytes());
    }
}
