//! ECIES on Curve25519 for sealing bid amounts to the engine.
//!
//! A bidder derives a shared secret from a fresh ephemeral scalar and the engine's bid public
//! key, stretches it with HKDF-SHA256 and encrypts with AES-256-GCM. Only the holder of the bid
//! secret key can open the envelope, so amounts are readable inside the engine and nowhere else.
//!
//! Envelope layout: `ephemeral public key (32) || nonce (12) || ciphertext+tag`.

use crate::*;
use aes_gcm::aead::{generic_array::GenericArray, Aead, NewAead};
use aes_gcm::Aes256Gcm;
use curve25519_dalek::constants;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::SecretKey;
use hkdf::Hkdf;
use rand::{CryptoRng, Rng};
use sha2::Sha256;

const POINT_LENGTH: usize = 32;
const AES_IV_LENGTH: usize = 12;
const HKDF_INFO: &[u8] = b"sealgov/sealed-bid/v1";

type AesKey = [u8; 32];

/// Public key that bidders seal their amounts to.
///
/// Derived from the secret scalar directly, so it is not an ed25519 signing public key and must
/// not be used as one.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BidPublicKey(#[serde(with = "hex_serde")] Vec<u8>);

impl BidPublicKey {
    pub fn from_secret(sk: &SecretKey) -> Self {
        let point = &Scalar::from_bits(sk.to_bytes()) * &constants::ED25519_BASEPOINT_TABLE;
        BidPublicKey(point.compress().to_bytes().to_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        decompress(bytes)?;
        Some(BidPublicKey(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    fn as_point(&self) -> Option<EdwardsPoint> {
        decompress(&self.0)
    }
}

fn decompress(bytes: &[u8]) -> Option<EdwardsPoint> {
    if bytes.len() != POINT_LENGTH {
        return None;
    }
    CompressedEdwardsY::from_slice(bytes).decompress()
}

/// Generate a bid secret key
pub fn generate_bid_key() -> (SecretKey, BidPublicKey) {
    let (secret, _) = generate_keypair();
    let public = BidPublicKey::from_secret(&secret);
    (secret, public)
}

/// Seal `msg` so only the holder of the matching secret key can read it
pub fn seal<R: Rng + CryptoRng>(
    receiver: &BidPublicKey,
    msg: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, Error> {
    let receiver_point = receiver
        .as_point()
        .ok_or_else(|| Error::MalformedRequest("bid public key is not a curve point".to_owned()))?;

    let mut ephemeral = [0u8; 32];
    rng.fill(&mut ephemeral);
    let ephemeral = Scalar::from_bits(ephemeral);
    let ephemeral_public = (&ephemeral * &constants::ED25519_BASEPOINT_TABLE).compress();

    let shared = (receiver_point * ephemeral).compress();
    let key = derive_key(ephemeral_public.as_bytes(), shared.as_bytes());

    let mut nonce = [0u8; AES_IV_LENGTH];
    rng.fill(&mut nonce);
    let aead = Aes256Gcm::new(GenericArray::from_slice(&key));
    let encrypted = aead
        .encrypt(GenericArray::from_slice(&nonce), msg)
        .map_err(|_| Error::MalformedRequest("bid encryption failed".to_owned()))?;

    let mut envelope = Vec::with_capacity(POINT_LENGTH + AES_IV_LENGTH + encrypted.len());
    envelope.extend_from_slice(ephemeral_public.as_bytes());
    envelope.extend_from_slice(&nonce);
    envelope.extend(encrypted);
    Ok(envelope)
}

/// Open an envelope produced by `seal`. `None` if it is truncated, tampered with or sealed to
/// another key.
pub fn open(receiver: &SecretKey, envelope: &[u8]) -> Option<Vec<u8>> {
    if envelope.len() < POINT_LENGTH + AES_IV_LENGTH {
        return None;
    }
    let (ephemeral_public, rest) = envelope.split_at(POINT_LENGTH);
    let (nonce, encrypted) = rest.split_at(AES_IV_LENGTH);

    let ephemeral_point = decompress(ephemeral_public)?;
    let shared = (ephemeral_point * Scalar::from_bits(receiver.to_bytes())).compress();
    let key = derive_key(ephemeral_public, shared.as_bytes());

    let aead = Aes256Gcm::new(GenericArray::from_slice(&key));
    aead.decrypt(GenericArray::from_slice(nonce), encrypted).ok()
}

fn derive_key(ephemeral_public: &[u8], shared_point: &[u8]) -> AesKey {
    let mut master = Vec::with_capacity(POINT_LENGTH * 2);
    master.extend_from_slice(ephemeral_public);
    master.extend_from_slice(shared_point);

    let h = Hkdf::<Sha256>::new(None, &master);
    let mut out = [0u8; 32];
    // 32 bytes is far below the HKDF-SHA256 output limit
    h.expand(HKDF_INFO, &mut out)
        .expect("sealgov: 32 byte HKDF output is always valid");
    out
}
