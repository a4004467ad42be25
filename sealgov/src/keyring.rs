use crate::*;
use ed25519_dalek::{PublicKey, SecretKey};
use rand::{CryptoRng, Rng};
use std::collections::BTreeMap;

/// Paillier key pairs by epoch.
///
/// Old and new epochs live side by side during a rotation. The ring is built once and then only
/// read, so one ring can serve any number of concurrent tallies.
#[derive(Debug)]
pub struct KeyRing {
    keys: BTreeMap<u32, KeyPair>,
    current: Option<u32>,
    min_modulus_bits: u64,
}

impl KeyRing {
    pub fn new(min_modulus_bits: u64) -> Self {
        KeyRing {
            keys: BTreeMap::new(),
            current: None,
            min_modulus_bits,
        }
    }

    /// Register a key pair. The newest epoch becomes current unless `set_current` says otherwise.
    pub fn insert(&mut self, keypair: KeyPair) -> Result<(), Error> {
        keypair.public.validate()?;
        if keypair.public.bits() < self.min_modulus_bits {
            return Err(Error::InsecureParameters(format!(
                "epoch {} has a {} bit modulus, at least {} required",
                keypair.epoch(),
                keypair.public.bits(),
                self.min_modulus_bits
            )));
        }

        let epoch = keypair.epoch();
        if self.keys.contains_key(&epoch) {
            return Err(Error::ParameterMismatch(format!(
                "epoch {} is already registered",
                epoch
            )));
        }
        self.keys.insert(epoch, keypair);
        if self.current.map_or(true, |current| epoch > current) {
            self.current = Some(epoch);
        }
        Ok(())
    }

    pub fn set_current(&mut self, epoch: u32) -> Result<(), Error> {
        if !self.keys.contains_key(&epoch) {
            return Err(Error::KeyNotFound(epoch));
        }
        self.current = Some(epoch);
        Ok(())
    }

    pub fn current_epoch(&self) -> Option<u32> {
        self.current
    }

    pub fn get(&self, epoch: u32) -> Result<&KeyPair, Error> {
        self.keys.get(&epoch).ok_or(Error::KeyNotFound(epoch))
    }

    pub fn public_parameters(&self, epoch: u32) -> Option<&PublicParameters> {
        self.keys.get(&epoch).map(|keypair| &keypair.public)
    }

    pub fn epochs(&self) -> impl Iterator<Item = u32> + '_ {
        self.keys.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Everything the engine needs to start, as written by `sealgov keygen`
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct KeyFile {
    pub current_epoch: u32,
    pub paillier: Vec<PaillierSecret>,

    #[serde(with = "hex_serde")]
    pub bid_secret_key: Vec<u8>,

    #[serde(with = "hex_serde")]
    pub signing_secret_key: Vec<u8>,
}

/// What clients need to encrypt ballots and seal bids, and verifiers need to check results
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicInfo {
    pub current_epoch: u32,
    pub parameters: Vec<PublicParameters>,
    pub bid_public_key: BidPublicKey,
    pub signer_public_key: HexBytes,
}

impl PublicInfo {
    pub fn current_parameters(&self) -> Option<&PublicParameters> {
        self.parameters
            .iter()
            .find(|params| params.epoch == self.current_epoch)
    }

    pub fn signer(&self) -> Result<PublicKey, Error> {
        PublicKey::from_bytes(&self.signer_public_key.0)
            .map_err(|e| Error::MalformedRequest(format!("signer public key: {}", e)))
    }
}

impl KeyFile {
    pub fn generate<R: Rng + CryptoRng>(bits: u64, epoch: u32, rng: &mut R) -> Result<Self, Error> {
        let keypair = KeyPair::generate(bits, epoch, rng)?;
        let (bid_secret, _) = generate_bid_key();
        let (signing_secret, _) = generate_keypair();

        Ok(KeyFile {
            current_epoch: epoch,
            paillier: vec![keypair.to_secret()],
            bid_secret_key: bid_secret.to_bytes().to_vec(),
            signing_secret_key: signing_secret.to_bytes().to_vec(),
        })
    }

    /// Add a fresh epoch and make it current. Earlier epochs stay so in-flight ballots still
    /// decrypt.
    pub fn rotate<R: Rng + CryptoRng>(&mut self, bits: u64, rng: &mut R) -> Result<u32, Error> {
        let epoch = self
            .paillier
            .iter()
            .map(|secret| secret.epoch)
            .max()
            .map_or(Some(1), |latest| latest.checked_add(1))
            .ok_or_else(|| Error::InsecureParameters("epoch counter exhausted".to_owned()))?;
        let keypair = KeyPair::generate(bits, epoch, rng)?;
        self.paillier.push(keypair.to_secret());
        self.current_epoch = epoch;
        Ok(epoch)
    }

    pub fn keyring(&self, min_modulus_bits: u64) -> Result<KeyRing, Error> {
        let mut ring = KeyRing::new(min_modulus_bits);
        for secret in self.paillier.iter() {
            ring.insert(KeyPair::from_secret(secret)?)?;
        }
        ring.set_current(self.current_epoch)?;
        Ok(ring)
    }

    pub fn bid_secret(&self) -> Result<SecretKey, Error> {
        SecretKey::from_bytes(&self.bid_secret_key)
            .map_err(|e| Error::InsecureParameters(format!("bid secret key: {}", e)))
    }

    pub fn signing_secret(&self) -> Result<SecretKey, Error> {
        SecretKey::from_bytes(&self.signing_secret_key)
            .map_err(|e| Error::InsecureParameters(format!("signing secret key: {}", e)))
    }

    pub fn public_info(&self) -> Result<PublicInfo, Error> {
        let mut parameters = Vec::with_capacity(self.paillier.len());
        for secret in self.paillier.iter() {
            parameters.push(KeyPair::from_secret(secret)?.public);
        }
        let signing_public = PublicKey::from(&self.signing_secret()?);

        Ok(PublicInfo {
            current_epoch: self.current_epoch,
            parameters,
            bid_public_key: BidPublicKey::from_secret(&self.bid_secret()?),
            signer_public_key: HexBytes(signing_public.as_bytes().to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paillier::tests::test_keypair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_minimum_modulus() {
        let mut ring = KeyRing::new(1024);
        assert!(matches!(
            ring.insert(test_keypair(1, 501)),
            Err(Error::InsecureParameters(_))
        ));
        assert!(ring.is_empty());

        let mut ring = KeyRing::new(512);
        ring.insert(test_keypair(1, 501)).unwrap();
        assert_eq!(ring.current_epoch(), Some(1));
    }

    #[test]
    fn test_rotation() {
        let mut ring = KeyRing::new(512);
        ring.insert(test_keypair(1, 502)).unwrap();
        ring.insert(test_keypair(2, 503)).unwrap();
        assert_eq!(ring.current_epoch(), Some(2));
        assert!(ring.get(1).is_ok());
        assert!(matches!(ring.get(3), Err(Error::KeyNotFound(3))));
        assert!(matches!(
            ring.insert(test_keypair(2, 504)),
            Err(Error::ParameterMismatch(_))
        ));

        ring.set_current(1).unwrap();
        assert_eq!(ring.current_epoch(), Some(1));
        assert_eq!(ring.epochs().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_key_file() {
        let mut rng = ChaCha20Rng::seed_from_u64(505);
        let mut file = KeyFile::generate(512, 1, &mut rng).unwrap();
        assert_eq!(file.rotate(512, &mut rng).unwrap(), 2);

        let json = serde_json::to_string(&file).unwrap();
        let file: KeyFile = serde_json::from_str(&json).unwrap();

        let ring = file.keyring(512).unwrap();
        assert_eq!(ring.current_epoch(), Some(2));

        let info = file.public_info().unwrap();
        assert_eq!(info.parameters.len(), 2);
        assert_eq!(
            info.current_parameters(),
            ring.public_parameters(2)
        );
        assert_eq!(
            info.signer().unwrap(),
            PublicKey::from(&file.signing_secret().unwrap())
        );
    }
}
