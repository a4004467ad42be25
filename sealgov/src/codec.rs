use crate::*;
use num_bigint::BigUint;
use rand::{CryptoRng, Rng};

/// Encodes single ballot selections under one set of public parameters.
///
/// The plaintext domain is `0..=max_choice_value`, agreed out-of-band with the key holder.
/// With the default maximum of 1 a ballot is an encryption of "1" filed under the chosen option.
#[derive(Clone, Copy, Debug)]
pub struct BallotCodec<'a> {
    params: &'a PublicParameters,
    max_choice_value: u64,
}

impl<'a> BallotCodec<'a> {
    pub fn new(params: &'a PublicParameters, max_choice_value: u64) -> Self {
        BallotCodec {
            params,
            max_choice_value,
        }
    }

    pub fn params(&self) -> &'a PublicParameters {
        self.params
    }

    pub fn max_choice_value(&self) -> u64 {
        self.max_choice_value
    }

    /// Encrypt a choice value with explicit randomness
    pub fn encrypt(&self, choice_value: u64, randomness: &BigUint) -> Result<Ciphertext, Error> {
        if choice_value > self.max_choice_value {
            return Err(Error::InvalidChoiceValue {
                value: choice_value,
                max: self.max_choice_value,
            });
        }
        self.params
            .encrypt(&BigUint::from(choice_value), randomness)
    }

    /// Encrypt a choice value with randomness drawn from `rng`
    pub fn encrypt_with_rng<R: Rng + CryptoRng + ?Sized>(
        &self,
        choice_value: u64,
        rng: &mut R,
    ) -> Result<Ciphertext, Error> {
        let randomness = self.params.random_nonce(rng);
        self.encrypt(choice_value, &randomness)
    }

    pub fn combine(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, Error> {
        self.params.add(a, b)
    }

    /// Encryption of zero, the starting point of every aggregate
    pub fn identity(&self) -> Ciphertext {
        self.params.zero()
    }

    /// Accept a ciphertext value off the wire
    pub fn decode(&self, value: BigUint) -> Result<Ciphertext, Error> {
        self.params.ciphertext(value)
    }
}
