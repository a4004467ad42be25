//! Paillier cryptosystem with explicit, epoch-tagged parameters.
//!
//! Encryption of `m` under `(n, g)` is `g^m * r^n mod n^2`. Multiplying two ciphertexts mod
//! `n^2` yields an encryption of the sum of their plaintexts, which is all the tally needs.
//! Nothing in here is global: every operation is handed the parameters it works under.

use crate::*;
use num_bigint::prime::probably_prime;
use num_bigint::{BigUint, ModInverse, RandBigInt, RandPrime, ToBigUint};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};

/// Miller-Rabin rounds applied to primes loaded from outside, on top of the Lucas test
const PRIMALITY_ROUNDS: usize = 20;

/// Identifies one concrete parameter set: a digest over epoch, `n` and `g`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParameterId([u8; 32]);

impl std::fmt::Display for ParameterId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Public parameters for one key epoch.
///
/// Treated as immutable configuration: rotating keys means a new epoch, never editing one.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicParameters {
    pub epoch: u32,

    #[serde(with = "decimal")]
    pub n: BigUint,

    #[serde(with = "decimal")]
    pub g: BigUint,
}

impl PublicParameters {
    /// Build parameters with the standard generator `g = n + 1`
    pub fn new(epoch: u32, n: BigUint) -> Self {
        let g = &n + BigUint::one();
        PublicParameters { epoch, n, g }
    }

    pub fn n_squared(&self) -> BigUint {
        &self.n * &self.n
    }

    /// Bit length of the modulus
    pub fn bits(&self) -> u64 {
        self.n.bits() as u64
    }

    pub fn id(&self) -> ParameterId {
        let mut hasher = Sha256::new();
        hasher.update(b"sealgov/paillier-parameters/v1");
        hasher.update(&self.epoch.to_be_bytes());
        let n = self.n.to_bytes_be();
        hasher.update(&(n.len() as u64).to_be_bytes());
        hasher.update(&n);
        hasher.update(&self.g.to_bytes_be());

        let mut id = [0u8; 32];
        id.copy_from_slice(&hasher.finalize());
        ParameterId(id)
    }

    /// Structural sanity: `n > 1`, `g` a unit mod `n^2`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.n <= BigUint::one() || self.n.is_even() {
            return Err(Error::InsecureParameters(format!(
                "epoch {}: modulus must be odd and greater than one",
                self.epoch
            )));
        }
        let n_squared = self.n_squared();
        if self.g.is_zero() || self.g >= n_squared || !self.g.gcd(&self.n).is_one() {
            return Err(Error::InsecureParameters(format!(
                "epoch {}: generator is not a unit modulo n^2",
                self.epoch
            )));
        }
        Ok(())
    }

    /// Encrypt `m` with caller supplied randomness `r`, which must lie in `[1, n)` and be
    /// coprime with `n`.
    ///
    /// `r` must be fresh for every encryption. Reusing it for two encryptions of the same
    /// plaintext makes the ciphertexts equal, which nothing in here can detect.
    pub fn encrypt(&self, m: &BigUint, r: &BigUint) -> Result<Ciphertext, Error> {
        if r.is_zero() || r >= &self.n || !r.gcd(&self.n).is_one() {
            return Err(Error::InvalidRandomness);
        }
        let n_squared = self.n_squared();
        let gm = self.g.modpow(m, &n_squared);
        let rn = r.modpow(&self.n, &n_squared);

        Ok(Ciphertext {
            params: self.id(),
            epoch: self.epoch,
            value: (gm * rn) % n_squared,
        })
    }

    /// Sample randomness suitable for `encrypt`
    pub fn random_nonce<R: Rng + CryptoRng + ?Sized>(&self, rng: &mut R) -> BigUint {
        let one = BigUint::one();
        loop {
            let r = rng.gen_biguint_range(&one, &self.n);
            if r.gcd(&self.n).is_one() {
                return r;
            }
        }
    }

    /// The encryption of zero with `r = 1`, identity of `add`
    pub fn zero(&self) -> Ciphertext {
        Ciphertext {
            params: self.id(),
            epoch: self.epoch,
            value: BigUint::one(),
        }
    }

    /// Adopt a raw ciphertext value received from outside, checking it is in range.
    pub fn ciphertext(&self, value: BigUint) -> Result<Ciphertext, Error> {
        if value.is_zero() || value >= self.n_squared() {
            return Err(Error::MalformedCiphertext(format!(
                "value out of range for epoch {}",
                self.epoch
            )));
        }
        if !value.gcd(&self.n).is_one() {
            return Err(Error::MalformedCiphertext(format!(
                "value is not a unit modulo n^2 for epoch {}",
                self.epoch
            )));
        }
        Ok(Ciphertext {
            params: self.id(),
            epoch: self.epoch,
            value,
        })
    }

    /// Homomorphic addition: the result decrypts to the sum of the two plaintexts mod `n`.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, Error> {
        let id = self.id();
        for c in [a, b].iter() {
            if c.params != id {
                return Err(Error::ParameterMismatch(format!(
                    "ciphertext from epoch {} ({}) combined under epoch {} ({})",
                    c.epoch, c.params, self.epoch, id
                )));
            }
        }

        Ok(Ciphertext {
            params: id,
            epoch: self.epoch,
            value: (&a.value * &b.value) % self.n_squared(),
        })
    }
}

/// An opaque Paillier ciphertext, bound to the parameters that produced it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    params: ParameterId,
    epoch: u32,
    value: BigUint,
}

impl Ciphertext {
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn parameter_id(&self) -> ParameterId {
        self.params
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }
}

/// Private half of a Paillier key. Never leaves the process that created or loaded it.
#[derive(Clone)]
pub(crate) struct PrivateKey {
    p: BigUint,
    q: BigUint,
    lambda: BigUint,
    mu: BigUint,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Secret key material as stored in a key file
#[derive(Serialize, Deserialize, Clone)]
pub struct PaillierSecret {
    pub epoch: u32,

    #[serde(with = "decimal")]
    pub p: BigUint,

    #[serde(with = "decimal")]
    pub q: BigUint,
}

/// A Paillier key pair for one epoch
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: PublicParameters,
    secret: PrivateKey,
}

impl KeyPair {
    /// Generate a fresh key pair with a modulus of `bits` bits
    pub fn generate<R: Rng + CryptoRng + ?Sized>(
        bits: u64,
        epoch: u32,
        rng: &mut R,
    ) -> Result<Self, Error> {
        if bits < 16 {
            return Err(Error::InsecureParameters(format!(
                "cannot generate a {} bit modulus",
                bits
            )));
        }
        let half = (bits / 2) as usize;
        loop {
            let p = rng.gen_prime(half);
            let q = rng.gen_prime(bits as usize - half);
            if p == q {
                continue;
            }
            match KeyPair::assemble(epoch, p, q) {
                Ok(keypair) => return Ok(keypair),
                Err(Error::InsecureParameters(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Build a key pair from two known primes
    pub fn from_primes(epoch: u32, p: BigUint, q: BigUint) -> Result<Self, Error> {
        if p == q {
            return Err(Error::InsecureParameters("p and q must differ".to_owned()));
        }
        if !probably_prime(&p, PRIMALITY_ROUNDS) || !probably_prime(&q, PRIMALITY_ROUNDS) {
            return Err(Error::InsecureParameters("p and q must be prime".to_owned()));
        }
        KeyPair::assemble(epoch, p, q)
    }

    // p and q are distinct primes from here on
    fn assemble(epoch: u32, p: BigUint, q: BigUint) -> Result<Self, Error> {
        let one = BigUint::one();
        let n = &p * &q;
        let p_minus_one = &p - &one;
        let q_minus_one = &q - &one;
        let phi = &p_minus_one * &q_minus_one;
        if !n.gcd(&phi).is_one() {
            return Err(Error::InsecureParameters(
                "gcd(n, (p-1)(q-1)) must be 1".to_owned(),
            ));
        }

        let public = PublicParameters::new(epoch, n);
        let lambda = p_minus_one.lcm(&q_minus_one);
        let n_squared = public.n_squared();
        let u = public.g.modpow(&lambda, &n_squared);
        let mu = l_function(&u, &public.n)
            .mod_inverse(&public.n)
            .and_then(|inverse| inverse.to_biguint())
            .ok_or_else(|| {
                Error::InsecureParameters("generator has no inverse for this modulus".to_owned())
            })?;

        Ok(KeyPair {
            public,
            secret: PrivateKey { p, q, lambda, mu },
        })
    }

    pub fn from_secret(secret: &PaillierSecret) -> Result<Self, Error> {
        KeyPair::from_primes(secret.epoch, secret.p.clone(), secret.q.clone())
    }

    pub fn to_secret(&self) -> PaillierSecret {
        PaillierSecret {
            epoch: self.public.epoch,
            p: self.secret.p.clone(),
            q: self.secret.q.clone(),
        }
    }

    pub fn epoch(&self) -> u32 {
        self.public.epoch
    }

    /// Recover the plaintext of `c`. Only ever called inside the tally.
    pub(crate) fn decrypt(&self, c: &Ciphertext) -> Result<BigUint, Error> {
        let id = self.public.id();
        if c.params != id {
            return Err(Error::ParameterMismatch(format!(
                "ciphertext from epoch {} ({}) decrypted under epoch {} ({})",
                c.epoch, c.params, self.public.epoch, id
            )));
        }
        let n_squared = self.public.n_squared();
        let u = c.value.modpow(&self.secret.lambda, &n_squared);
        Ok((l_function(&u, &self.public.n) * &self.secret.mu) % &self.public.n)
    }

    /// Decrypt an aggregate and refuse counts above `upper_bound`.
    ///
    /// A count larger than the number of contributing ballots means the sum wrapped the
    /// modulus or a ciphertext lied about its plaintext; either way the number is not a count.
    pub fn decrypt_count(&self, aggregate: &Ciphertext, upper_bound: u64) -> Result<u64, Error> {
        let plain = self.decrypt(aggregate)?;
        match plain.to_u64() {
            Some(count) if count <= upper_bound => Ok(count),
            _ => Err(Error::DecryptedCountOutOfBounds(format!(
                "aggregate exceeds the bound of {} under epoch {}",
                upper_bound, self.public.epoch
            ))),
        }
    }
}

fn l_function(u: &BigUint, n: &BigUint) -> BigUint {
    (u - BigUint::one()) / n
}
