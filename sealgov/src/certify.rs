//! Result fingerprints.
//!
//! A fingerprint is SHA-256 over the CBOR encoding of a canonical record: fixed field order,
//! counts keyed by option in sorted order, integers at fixed width, and a domain tag so a vote
//! record can never collide with an auction record. Two engines computing the same logical
//! result produce the same fingerprint.
//!
//! When the engine holds a signing key the fingerprint is also signed, binding the result to
//! the attested engine instance.

use crate::*;
use ed25519_dalek::{ExpandedSecretKey, PublicKey, SecretKey, Signature};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::str::FromStr;

pub const VOTE_RESULTS_DOMAIN: &str = "sealgov/vote-results/v1";
pub const AUCTION_RESULTS_DOMAIN: &str = "sealgov/auction-results/v1";

/// SHA-256 digest over a result's canonical form
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|_| Error::MalformedRequest("fingerprint is not hexadecimal".to_owned()))?;
        let bytes = <[u8; 32]>::try_from(bytes.as_slice())
            .map_err(|_| Error::MalformedRequest("fingerprint must be 32 bytes".to_owned()))?;
        Ok(Fingerprint(bytes))
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A result with a canonical byte form that can be fingerprinted
pub trait Certifiable {
    /// Canonical bytes, or `CertificationInputInvalid` if the result is not internally
    /// consistent enough to describe unambiguously.
    fn canonical_bytes(&self) -> Result<Vec<u8>, Error>;

    fn fingerprint(&self) -> Result<Fingerprint, Error> {
        let bytes = self.canonical_bytes()?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(&bytes));
        Ok(Fingerprint(digest))
    }
}

#[derive(Serialize)]
struct CanonicalTally<'a> {
    domain: &'static str,
    proposal_id: &'a str,
    key_epoch: u32,
    counts: BTreeMap<&'a str, u64>,
    total_count: u64,
    computed_at: u64,
}

#[derive(Serialize)]
struct CanonicalAuction<'a> {
    domain: &'static str,
    auction_id: &'a str,
    winner_id: Option<&'a str>,
    winning_amount: Option<u64>,
    total_bids: u64,
    excluded_bids: u64,
    computed_at: u64,
}

fn invalid<T>(reason: &str) -> Result<T, Error> {
    Err(Error::CertificationInputInvalid(reason.to_owned()))
}

impl Certifiable for TallyResult {
    fn canonical_bytes(&self) -> Result<Vec<u8>, Error> {
        if self.proposal_id.is_empty() {
            return invalid("tally has no proposal id");
        }
        if self.per_choice_counts.is_empty() {
            return invalid("tally has no options");
        }

        let mut counts = BTreeMap::new();
        let mut sum: u64 = 0;
        for (choice, count) in self.per_choice_counts.iter() {
            if choice.as_str().is_empty() {
                return invalid("tally has an empty option");
            }
            if counts.insert(choice.as_str(), *count).is_some() {
                return invalid("tally repeats an option");
            }
            sum = match sum.checked_add(*count) {
                Some(sum) => sum,
                None => return invalid("tally counts overflow"),
            };
        }
        if sum != self.total_count {
            return invalid("tally total does not match its counts");
        }

        let canonical = CanonicalTally {
            domain: VOTE_RESULTS_DOMAIN,
            proposal_id: &self.proposal_id,
            key_epoch: self.key_epoch,
            counts,
            total_count: self.total_count,
            computed_at: self.computed_at,
        };
        serde_cbor::to_vec(&canonical).map_err(|e| Error::CertificationInputInvalid(e.to_string()))
    }
}

impl Certifiable for AuctionResult {
    fn canonical_bytes(&self) -> Result<Vec<u8>, Error> {
        if self.auction_id.is_empty() {
            return invalid("auction has no id");
        }
        if self.winner_id.is_some() != self.winning_amount.is_some() {
            return invalid("auction winner and winning amount must come together");
        }
        if self.winner_id.as_deref() == Some("") {
            return invalid("auction winner is empty");
        }
        if self.excluded_bids > self.total_bids {
            return invalid("auction excludes more bids than it received");
        }
        if self.winner_id.is_some() && self.excluded_bids == self.total_bids {
            return invalid("auction has a winner but no admissible bid");
        }

        let canonical = CanonicalAuction {
            domain: AUCTION_RESULTS_DOMAIN,
            auction_id: &self.auction_id,
            winner_id: self.winner_id.as_deref(),
            winning_amount: self.winning_amount,
            total_bids: self.total_bids,
            excluded_bids: self.excluded_bids,
            computed_at: self.computed_at,
        };
        serde_cbor::to_vec(&canonical).map_err(|e| Error::CertificationInputInvalid(e.to_string()))
    }
}

/// Fingerprint plus, when available, the engine's signature over it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub fingerprint: Fingerprint,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<HexBytes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_public_key: Option<HexBytes>,
}

/// Raw bytes written as hex
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(#[serde(with = "hex_serde")] pub Vec<u8>);

/// A result together with its certificate
#[derive(Debug, Clone, PartialEq)]
pub struct Certified<T> {
    pub result: T,
    pub certificate: Certificate,
}

/// Stamps results with fingerprints, signing them when given a key
pub struct Certifier {
    signer: Option<(SecretKey, PublicKey)>,
}

impl Certifier {
    pub fn new() -> Self {
        Certifier { signer: None }
    }

    pub fn with_signing_key(secret: SecretKey) -> Self {
        let public = PublicKey::from(&secret);
        Certifier {
            signer: Some((secret, public)),
        }
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        self.signer.as_ref().map(|(_, public)| public)
    }

    pub fn certify<T: Certifiable>(&self, result: &T) -> Result<Certificate, Error> {
        let fingerprint = result.fingerprint()?;

        let (signature, signer_public_key) = match &self.signer {
            Some((secret, public)) => {
                let expanded: ExpandedSecretKey = secret.into();
                let signature = expanded.sign(fingerprint.as_bytes(), public);
                (
                    Some(HexBytes(signature.to_bytes().to_vec())),
                    Some(HexBytes(public.as_bytes().to_vec())),
                )
            }
            None => (None, None),
        };

        Ok(Certificate {
            fingerprint,
            signature,
            signer_public_key,
        })
    }

    pub fn seal<T: Certifiable>(&self, result: T) -> Result<Certified<T>, Error> {
        let certificate = self.certify(&result)?;
        Ok(Certified {
            result,
            certificate,
        })
    }
}

impl Default for Certifier {
    fn default() -> Self {
        Certifier::new()
    }
}

/// Check a certificate against the result it claims to describe.
///
/// With `trusted_signer` set, the certificate must be signed by exactly that key.
pub fn verify_certificate<T: Certifiable>(
    result: &T,
    certificate: &Certificate,
    trusted_signer: Option<&PublicKey>,
) -> Result<(), Error> {
    let fingerprint = result
        .fingerprint()
        .map_err(|e| Error::VerificationFailed(e.to_string()))?;
    if fingerprint != certificate.fingerprint {
        return Err(Error::VerificationFailed(
            "fingerprint does not match the result".to_owned(),
        ));
    }

    match (&certificate.signature, &certificate.signer_public_key) {
        (Some(signature), Some(signer)) => {
            let signer = PublicKey::from_bytes(&signer.0)
                .map_err(|e| Error::VerificationFailed(format!("signer key: {}", e)))?;
            if let Some(trusted) = trusted_signer {
                if trusted != &signer {
                    return Err(Error::VerificationFailed(
                        "signed by an unexpected key".to_owned(),
                    ));
                }
            }
            let signature = Signature::try_from(signature.0.as_slice())
                .map_err(|e| Error::VerificationFailed(format!("signature: {}", e)))?;
            signer
                .verify_strict(fingerprint.as_bytes(), &signature)
                .map_err(|e| Error::VerificationFailed(format!("signature: {}", e)))
        }
        (None, None) if trusted_signer.is_none() => Ok(()),
        (None, None) => Err(Error::VerificationFailed("certificate is unsigned".to_owned())),
        _ => Err(Error::VerificationFailed(
            "signature and signer key must come together".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn tally_result() -> TallyResult {
        let mut counts = IndexMap::new();
        counts.insert(ChoiceTag::new("inFavor"), 3);
        counts.insert(ChoiceTag::new("against"), 1);
        counts.insert(ChoiceTag::new("abstain"), 0);
        TallyResult {
            proposal_id: "7".to_owned(),
            key_epoch: 1,
            per_choice_counts: counts,
            total_count: 4,
            computed_at: 1_700_000_000_000,
        }
    }

    fn auction_result() -> AuctionResult {
        AuctionResult {
            auction_id: "p1".to_owned(),
            winner_id: Some("A".to_owned()),
            winning_amount: Some(100),
            total_bids: 3,
            excluded_bids: 0,
            computed_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = tally_result().fingerprint().unwrap();
        let b = tally_result().fingerprint().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string().len(), 64);

        // Declaration order of the options is not part of the logical result
        let mut reordered = tally_result();
        reordered.per_choice_counts = reordered.per_choice_counts.into_iter().rev().collect();
        assert_eq!(reordered.fingerprint().unwrap(), a);
    }

    #[test]
    fn test_fingerprint_tracks_every_field() {
        let base = tally_result().fingerprint().unwrap();

        let mut changed = tally_result();
        changed.proposal_id = "8".to_owned();
        assert_ne!(changed.fingerprint().unwrap(), base);

        let mut changed = tally_result();
        changed.computed_at += 1;
        assert_ne!(changed.fingerprint().unwrap(), base);

        let mut changed = tally_result();
        changed.key_epoch = 2;
        assert_ne!(changed.fingerprint().unwrap(), base);

        let mut changed = tally_result();
        changed.per_choice_counts.insert("inFavor".into(), 2);
        changed.per_choice_counts.insert("against".into(), 2);
        assert_ne!(changed.fingerprint().unwrap(), base);

        let auction = auction_result().fingerprint().unwrap();
        let mut changed = auction_result();
        changed.winning_amount = Some(101);
        assert_ne!(changed.fingerprint().unwrap(), auction);
        let mut changed = auction_result();
        changed.winner_id = Some("B".to_owned());
        assert_ne!(changed.fingerprint().unwrap(), auction);
        let mut changed = auction_result();
        changed.total_bids = 4;
        assert_ne!(changed.fingerprint().unwrap(), auction);
        let mut changed = auction_result();
        changed.excluded_bids = 1;
        assert_ne!(changed.fingerprint().unwrap(), auction);
        let mut changed = auction_result();
        changed.auction_id = "p2".to_owned();
        assert_ne!(changed.fingerprint().unwrap(), auction);
        let mut changed = auction_result();
        changed.computed_at += 1;
        assert_ne!(changed.fingerprint().unwrap(), auction);
    }

    #[test]
    fn test_inconsistent_results_rejected() {
        let mut bad = tally_result();
        bad.total_count = 5;
        assert!(matches!(
            bad.fingerprint(),
            Err(Error::CertificationInputInvalid(_))
        ));

        let mut bad = auction_result();
        bad.winning_amount = None;
        assert!(matches!(
            bad.fingerprint(),
            Err(Error::CertificationInputInvalid(_))
        ));

        let mut bad = auction_result();
        bad.excluded_bids = 3;
        assert!(matches!(
            bad.fingerprint(),
            Err(Error::CertificationInputInvalid(_))
        ));
    }

    #[test]
    fn test_signed_certificate() {
        let (secret, public) = generate_keypair();
        let certifier = Certifier::with_signing_key(secret);
        let certified = certifier.seal(auction_result()).unwrap();

        verify_certificate(&certified.result, &certified.certificate, Some(&public)).unwrap();

        let mut tampered = certified.result.clone();
        tampered.winning_amount = Some(1);
        assert!(matches!(
            verify_certificate(&tampered, &certified.certificate, Some(&public)),
            Err(Error::VerificationFailed(_))
        ));

        let (_, stranger) = generate_keypair();
        assert!(verify_certificate(&certified.result, &certified.certificate, Some(&stranger))
            .is_err());
    }

    #[test]
    fn test_unsigned_certificate() {
        let certified = Certifier::new().seal(tally_result()).unwrap();
        assert!(certified.certificate.signature.is_none());
        verify_certificate(&certified.result, &certified.certificate, None).unwrap();

        let (_, public) = generate_keypair();
        assert!(verify_certificate(&certified.result, &certified.certificate, Some(&public))
            .is_err());
    }

    #[test]
    fn test_fingerprint_hex() {
        let fingerprint = tally_result().fingerprint().unwrap();
        let parsed: Fingerprint = fingerprint.to_string().parse().unwrap();
        assert_eq!(parsed, fingerprint);
        assert!("abcd".parse::<Fingerprint>().is_err());
    }
}
