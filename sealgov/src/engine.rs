//! The request orchestrator.
//!
//! Every request moves through the same stages: it is received, validated, dispatched to the
//! tally or auction path, computed, certified and returned. A request that fails validation is
//! rejected; one that fails after dispatch has failed. Either way the caller gets a structured
//! error and no partial result.

use crate::*;
use ed25519_dalek::{PublicKey, SecretKey};
use std::collections::HashSet;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Limits the engine enforces on every request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub min_modulus_bits: u64,
    pub max_choice_value: u64,
    pub max_ballots: usize,
    pub max_bids: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            min_modulus_bits: 2048,
            max_choice_value: 1,
            max_ballots: 1_000_000,
            max_bids: 100_000,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Dispatched,
    Computed,
    Certified,
    Returned,
    Rejected,
    Failed,
}

/// Stage tracking for one request
struct Invocation<'r> {
    kind: &'static str,
    subject: &'r str,
    stage: Stage,
}

impl<'r> Invocation<'r> {
    fn new(kind: &'static str, subject: &'r str) -> Self {
        debug!(kind, subject, stage = ?Stage::Received, "request received");
        Invocation {
            kind,
            subject,
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(kind = self.kind, subject = self.subject, from = ?self.stage, to = ?next, "stage");
        self.stage = next;
    }

    /// Record an error. Before dispatch it is a rejection, after it a failure.
    fn end(&mut self, e: Error) -> Error {
        let next = match self.stage {
            Stage::Received | Stage::Validated => Stage::Rejected,
            _ => Stage::Failed,
        };
        self.advance(next);
        match next {
            Stage::Rejected => {
                warn!(kind = self.kind, subject = self.subject, error = %e.kind(), "request rejected")
            }
            _ => error!(kind = self.kind, subject = self.subject, error = %e, "request failed"),
        }
        e
    }
}

/// A validated request, ready for computation
enum Dispatch<'k> {
    Tally {
        keypair: &'k KeyPair,
        request: ProposalTallyRequest,
    },
    Auction(AuctionResolutionRequest),
}

/// A serialized reply with its HTTP-equivalent status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// The trusted computation engine.
///
/// Holds the key material and nothing else; each request is handled on its own and no state
/// survives between requests. Shared references may be used from many threads at once.
pub struct Engine {
    config: EngineConfig,
    keys: KeyRing,
    bid_secret: Option<SecretKey>,
    certifier: Certifier,
}

impl Engine {
    pub fn new(config: EngineConfig, keys: KeyRing) -> Result<Self, Error> {
        for epoch in keys.epochs() {
            let params = &keys.get(epoch)?.public;
            if params.bits() < config.min_modulus_bits {
                return Err(Error::InsecureParameters(format!(
                    "epoch {} has a {} bit modulus, at least {} required",
                    epoch,
                    params.bits(),
                    config.min_modulus_bits
                )));
            }
        }
        Ok(Engine {
            config,
            keys,
            bid_secret: None,
            certifier: Certifier::new(),
        })
    }

    /// Build an engine from a key file: every Paillier epoch, the bid key and the signing key.
    pub fn from_key_file(config: EngineConfig, key_file: &KeyFile) -> Result<Self, Error> {
        let keys = key_file.keyring(config.min_modulus_bits)?;
        Ok(Engine::new(config, keys)?
            .with_bid_key(key_file.bid_secret()?)
            .with_signing_key(key_file.signing_secret()?))
    }

    /// Accept ECIES-sealed bids addressed to this key
    pub fn with_bid_key(mut self, secret: SecretKey) -> Self {
        self.bid_secret = Some(secret);
        self
    }

    /// Sign every certificate with this key
    pub fn with_signing_key(mut self, secret: SecretKey) -> Self {
        self.certifier = Certifier::with_signing_key(secret);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn current_parameters(&self) -> Option<&PublicParameters> {
        self.keys
            .current_epoch()
            .and_then(|epoch| self.keys.public_parameters(epoch))
    }

    pub fn bid_public_key(&self) -> Option<BidPublicKey> {
        self.bid_secret.as_ref().map(BidPublicKey::from_secret)
    }

    pub fn signer_public_key(&self) -> Option<&PublicKey> {
        self.certifier.public_key()
    }

    /// Decode, process and encode one request body, stamped with the current time
    pub fn handle(&self, body: &[u8]) -> Reply {
        self.handle_at(body, now_millis())
    }

    pub fn handle_at(&self, body: &[u8], computed_at: u64) -> Reply {
        let outcome = Request::from_bytes(body)
            .map_err(|e| {
                warn!(error = %e.kind(), "undecodable request");
                e
            })
            .and_then(|request| self.process_at(request, computed_at));

        match outcome {
            Ok(response) => Reply {
                status: 200,
                body: encode(&response),
            },
            Err(e) => Reply {
                status: e.status().code(),
                body: encode(&ErrorResponse::from(&e)),
            },
        }
    }

    pub fn process(&self, request: Request) -> Result<Response, Error> {
        self.process_at(request, now_millis())
    }

    /// Process a decoded request with an explicit computation time
    pub fn process_at(&self, request: Request, computed_at: u64) -> Result<Response, Error> {
        let kind = request.type_name();
        let subject = request.subject_id().to_owned();
        let mut invocation = Invocation::new(kind, &subject);

        let dispatch = self.validate(request).map_err(|e| invocation.end(e))?;
        invocation.advance(Stage::Validated);
        invocation.advance(Stage::Dispatched);

        let response = match dispatch {
            Dispatch::Tally { keypair, request } => {
                let result = tally(keypair, self.config.max_choice_value, &request, computed_at)
                    .map_err(|e| invocation.end(e))?;
                invocation.advance(Stage::Computed);
                let certified = self.certifier.seal(result).map_err(|e| invocation.end(e))?;
                invocation.advance(Stage::Certified);
                Response::from(certified)
            }
            Dispatch::Auction(request) => {
                let opener = BidOpener::new(self.bid_secret.as_ref());
                let result = resolve_auction(&opener, &request, computed_at)
                    .map_err(|e| invocation.end(e))?;
                invocation.advance(Stage::Computed);
                let certified = self.certifier.seal(result).map_err(|e| invocation.end(e))?;
                invocation.advance(Stage::Certified);
                Response::from(certified)
            }
        };

        invocation.advance(Stage::Returned);
        info!(kind, subject = %subject, "request processed");
        Ok(response)
    }

    fn validate(&self, request: Request) -> Result<Dispatch, Error> {
        match request {
            Request::Vote(vote) => self.validate_vote(vote),
            Request::Bid(bid) => self.validate_bid(bid),
        }
    }

    fn validate_vote(&self, vote: VoteRequest) -> Result<Dispatch, Error> {
        if vote.encrypted_votes.len() > self.config.max_ballots {
            return Err(Error::MalformedRequest(format!(
                "{} ballots exceed the limit of {}",
                vote.encrypted_votes.len(),
                self.config.max_ballots
            )));
        }

        let mut request = ProposalTallyRequest {
            proposal_id: vote.proposal_id,
            ballots: Vec::with_capacity(vote.encrypted_votes.len()),
            choice_set: vote.vote_options,
        };
        request.validate()?;

        let default_epoch = match vote.key_epoch.or_else(|| self.keys.current_epoch()) {
            Some(epoch) => epoch,
            None => return Err(Error::KeyNotFound(0)),
        };

        // All ballots of one tally must share a parameter set
        let epoch = match vote.encrypted_votes.first() {
            Some(first) => first.epoch.unwrap_or(default_epoch),
            None => default_epoch,
        };
        let keypair = self.keys.get(epoch)?;
        let codec = BallotCodec::new(&keypair.public, self.config.max_choice_value);

        let options: HashSet<&ChoiceTag> = request.choice_set.iter().collect();
        let mut ballots = Vec::with_capacity(vote.encrypted_votes.len());
        for (index, ballot) in vote.encrypted_votes.into_iter().enumerate() {
            if !options.contains(&ballot.option) {
                return Err(Error::UnknownChoice(ballot.option.to_string()));
            }
            let ballot_epoch = ballot.epoch.unwrap_or(default_epoch);
            if ballot_epoch != epoch {
                return Err(Error::ParameterMismatch(format!(
                    "ballot {} uses epoch {}, expected {}",
                    index, ballot_epoch, epoch
                )));
            }
            let ciphertext = codec.decode(ballot.encrypted_value).map_err(|e| match e {
                Error::MalformedCiphertext(reason) => {
                    Error::MalformedCiphertext(format!("ballot {}: {}", index, reason))
                }
                other => other,
            })?;
            ballots.push(EncryptedBallot {
                choice: ballot.option,
                ciphertext,
            });
        }
        request.ballots = ballots;

        Ok(Dispatch::Tally { keypair, request })
    }

    fn validate_bid(&self, bid: BidRequest) -> Result<Dispatch, Error> {
        if bid.sealed_bids.len() > self.config.max_bids {
            return Err(Error::MalformedRequest(format!(
                "{} bids exceed the limit of {}",
                bid.sealed_bids.len(),
                self.config.max_bids
            )));
        }

        let request = AuctionResolutionRequest {
            auction_id: bid.project_id,
            bids: bid.sealed_bids.into_iter().map(SealedBid::from).collect(),
        };
        request.validate()?;

        Ok(Dispatch::Auction(request))
    }
}

fn encode<T: Serialize>(body: &T) -> Vec<u8> {
    serde_json::to_vec(body).unwrap_or_else(|e| {
        error!(error = %e, "could not encode reply");
        br#"{"error":"CertificationInputInvalid","details":"reply could not be encoded"}"#.to_vec()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paillier::tests::test_keypair;

    fn test_config() -> EngineConfig {
        EngineConfig {
            min_modulus_bits: 512,
            ..EngineConfig::default()
        }
    }

    fn test_engine() -> Engine {
        let mut keys = KeyRing::new(512);
        keys.insert(test_keypair(1, 11)).unwrap();
        Engine::new(test_config(), keys).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.min_modulus_bits, 2048);
        assert_eq!(config.max_choice_value, 1);
    }

    #[test]
    fn test_engine_rejects_small_modulus() {
        let mut keys = KeyRing::new(512);
        keys.insert(test_keypair(1, 11)).unwrap();
        let result = Engine::new(EngineConfig::default(), keys);
        assert!(matches!(result, Err(Error::InsecureParameters(_))));
    }

    #[test]
    fn test_missing_epoch() {
        let engine = test_engine();
        let request = Request::Vote(VoteRequest {
            proposal_id: "p".to_owned(),
            encrypted_votes: vec![],
            vote_options: default_choice_set(),
            key_epoch: Some(9),
        });
        let err = engine.process_at(request, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyNotFound);
    }

    #[test]
    fn test_ballot_limit() {
        let mut keys = KeyRing::new(512);
        keys.insert(test_keypair(1, 11)).unwrap();
        let config = EngineConfig {
            max_ballots: 1,
            ..test_config()
        };
        let engine = Engine::new(config, keys).unwrap();
        let ballot = WireBallot {
            option: "inFavor".into(),
            encrypted_value: num_bigint::BigUint::from(1u32),
            epoch: None,
        };
        let request = Request::Vote(VoteRequest {
            proposal_id: "p".to_owned(),
            encrypted_votes: vec![ballot.clone(), ballot],
            vote_options: default_choice_set(),
            key_epoch: None,
        });
        let err = engine.process_at(request, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    }

    #[test]
    fn test_unknown_format() {
        let engine = test_engine();
        let reply = engine.handle_at(b"", 1);
        assert_eq!(reply.status, 400);
        let body: ErrorResponse = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(body.error, ErrorKind::MalformedRequest);
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}
