use crate::*;
use ed25519_dalek::PublicKey;
use indexmap::IndexMap;

/// A certified result as it leaves the engine
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    VoteResults(VoteResults),
    AuctionResults(AuctionResults),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteResults {
    pub proposal_id: String,
    pub timestamp: u64,
    pub results: IndexMap<ChoiceTag, u64>,
    pub total_votes: u64,
    pub key_epoch: u32,
    pub results_hash: Fingerprint,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<HexBytes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_public_key: Option<HexBytes>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionResults {
    pub project_id: String,
    pub timestamp: u64,
    pub winner: Option<String>,
    pub winning_amount: Option<u64>,
    pub total_bids: u64,

    #[serde(default)]
    pub excluded_bids: u64,
    pub results_hash: Fingerprint,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<HexBytes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_public_key: Option<HexBytes>,
}

/// Body returned for a failed request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub details: String,
}

impl From<&Error> for ErrorResponse {
    fn from(e: &Error) -> Self {
        ErrorResponse {
            error: e.kind(),
            details: e.to_string(),
        }
    }
}

impl From<Certified<TallyResult>> for Response {
    fn from(certified: Certified<TallyResult>) -> Self {
        let Certified {
            result,
            certificate,
        } = certified;
        Response::VoteResults(VoteResults {
            proposal_id: result.proposal_id,
            timestamp: result.computed_at,
            results: result.per_choice_counts,
            total_votes: result.total_count,
            key_epoch: result.key_epoch,
            results_hash: certificate.fingerprint,
            signature: certificate.signature,
            signer_public_key: certificate.signer_public_key,
        })
    }
}

impl From<Certified<AuctionResult>> for Response {
    fn from(certified: Certified<AuctionResult>) -> Self {
        let Certified {
            result,
            certificate,
        } = certified;
        Response::AuctionResults(AuctionResults {
            project_id: result.auction_id,
            timestamp: result.computed_at,
            winner: result.winner_id,
            winning_amount: result.winning_amount,
            total_bids: result.total_bids,
            excluded_bids: result.excluded_bids,
            results_hash: certificate.fingerprint,
            signature: certificate.signature,
            signer_public_key: certificate.signer_public_key,
        })
    }
}

impl VoteResults {
    pub fn tally_result(&self) -> TallyResult {
        TallyResult {
            proposal_id: self.proposal_id.clone(),
            key_epoch: self.key_epoch,
            per_choice_counts: self.results.clone(),
            total_count: self.total_votes,
            computed_at: self.timestamp,
        }
    }
}

impl AuctionResults {
    pub fn auction_result(&self) -> AuctionResult {
        AuctionResult {
            auction_id: self.project_id.clone(),
            winner_id: self.winner.clone(),
            winning_amount: self.winning_amount,
            total_bids: self.total_bids,
            excluded_bids: self.excluded_bids,
            computed_at: self.timestamp,
        }
    }
}

impl Response {
    /// Decode a response previously produced by an engine (JSON or CBOR)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match std::str::from_utf8(bytes) {
            Ok(_) => Ok(serde_json::from_slice(bytes)?),
            Err(_) => Ok(serde_cbor::from_slice(bytes)?),
        }
    }

    pub fn subject_id(&self) -> &str {
        match self {
            Response::VoteResults(vote) => &vote.proposal_id,
            Response::AuctionResults(auction) => &auction.project_id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Response::VoteResults(vote) => vote.timestamp,
            Response::AuctionResults(auction) => auction.timestamp,
        }
    }

    pub fn certificate(&self) -> Certificate {
        let (fingerprint, signature, signer_public_key) = match self {
            Response::VoteResults(v) => (&v.results_hash, &v.signature, &v.signer_public_key),
            Response::AuctionResults(a) => (&a.results_hash, &a.signature, &a.signer_public_key),
        };
        Certificate {
            fingerprint: *fingerprint,
            signature: signature.clone(),
            signer_public_key: signer_public_key.clone(),
        }
    }

    /// Recompute the fingerprint from the response body and check it, along with any signature.
    pub fn verify(&self, trusted_signer: Option<&PublicKey>) -> Result<(), Error> {
        let certificate = self.certificate();
        match self {
            Response::VoteResults(vote) => {
                verify_certificate(&vote.tally_result(), &certificate, trusted_signer)
            }
            Response::AuctionResults(auction) => {
                verify_certificate(&auction.auction_result(), &certificate, trusted_signer)
            }
        }
    }
}
