use crate::*;
use content_inspector::ContentType;
use num_bigint::BigUint;

/// A request as it arrives at the engine
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Vote(VoteRequest),
    Bid(BidRequest),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub proposal_id: String,
    pub encrypted_votes: Vec<WireBallot>,

    #[serde(default = "default_choice_set")]
    pub vote_options: Vec<ChoiceTag>,

    /// Parameter epoch for ballots that do not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_epoch: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireBallot {
    pub option: ChoiceTag,

    #[serde(with = "decimal")]
    pub encrypted_value: BigUint,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    pub project_id: String,
    pub sealed_bids: Vec<WireBid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireBid {
    pub bidder: String,
    pub amount: CommittedValue,
}

impl Request {
    /// Decode a request body, JSON or CBOR.
    ///
    /// Small CBOR documents often carry no NUL byte, so a body that sniffs as
    /// text but is not valid UTF-8 is also treated as CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match content_inspector::inspect(bytes) {
            ContentType::UTF_8 if std::str::from_utf8(bytes).is_ok() => {
                Ok(serde_json::from_slice(bytes)?)
            }
            ContentType::UTF_8 | ContentType::BINARY => Ok(serde_cbor::from_slice(bytes)?),
            _ => Err(Error::UnknownFormat),
        }
    }

    /// The proposal or project this request is about
    pub fn subject_id(&self) -> &str {
        match self {
            Request::Vote(vote) => &vote.proposal_id,
            Request::Bid(bid) => &bid.project_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Vote(_) => "vote",
            Request::Bid(_) => "bid",
        }
    }
}

impl From<WireBid> for SealedBid {
    fn from(bid: WireBid) -> Self {
        SealedBid {
            bidder_id: bid.bidder,
            committed_amount: bid.amount,
        }
    }
}
