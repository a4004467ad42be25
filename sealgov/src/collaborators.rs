//! Collaborators outside the trusted boundary. They only ever see certified results and
//! aggregates, never ballots or bid amounts other than the winner's.

use crate::*;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Where certified results get archived
pub trait ResultSink {
    fn put(&mut self, key: &str, blob: &[u8]) -> io::Result<()>;
}

/// Writes each blob to a file named by its key
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Use `root` as the archive directory, creating it if needed
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(DirectorySink { root })
    }
}

impl ResultSink for DirectorySink {
    fn put(&mut self, key: &str, blob: &[u8]) -> io::Result<()> {
        if key.is_empty() || key.contains(|c: char| c == '/' || c == '\\') || key.starts_with('.') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unusable archive key {:?}", key),
            ));
        }
        std::fs::write(self.root.join(key), blob)
    }
}

/// An in-memory sink
#[derive(Default, Debug)]
pub struct MemorySink {
    pub blobs: BTreeMap<String, Vec<u8>>,
}

impl ResultSink for MemorySink {
    fn put(&mut self, key: &str, blob: &[u8]) -> io::Result<()> {
        self.blobs.insert(key.to_owned(), blob.to_vec());
        Ok(())
    }
}

/// Summary stored next to an archived result
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub result_key: String,
    pub root_hash: Fingerprint,
    pub timestamp: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_votes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bids: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
}

/// Keys written by `archive`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub result_key: String,
    pub metadata_key: String,
}

/// Store a response and its metadata record. Any sink failure is returned as is.
pub fn archive<S: ResultSink + ?Sized>(
    sink: &mut S,
    response: &Response,
) -> io::Result<ArchiveReceipt> {
    let id = key_safe(response.subject_id());
    let (result_key, metadata_key) = match response {
        Response::VoteResults(_) => (
            format!("vote_results_{}_{}.json", id, response.timestamp()),
            format!("vote_{}", id),
        ),
        Response::AuctionResults(_) => (
            format!("auction_results_{}_{}.json", id, response.timestamp()),
            format!("auction_{}", id),
        ),
    };

    let mut metadata = ArchiveMetadata {
        result_key: result_key.clone(),
        root_hash: response.certificate().fingerprint,
        timestamp: response.timestamp(),
        total_votes: None,
        total_bids: None,
        winner: None,
    };
    match response {
        Response::VoteResults(vote) => metadata.total_votes = Some(vote.total_votes),
        Response::AuctionResults(auction) => {
            metadata.total_bids = Some(auction.total_bids);
            metadata.winner = auction.winner.clone();
        }
    }

    let body = serde_json::to_vec_pretty(response)?;
    sink.put(&result_key, &body)?;
    let metadata = serde_json::to_vec_pretty(&metadata)?;
    sink.put(&metadata_key, &metadata)?;

    Ok(ArchiveReceipt {
        result_key,
        metadata_key,
    })
}

/// Escapes every byte outside `[A-Za-z0-9-]` as `_xx`, so distinct ids keep distinct keys
fn key_safe(id: &str) -> String {
    let mut key = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            key.push(b as char);
        } else {
            key.push_str(&format!("_{:02x}", b));
        }
    }
    key
}

/// Aggregate view of a vote, all a narrative generator gets to see
#[derive(Debug, Clone, PartialEq)]
pub struct VoteSummary {
    pub proposal_id: String,
    pub counts: IndexMap<ChoiceTag, u64>,
    pub total_votes: u64,
}

/// Aggregate view of an auction
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionSummary {
    pub project_id: String,
    pub total_bids: u64,
    pub excluded_bids: u64,
    pub winning_amount: Option<u64>,
}

impl From<&VoteResults> for VoteSummary {
    fn from(vote: &VoteResults) -> Self {
        VoteSummary {
            proposal_id: vote.proposal_id.clone(),
            counts: vote.results.clone(),
            total_votes: vote.total_votes,
        }
    }
}

impl From<&AuctionResults> for AuctionSummary {
    fn from(auction: &AuctionResults) -> Self {
        AuctionSummary {
            project_id: auction.project_id.clone(),
            total_bids: auction.total_bids,
            excluded_bids: auction.excluded_bids,
            winning_amount: auction.winning_amount,
        }
    }
}

/// Turns aggregates into prose for humans
pub trait NarrativeGenerator {
    fn vote_insight(&self, summary: &VoteSummary) -> String;
    fn auction_insight(&self, summary: &AuctionSummary) -> String;

    fn insight(&self, response: &Response) -> String {
        match response {
            Response::VoteResults(vote) => self.vote_insight(&VoteSummary::from(vote)),
            Response::AuctionResults(auction) => {
                self.auction_insight(&AuctionSummary::from(auction))
            }
        }
    }
}

/// Fixed sentence templates
#[derive(Default, Debug, Clone, Copy)]
pub struct TemplateNarrative;

/// Bid count from which interest counts as high
const HIGH_INTEREST_BIDS: u64 = 3;

impl NarrativeGenerator for TemplateNarrative {
    fn vote_insight(&self, summary: &VoteSummary) -> String {
        if summary.total_votes == 0 {
            return format!("Proposal {} received no votes.", summary.proposal_id);
        }
        let count = |tag: &str| summary.counts.get(&ChoiceTag::from(tag)).copied().unwrap_or(0);
        let in_favor = count("inFavor");
        let against = count("against");
        let support = if in_favor > against { "strong" } else { "limited" };

        let mut text = format!(
            "Proposal {} received {} votes. There appears to be {} support",
            summary.proposal_id, summary.total_votes, support
        );
        let decided = u128::from(in_favor) + u128::from(against);
        if decided > 0 {
            let approval = u128::from(in_favor) * 100 / decided;
            text.push_str(&format!(" ({}% approval)", approval));
        }
        text.push('.');
        text
    }

    fn auction_insight(&self, summary: &AuctionSummary) -> String {
        let amount = match summary.winning_amount {
            Some(amount) => amount,
            None if summary.total_bids == 0 => {
                return format!("Project {} received no bids.", summary.project_id)
            }
            None => {
                return format!(
                    "Project {} received {} bids and none could be accepted.",
                    summary.project_id, summary.total_bids
                )
            }
        };

        let interest = if summary.total_bids >= HIGH_INTEREST_BIDS {
            "high"
        } else {
            "limited"
        };
        let reserve = (u128::from(amount) * 4 / 5) as u64;
        format!(
            "Project {} received {} bids, suggesting {} community interest. The winning bid was {}. \
             Recommend setting the reserve price at {} (80% of the winning amount) for future rounds.",
            summary.project_id, summary.total_bids, interest, amount, reserve
        )
    }
}
