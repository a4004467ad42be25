use crate::*;
use ed25519_dalek::SecretKey;
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, warn};

const COMMITMENT_DOMAIN: &[u8] = b"sealgov/bid-commitment/v1";

/// A bid amount hidden from everyone but the engine
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum CommittedValue {
    /// The amount in decimal, sealed to the engine's bid key
    Ecies {
        #[serde(with = "hex_serde")]
        ciphertext: Vec<u8>,
    },

    /// A hash commitment published earlier, revealed to the engine here
    Commitment {
        #[serde(with = "hex_serde")]
        commitment: Vec<u8>,

        #[serde(with = "hex_serde")]
        salt: Vec<u8>,

        /// Decimal amount, exactly as committed
        amount: String,
    },
}

impl CommittedValue {
    /// Seal an amount to the engine's bid key
    pub fn seal<R: Rng + CryptoRng>(
        receiver: &BidPublicKey,
        amount: u64,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let ciphertext = ecies::seal(receiver, amount.to_string().as_bytes(), rng)?;
        Ok(CommittedValue::Ecies { ciphertext })
    }

    /// Commit to an amount with a random salt
    pub fn commit<R: Rng + CryptoRng>(amount: u64, rng: &mut R) -> Self {
        let mut salt = vec![0u8; 32];
        rng.fill(salt.as_mut_slice());
        let amount = amount.to_string();
        CommittedValue::Commitment {
            commitment: commitment_digest(&salt, &amount),
            salt,
            amount,
        }
    }
}

/// `SHA-256(domain || len(salt) || salt || amount)`
pub fn commitment_digest(salt: &[u8], amount: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(COMMITMENT_DOMAIN);
    hasher.update(&(salt.len() as u64).to_be_bytes());
    hasher.update(salt);
    hasher.update(amount.as_bytes());
    hasher.finalize().to_vec()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SealedBid {
    pub bidder_id: String,
    pub committed_amount: CommittedValue,
}

/// Bids for one auction, in arrival order
#[derive(Clone, Debug)]
pub struct AuctionResolutionRequest {
    pub auction_id: String,
    pub bids: Vec<SealedBid>,
}

impl AuctionResolutionRequest {
    pub fn validate(&self) -> Result<(), Error> {
        if self.auction_id.trim().is_empty() {
            return Err(Error::MalformedRequest("projectId is empty".to_owned()));
        }
        let mut bidders = HashSet::with_capacity(self.bids.len());
        for bid in self.bids.iter() {
            if bid.bidder_id.trim().is_empty() {
                return Err(Error::MalformedRequest("bidder is empty".to_owned()));
            }
            if !bidders.insert(bid.bidder_id.as_str()) {
                return Err(Error::MalformedRequest(format!(
                    "bidder {} appears more than once",
                    bid.bidder_id
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of an auction, before certification. Losing amounts never make it in here.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuctionResult {
    pub auction_id: String,
    pub winner_id: Option<String>,
    pub winning_amount: Option<u64>,
    pub total_bids: u64,

    /// Bids left out because they could not be opened or held an invalid amount
    pub excluded_bids: u64,
    pub computed_at: u64,
}

/// Winner of a resolution
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub winner_id: Option<String>,
    pub winning_amount: Option<u64>,
    pub excluded: u64,
}

/// Reveals bid amounts. Holds the bid secret key when the engine accepts sealed envelopes.
pub struct BidOpener<'a> {
    secret: Option<&'a SecretKey>,
}

impl<'a> BidOpener<'a> {
    pub fn new(secret: Option<&'a SecretKey>) -> Self {
        BidOpener { secret }
    }

    /// Recover the plaintext amount of one bid
    pub fn reveal(&self, bid: &SealedBid) -> Result<u64, Error> {
        match &bid.committed_amount {
            CommittedValue::Ecies { ciphertext } => {
                let secret = self
                    .secret
                    .ok_or_else(|| Error::BidDecryption(bid.bidder_id.clone()))?;
                let plain = ecies::open(secret, ciphertext)
                    .ok_or_else(|| Error::BidDecryption(bid.bidder_id.clone()))?;
                let text = String::from_utf8(plain)
                    .map_err(|_| Error::InvalidBidAmount(bid.bidder_id.clone()))?;
                parse_amount(&bid.bidder_id, &text)
            }
            CommittedValue::Commitment {
                commitment,
                salt,
                amount,
            } => {
                if commitment_digest(salt, amount) != *commitment {
                    return Err(Error::InvalidBidAmount(bid.bidder_id.clone()));
                }
                parse_amount(&bid.bidder_id, amount)
            }
        }
    }
}

fn parse_amount(bidder: &str, text: &str) -> Result<u64, Error> {
    text.trim()
        .parse::<u64>()
        .map_err(|_| Error::InvalidBidAmount(bidder.to_owned()))
}

/// Pick the highest bid. Ties go to the bid that comes first in `bids`.
///
/// Bids that fail to reveal are skipped and counted; they never abort the resolution. If every
/// bid is skipped the result is the same as for no bids at all.
pub fn resolve(opener: &BidOpener, bids: &[SealedBid]) -> Resolution {
    let mut best: Option<(&str, u64)> = None;
    let mut excluded = 0u64;

    for bid in bids {
        let amount = match opener.reveal(bid) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(bidder = %bid.bidder_id, kind = %e.kind(), "bid excluded");
                excluded += 1;
                continue;
            }
        };
        let better = match best {
            Some((_, top)) => amount > top,
            None => true,
        };
        if better {
            best = Some((bid.bidder_id.as_str(), amount));
        }
    }

    Resolution {
        winner_id: best.map(|(bidder, _)| bidder.to_owned()),
        winning_amount: best.map(|(_, amount)| amount),
        excluded,
    }
}

/// Resolve a whole auction request
pub fn resolve_auction(
    opener: &BidOpener,
    request: &AuctionResolutionRequest,
    computed_at: u64,
) -> Result<AuctionResult, Error> {
    request.validate()?;
    let resolution = resolve(opener, &request.bids);

    debug!(
        auction_id = %request.auction_id,
        bids = request.bids.len(),
        excluded = resolution.excluded,
        has_winner = resolution.winner_id.is_some(),
        "auction resolved"
    );

    Ok(AuctionResult {
        auction_id: request.auction_id.clone(),
        winner_id: resolution.winner_id,
        winning_amount: resolution.winning_amount,
        total_bids: request.bids.len() as u64,
        excluded_bids: resolution.excluded,
        computed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn committed(bidder: &str, amount: &str, rng: &mut ChaCha20Rng) -> SealedBid {
        let mut salt = vec![0u8; 16];
        rng.fill(salt.as_mut_slice());
        SealedBid {
            bidder_id: bidder.to_owned(),
            committed_amount: CommittedValue::Commitment {
                commitment: commitment_digest(&salt, amount),
                salt,
                amount: amount.to_owned(),
            },
        }
    }

    #[test]
    fn test_tie_goes_to_first() {
        let mut rng = ChaCha20Rng::seed_from_u64(401);
        let bids = vec![
            committed("A", "100", &mut rng),
            committed("B", "100", &mut rng),
            committed("C", "50", &mut rng),
        ];
        let resolution = resolve(&BidOpener::new(None), &bids);
        assert_eq!(resolution.winner_id.as_deref(), Some("A"));
        assert_eq!(resolution.winning_amount, Some(100));
        assert_eq!(resolution.excluded, 0);
    }

    #[test]
    fn test_amounts_above_i64() {
        let mut rng = ChaCha20Rng::seed_from_u64(407);
        let bids = vec![
            committed("big", "10000000000000000000", &mut rng),
            committed("small", "5", &mut rng),
            committed("max", &u64::MAX.to_string(), &mut rng),
            committed("over", "18446744073709551616", &mut rng),
        ];
        let resolution = resolve(&BidOpener::new(None), &bids[..2]);
        assert_eq!(resolution.winner_id.as_deref(), Some("big"));
        assert_eq!(resolution.winning_amount, Some(10_000_000_000_000_000_000));
        assert_eq!(resolution.excluded, 0);

        let resolution = resolve(&BidOpener::new(None), &bids);
        assert_eq!(resolution.winner_id.as_deref(), Some("max"));
        assert_eq!(resolution.winning_amount, Some(u64::MAX));
        assert_eq!(resolution.excluded, 1);
    }

    #[test]
    fn test_no_bids() {
        let resolution = resolve(&BidOpener::new(None), &[]);
        assert_eq!(resolution, Resolution::default());
    }

    #[test]
    fn test_sealed_bids() {
        let (secret, public) = generate_bid_key();
        let mut rng = ChaCha20Rng::seed_from_u64(402);
        let bids: Vec<SealedBid> = [("0x123", 100u64), ("0x456", 200), ("0x789", 150)]
            .iter()
            .map(|(bidder, amount)| SealedBid {
                bidder_id: bidder.to_string(),
                committed_amount: CommittedValue::seal(&public, *amount, &mut rng).unwrap(),
            })
            .collect();

        let resolution = resolve(&BidOpener::new(Some(&secret)), &bids);
        assert_eq!(resolution.winner_id.as_deref(), Some("0x456"));
        assert_eq!(resolution.winning_amount, Some(200));

        // Without the key nothing can be opened
        let resolution = resolve(&BidOpener::new(None), &bids);
        assert_eq!(resolution.winner_id, None);
        assert_eq!(resolution.excluded, 3);
    }

    #[test]
    fn test_invalid_amounts_excluded() {
        let mut rng = ChaCha20Rng::seed_from_u64(403);
        let mut forged = committed("D", "900", &mut rng);
        if let CommittedValue::Commitment { amount, .. } = &mut forged.committed_amount {
            *amount = "9000".to_owned();
        }
        let bids = vec![
            committed("A", "-5", &mut rng),
            committed("B", "ten", &mut rng),
            committed("C", "40", &mut rng),
            forged,
        ];
        let opener = BidOpener::new(None);
        assert!(matches!(
            opener.reveal(&bids[0]),
            Err(Error::InvalidBidAmount(_))
        ));

        let resolution = resolve(&opener, &bids);
        assert_eq!(resolution.winner_id.as_deref(), Some("C"));
        assert_eq!(resolution.winning_amount, Some(40));
        assert_eq!(resolution.excluded, 3);
    }

    #[test]
    fn test_all_excluded() {
        let mut rng = ChaCha20Rng::seed_from_u64(404);
        let bids = vec![committed("A", "-1", &mut rng)];
        let resolution = resolve(&BidOpener::new(None), &bids);
        assert_eq!(resolution.winner_id, None);
        assert_eq!(resolution.winning_amount, None);
        assert_eq!(resolution.excluded, 1);
    }

    #[test]
    fn test_duplicate_bidders() {
        let mut rng = ChaCha20Rng::seed_from_u64(405);
        let request = AuctionResolutionRequest {
            auction_id: "p1".to_owned(),
            bids: vec![committed("A", "1", &mut rng), committed("A", "2", &mut rng)],
        };
        assert!(matches!(
            resolve_auction(&BidOpener::new(None), &request, 0),
            Err(Error::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_commit_helper() {
        let mut rng = ChaCha20Rng::seed_from_u64(406);
        let bid = SealedBid {
            bidder_id: "E".to_owned(),
            committed_amount: CommittedValue::commit(77, &mut rng),
        };
        assert_eq!(BidOpener::new(None).reveal(&bid).unwrap(), 77);
    }
}
