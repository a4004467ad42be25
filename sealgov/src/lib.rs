//! Tallying of homomorphically encrypted ballots and resolution of sealed-bid auctions,
//! meant to run inside a trusted execution environment.
//!
//! Callers hand an [`Engine`] a request and get back a certified aggregate: per-option counts
//! for a vote, or the winner for an auction. Individual ballots are never decrypted and losing
//! bid amounts never leave the engine.

#[macro_use]
extern crate serde;

mod ballot;
mod bid;
mod certify;
mod codec;
mod collaborators;
pub mod ecies;
mod engine;
mod error;
mod keyring;
mod paillier;
mod request;
mod response;
mod serde_bigint;
mod tally;
mod util;

pub use ballot::*;
pub use bid::*;
pub use certify::*;
pub use codec::*;
pub use collaborators::*;
pub use ecies::{generate_bid_key, BidPublicKey};
pub use engine::*;
pub use error::*;
pub use keyring::*;
pub use paillier::*;
pub use request::*;
pub use response::*;
pub use serde_bigint::*;
pub use tally::*;
pub use util::*;
