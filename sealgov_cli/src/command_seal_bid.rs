use crate::config::Config;
use anyhow::{Context, Result};
use sealgov::{CommittedValue, WireBid};

pub fn command_seal_bid(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let bidder = matches.value_of("bidder").unwrap_or_default().to_owned();
    let amount: u64 = matches
        .value_of("amount")
        .unwrap_or_default()
        .parse()
        .context("--amount must be a non-negative whole number")?;

    let mut rng = rand::rngs::OsRng;
    let amount = if matches.is_present("commitment") {
        CommittedValue::commit(amount, &mut rng)
    } else {
        let info = crate::read_public_info(matches, config)?;
        CommittedValue::seal(&info.bid_public_key, amount, &mut rng)?
    };

    let bid = WireBid { bidder, amount };
    println!("{}", serde_json::to_string_pretty(&bid)?);
    Ok(())
}
