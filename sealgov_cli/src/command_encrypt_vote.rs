use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use sealgov::{BallotCodec, ChoiceTag, WireBallot};

pub fn command_encrypt_vote(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let info = crate::read_public_info(matches, config)?;
    let params = info
        .current_parameters()
        .ok_or_else(|| anyhow!("no parameters for epoch {}", info.current_epoch))?;

    let option = ChoiceTag::new(matches.value_of("option").unwrap_or_default());
    let value: u64 = matches
        .value_of("value")
        .unwrap_or("1")
        .parse()
        .context("--value must be a number")?;

    let codec = BallotCodec::new(params, config.engine.max_choice_value);
    let ciphertext = codec.encrypt_with_rng(value, &mut rand::rngs::OsRng)?;

    let ballot = WireBallot {
        option,
        encrypted_value: ciphertext.value().clone(),
        epoch: Some(ciphertext.epoch()),
    };
    println!("{}", serde_json::to_string_pretty(&ballot)?);
    Ok(())
}
