use crate::config::Config;
use anyhow::{Context, Result};
use sealgov::Response;

pub fn command_verify(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let filename = matches.value_of("INPUT").unwrap_or_default();
    let bytes = std::fs::read(filename).with_context(|| format!("unable to read {}", filename))?;
    let response = Response::from_bytes(&bytes)?;

    // Only pin the signer when we know which engine to expect
    let signer = if matches.is_present("params") || config.key_file.exists() {
        Some(crate::read_public_info(matches, config)?.signer()?)
    } else {
        None
    };

    response.verify(signer.as_ref())?;
    println!(
        "verified {}: {}",
        response.subject_id(),
        response.certificate().fingerprint
    );
    Ok(())
}
