use crate::config::Config;
use anyhow::{bail, Context, Result};
use sealgov::KeyFile;
use std::path::PathBuf;
use tracing::info;

pub fn command_keygen(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let bits: u64 = match matches.value_of("bits") {
        Some(bits) => bits.parse().context("--bits must be a number")?,
        None => config.engine.min_modulus_bits,
    };
    if bits < config.engine.min_modulus_bits {
        bail!(
            "refusing to generate a {} bit modulus, the minimum is {}",
            bits,
            config.engine.min_modulus_bits
        );
    }
    let output: PathBuf = match matches.value_of("output") {
        Some(output) => crate::expand(output).into(),
        None => config.key_file.clone(),
    };

    let mut rng = rand::rngs::OsRng;
    let key_file = if matches.is_present("rotate") {
        let mut key_file = crate::read_key_file(&Config {
            key_file: output.clone(),
            engine: config.engine.clone(),
            archive_dir: None,
        })?;
        let epoch = key_file.rotate(bits, &mut rng)?;
        info!(epoch, bits, "added key epoch");
        key_file
    } else {
        if output.exists() {
            bail!(
                "{} already exists; use --rotate to add an epoch",
                output.display()
            );
        }
        let epoch: u32 = matches
            .value_of("epoch")
            .unwrap_or("1")
            .parse()
            .context("--epoch must be a number")?;
        let key_file = KeyFile::generate(bits, epoch, &mut rng)?;
        info!(epoch, bits, "generated key file");
        key_file
    };

    let json = serde_json::to_string_pretty(&key_file)?;
    std::fs::write(&output, json)
        .with_context(|| format!("unable to write {}", output.display()))?;

    println!("key file: {}", output.display());
    println!("current epoch: {}", key_file.current_epoch);
    Ok(())
}
