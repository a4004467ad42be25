use crate::config::Config;
use anyhow::{bail, Context, Result};
use sealgov::{archive, DirectorySink, Engine, Response};
use std::path::PathBuf;
use tracing::info;

pub fn command_process(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let filename = matches.value_of("INPUT").unwrap_or_default();
    let body = std::fs::read(filename).with_context(|| format!("unable to read {}", filename))?;

    let key_file = crate::read_key_file(config)?;
    let engine = Engine::from_key_file(config.engine.clone(), &key_file)?;

    let reply = engine.handle(&body);
    println!("{}", String::from_utf8_lossy(&reply.body));
    if !reply.is_success() {
        bail!("request failed with status {}", reply.status);
    }

    let archive_dir: Option<PathBuf> = matches
        .value_of("archive")
        .map(|dir| crate::expand(dir).into())
        .or_else(|| config.archive_dir.clone());
    if let Some(dir) = archive_dir {
        let response = Response::from_bytes(&reply.body)?;
        let mut sink = DirectorySink::new(&dir)
            .with_context(|| format!("unable to open archive {}", dir.display()))?;
        let receipt = archive(&mut sink, &response)
            .with_context(|| format!("unable to archive into {}", dir.display()))?;
        info!(
            result = %receipt.result_key,
            metadata = %receipt.metadata_key,
            "archived"
        );
    }
    Ok(())
}
