use anyhow::{Context, Result};
use sealgov::{NarrativeGenerator, Response, TemplateNarrative};

pub fn command_insight(matches: &clap::ArgMatches) -> Result<()> {
    let filename = matches.value_of("INPUT").unwrap_or_default();
    let bytes = std::fs::read(filename).with_context(|| format!("unable to read {}", filename))?;
    let response = Response::from_bytes(&bytes)?;

    println!("{}", TemplateNarrative.insight(&response));
    Ok(())
}
