use crate::config::Config;
use anyhow::Result;

pub fn command_params(config: &Config) -> Result<()> {
    let info = crate::read_key_file(config)?.public_info()?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
