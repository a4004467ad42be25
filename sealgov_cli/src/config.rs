use anyhow::{Context, Result};
use sealgov::EngineConfig;
use std::env::var;
use std::path::PathBuf;

pub struct Config {
    pub key_file: PathBuf,
    pub engine: EngineConfig,
    pub archive_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let key_file = match var("SEALGOV_KEY_FILE") {
            Ok(val) => PathBuf::from(crate::expand(&val)),
            Err(_e) => PathBuf::from("./sealgov-keys.json"),
        };

        let mut engine = EngineConfig::default();
        if let Ok(val) = var("SEALGOV_MIN_MODULUS_BITS") {
            engine.min_modulus_bits = val
                .parse()
                .context("SEALGOV_MIN_MODULUS_BITS must be a number")?;
        }
        if let Ok(val) = var("SEALGOV_MAX_CHOICE_VALUE") {
            engine.max_choice_value = val
                .parse()
                .context("SEALGOV_MAX_CHOICE_VALUE must be a number")?;
        }

        let archive_dir = var("SEALGOV_ARCHIVE_DIR")
            .ok()
            .map(|val| PathBuf::from(crate::expand(&val)));

        Ok(Config {
            key_file,
            engine,
            archive_dir,
        })
    }
}
