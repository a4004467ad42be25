use anyhow::Result;
use clap::{App, AppSettings, Arg, SubCommand};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod command_encrypt_vote;
mod command_insight;
mod command_keygen;
mod command_params;
mod command_process;
mod command_seal_bid;
mod command_verify;
mod config;

use command_encrypt_vote::command_encrypt_vote;
use command_insight::command_insight;
use command_keygen::command_keygen;
use command_params::command_params;
use command_process::command_process;
use command_seal_bid::command_seal_bid;
use command_verify::command_verify;
use config::Config;

#[derive(TryFromPrimitive, PartialEq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Verbosity {
    Silent = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl Verbosity {
    fn level(self) -> Option<Level> {
        match self {
            Verbosity::Silent => None,
            Verbosity::Error => Some(Level::ERROR),
            Verbosity::Warn => Some(Level::WARN),
            Verbosity::Info => Some(Level::INFO),
            Verbosity::Debug => Some(Level::DEBUG),
        }
    }
}

fn main() {
    let input_arg = |help| Arg::with_name("INPUT").index(1).required(true).help(help);
    let params_arg = || {
        Arg::with_name("params")
            .long("params")
            .takes_value(true)
            .help("Public parameters file written by `sealgov params`; defaults to the key file")
    };

    let matches = App::new("SealGov")
        .version("0.1")
        .about("Tallies encrypted votes and resolves sealed-bid auctions")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("keys")
                .long("keys")
                .takes_value(true)
                .global(true)
                .help("Key file - can also be set with SEALGOV_KEY_FILE"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("keygen")
                .about("Generate a key file, or add a new epoch to an existing one")
                .arg(
                    Arg::with_name("bits")
                        .long("bits")
                        .takes_value(true)
                        .help("Paillier modulus size in bits"),
                )
                .arg(
                    Arg::with_name("epoch")
                        .long("epoch")
                        .takes_value(true)
                        .default_value("1")
                        .help("Epoch of the first key pair"),
                )
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .takes_value(true)
                        .help("Where to write the key file"),
                )
                .arg(
                    Arg::with_name("rotate")
                        .long("rotate")
                        .help("Add a new current epoch to the existing key file"),
                ),
        )
        .subcommand(
            SubCommand::with_name("params")
                .about("Print the public parameters, bid key and signer key"),
        )
        .subcommand(
            SubCommand::with_name("encrypt-vote")
                .about("Encrypt one ballot")
                .arg(
                    Arg::with_name("option")
                        .long("option")
                        .takes_value(true)
                        .required(true)
                        .help("Option the ballot counts towards, e.g. inFavor"),
                )
                .arg(
                    Arg::with_name("value")
                        .long("value")
                        .takes_value(true)
                        .default_value("1")
                        .help("Choice value"),
                )
                .arg(params_arg()),
        )
        .subcommand(
            SubCommand::with_name("seal-bid")
                .about("Seal one bid")
                .arg(
                    Arg::with_name("bidder")
                        .long("bidder")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("amount")
                        .long("amount")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("commitment")
                        .long("commitment")
                        .help("Use a hash commitment instead of encrypting to the bid key"),
                )
                .arg(params_arg()),
        )
        .subcommand(
            SubCommand::with_name("process")
                .about("Run a vote or bid request through the engine")
                .arg(input_arg("Request file in JSON or CBOR format"))
                .arg(
                    Arg::with_name("archive")
                        .long("archive")
                        .takes_value(true)
                        .help("Archive directory - can also be set with SEALGOV_ARCHIVE_DIR"),
                ),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Check the fingerprint and signature of a response")
                .arg(input_arg("Response file"))
                .arg(params_arg()),
        )
        .subcommand(
            SubCommand::with_name("insight")
                .about("Describe a response in plain language")
                .arg(input_arg("Response file")),
        )
        .get_matches();

    let verbosity = Verbosity::try_from(matches.occurrences_of("v").min(2) as u8 + 2)
        .unwrap_or(Verbosity::Warn);
    if let Some(level) = verbosity.level() {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("sealgov: unable to set up logging: {}", e);
        }
    }

    if let Err(e) = run(&matches) {
        eprintln!("sealgov: {:#}", e);
        std::process::exit(1);
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(keys) = matches.value_of("keys") {
        config.key_file = expand(keys).into();
    }

    match matches.subcommand() {
        ("keygen", Some(matches)) => command_keygen(matches, &config),
        ("params", Some(_)) => command_params(&config),
        ("encrypt-vote", Some(matches)) => command_encrypt_vote(matches, &config),
        ("seal-bid", Some(matches)) => command_seal_bid(matches, &config),
        ("process", Some(matches)) => command_process(matches, &config),
        ("verify", Some(matches)) => command_verify(matches, &config),
        ("insight", Some(matches)) => command_insight(matches),
        _ => unreachable!("clap requires a subcommand"),
    }
}

pub fn expand(input: &str) -> String {
    shellexpand::tilde(input).into_owned()
}

/// Read the key file named by the configuration
pub fn read_key_file(config: &Config) -> Result<sealgov::KeyFile> {
    use anyhow::Context;

    let bytes = std::fs::read(&config.key_file)
        .with_context(|| format!("unable to read {}", config.key_file.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a key file", config.key_file.display()))
}

/// Public parameters from `--params`, or derived from the key file
pub fn read_public_info(
    matches: &clap::ArgMatches,
    config: &Config,
) -> Result<sealgov::PublicInfo> {
    use anyhow::Context;

    match matches.value_of("params") {
        Some(path) => {
            let path = expand(path);
            let bytes =
                std::fs::read(&path).with_context(|| format!("unable to read {}", path))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("{} is not a parameters file", path))
        }
        None => Ok(read_key_file(config)?.public_info()?),
    }
}
