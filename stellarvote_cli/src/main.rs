use clap::{App, Arg, SubCommand};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use stellarvote::{Config, NetworkId};

mod command_decrypt;
mod command_keygen;
mod command_keys;
mod command_networks;
mod rest;

use command_decrypt::command_decrypt;
use command_keygen::command_keygen;
use command_keys::command_keys;
use command_networks::command_networks;

#[derive(TryFromPrimitive, PartialEq, Copy, Clone)]
#[repr(u8)]
pub enum Verbosity {
    Warn = 0,
    Info = 1,
    Debug = 2,
    Trace = 3,
}

impl Verbosity {
    fn level(self) -> tracing::Level {
        match self {
            Verbosity::Warn => tracing::Level::WARN,
            Verbosity::Info => tracing::Level::INFO,
            Verbosity::Debug => tracing::Level::DEBUG,
            Verbosity::Trace => tracing::Level::TRACE,
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = App::new("StellarVote CLI")
        .version("0.1")
        .about("Inspects networks, key material and encrypted tallies for confidential ballots")
        .arg(
            Arg::with_name("network")
                .long("network")
                .takes_value(true)
                .help("Chain id of the network to use - can also be set with STELLARVOTE_NETWORK"),
        )
        .arg(
            Arg::with_name("secret-key")
                .long("secret-key")
                .takes_value(true)
                .help("Hex ed25519 secret key of the local signer - can also be set with STELLARVOTE_SECRET_KEY"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("networks")
                .about("List supported networks")
                .arg(
                    Arg::with_name("json")
                        .long("json")
                        .help("Print the network table as JSON"),
                ),
        )
        .subcommand(SubCommand::with_name("keygen").about("Generate a local signer key"))
        .subcommand(
            SubCommand::with_name("keys").about("Fetch and summarize the network's encryption key material"),
        )
        .subcommand(
            SubCommand::with_name("decrypt")
                .about("Decrypt ciphertext handles the local signer is allowed to see")
                .arg(
                    Arg::with_name("contract")
                        .long("contract")
                        .takes_value(true)
                        .help("Contract holding the handles, defaults to the network's voting contract"),
                )
                .arg(
                    Arg::with_name("handles-file")
                        .long("handles-file")
                        .takes_value(true)
                        .help("File of handles, whitespace separated or a JSON array"),
                )
                .arg(
                    Arg::with_name("HANDLE")
                        .index(1)
                        .multiple(true)
                        .help("0x-prefixed ciphertext handle"),
                ),
        )
        .get_matches();

    let occurrences = matches.occurrences_of("v").min(3) as u8;
    let verbosity = Verbosity::try_from(occurrences).unwrap_or(Verbosity::Trace);
    tracing_subscriber::fmt()
        .with_max_level(verbosity.level())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("stellarvote: {}", e);
        std::process::exit(1);
    });

    let env_network = std::env::var("STELLARVOTE_NETWORK");
    let network: NetworkId = match matches.value_of("network").or(env_network.as_deref().ok()) {
        Some(network) => network.parse().unwrap_or_else(|e| {
            eprintln!("stellarvote: {}", e);
            std::process::exit(1);
        }),
        None => NetworkId::SEPOLIA,
    };

    let env_secret = std::env::var("STELLARVOTE_SECRET_KEY");
    let secret_key = matches
        .value_of("secret-key")
        .or(env_secret.as_deref().ok())
        .map(expand);

    // Subcommands
    let (name, result) = match matches.subcommand() {
        ("networks", Some(matches)) => ("networks", command_networks(matches, &config)),
        ("keygen", Some(matches)) => ("keygen", command_keygen(matches)),
        ("keys", Some(matches)) => ("keys", command_keys(matches, &config, network).await),
        ("decrypt", Some(matches)) => (
            "decrypt",
            command_decrypt(matches, &config, network, secret_key.as_deref()).await,
        ),
        _ => {
            eprintln!("{}", matches.usage());
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("stellarvote {}: {:#}", name, e);
        std::process::exit(1);
    }
}

/// Expand `~` and environment variables in a user-supplied value
pub fn expand(input: &str) -> String {
    shellexpand::full(input)
        .map(|expanded| expanded.into_owned())
        .unwrap_or_else(|_| input.to_owned())
}
