use crate::*;
use std::env::var;
use std::time::Duration;

pub const DEFAULT_DECRYPTION_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Runtime settings, read from `STELLARVOTE_*` environment variables.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub decryption_ttl: Duration,
    pub confirmation_timeout: Duration,
    pub http_timeout: Duration,
    pub relayer_url: String,

    /// Voting contract and gateway for a local development chain, if any
    pub local: Option<(Address, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            decryption_ttl: Duration::from_secs(DEFAULT_DECRYPTION_TTL_SECS),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            relayer_url: SEPOLIA_RELAYER_URL.to_owned(),
            local: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Config::from_lookup(|name| var(name).ok())
    }

    /// Build a config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let seconds = |name: &str, default: Duration| -> Result<Duration, Error> {
            match lookup(name) {
                Some(val) => val
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| Error::Config(format!("{} must be a positive number of seconds", name))),
                None => Ok(default),
            }
        };

        let decryption_ttl = seconds("STELLARVOTE_DECRYPTION_TTL_SECS", defaults.decryption_ttl)?;
        let confirmation_timeout = seconds(
            "STELLARVOTE_CONFIRMATION_TIMEOUT_SECS",
            defaults.confirmation_timeout,
        )?;
        let http_timeout = seconds("STELLARVOTE_HTTP_TIMEOUT_SECS", defaults.http_timeout)?;

        let relayer_url = lookup("STELLARVOTE_RELAYER_URL").unwrap_or(defaults.relayer_url);

        let local = match (
            lookup("STELLARVOTE_LOCAL_CONTRACT"),
            lookup("STELLARVOTE_LOCAL_GATEWAY_URL"),
        ) {
            (Some(contract), Some(gateway)) => {
                let contract: Address = contract
                    .parse()
                    .map_err(|e| Error::Config(format!("STELLARVOTE_LOCAL_CONTRACT: {}", e)))?;
                Some((contract, gateway))
            }
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "STELLARVOTE_LOCAL_CONTRACT and STELLARVOTE_LOCAL_GATEWAY_URL must be set together"
                        .to_owned(),
                ))
            }
        };

        Ok(Config {
            decryption_ttl,
            confirmation_timeout,
            http_timeout,
            relayer_url,
            local,
        })
    }

    /// The supported networks under this configuration.
    pub fn network_table(&self) -> NetworkTable {
        let mut table = NetworkTable::with_defaults();
        if let Some(sepolia) = table.get_mut(NetworkId::SEPOLIA) {
            sepolia.key_service = KeyServiceProfile::relayer(&self.relayer_url);
        }
        if let Some((contract, gateway)) = &self.local {
            table.insert(NetworkProfile {
                id: NetworkId::LOCAL,
                name: "local".to_owned(),
                contract: *contract,
                key_service: KeyServiceProfile::gateway(gateway),
            });
        }
        table
    }

    pub fn authorization_policy(&self) -> AuthorizationPolicy {
        AuthorizationPolicy::new(self.decryption_ttl)
    }

    pub fn submission_config(&self) -> SubmissionConfig {
        SubmissionConfig {
            confirmation_timeout: self.confirmation_timeout,
        }
    }
}
