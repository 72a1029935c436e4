use crate::rest::HttpKeyService;
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::sync::Arc;
use stellarvote::{
    Address, Config, DecryptionAuthorizer, Handle, KeyMaterialCache, LocalSigner, NetworkId, Session,
};

pub async fn command_decrypt(
    matches: &clap::ArgMatches<'_>,
    config: &Config,
    network: NetworkId,
    secret_key: Option<&str>,
) -> Result<()> {
    let secret_key = secret_key
        .ok_or_else(|| anyhow!("a signer is required, pass --secret-key or set STELLARVOTE_SECRET_KEY"))?;
    let signer = LocalSigner::from_hex(secret_key).context("reading signer secret key")?;

    let table = Arc::new(config.network_table());
    let contract: Address = match matches.value_of("contract") {
        Some(contract) => contract.parse::<Address>().context("reading --contract")?,
        None => table.contract_for(network)?,
    };

    let mut handles = Vec::new();
    if let Some(path) = matches.value_of("handles-file") {
        let path = crate::expand(path);
        let contents = fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
        handles.extend(parse_handles(&contents)?);
    }
    if let Some(values) = matches.values_of("HANDLE") {
        for value in values {
            handles.push(value.parse::<Handle>().with_context(|| format!("reading handle {}", value))?);
        }
    }
    if handles.is_empty() {
        bail!("no handles given");
    }

    let service = HttpKeyService::new(config.http_timeout)?;
    let cache = Arc::new(KeyMaterialCache::new(table, Arc::new(service)));
    let authorizer = DecryptionAuthorizer::new(cache, config.authorization_policy());

    let session = Session::connect(network, Arc::new(signer)).await?;
    let values = authorizer
        .request_aggregate(&session, contract, &handles)
        .await?;

    for (handle, value) in handles.iter().zip(values) {
        println!("{}: {}", handle, value);
    }

    Ok(())
}

/// Handles from a file: either a JSON array of strings or whitespace separated.
fn parse_handles(contents: &str) -> Result<Vec<Handle>> {
    let contents = contents.trim();
    if contents.starts_with('[') {
        let handles: Vec<Handle> = serde_json::from_str(contents).context("reading handle list")?;
        return Ok(handles);
    }

    contents
        .split_whitespace()
        .map(|value| {
            value
                .parse::<Handle>()
                .with_context(|| format!("reading handle {}", value))
        })
        .collect()
}
