use crate::rest::HttpKeyService;
use anyhow::{Context, Result};
use std::sync::Arc;
use stellarvote::{Config, KeyMaterialCache, NetworkId};

pub async fn command_keys(_matches: &clap::ArgMatches<'_>, config: &Config, network: NetworkId) -> Result<()> {
    let service = HttpKeyService::new(config.http_timeout)?;
    let cache = KeyMaterialCache::new(Arc::new(config.network_table()), Arc::new(service));

    let material = cache
        .resolve(network)
        .await
        .with_context(|| format!("fetching key material for network {}", network))?;

    println!("network:        {}", material.network);
    println!(
        "public-key:     {} ({} bytes)",
        material.public_key_id,
        material.public_key.len()
    );
    println!(
        "public-params:  {} ({} bytes)",
        material.public_params_id,
        material.public_params.len()
    );

    Ok(())
}
