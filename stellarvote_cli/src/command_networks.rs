use anyhow::Result;
use stellarvote::{Config, KeyServiceProfile};

pub fn command_networks(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let table = config.network_table();

    if matches.is_present("json") {
        let profiles: Vec<_> = table.iter().collect();
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    for profile in table.iter() {
        let service = match &profile.key_service {
            KeyServiceProfile::Relayer { base_url, .. } => format!("relayer {}", base_url),
            KeyServiceProfile::Gateway { base_url } => format!("gateway {}", base_url),
        };
        println!(
            "{}\t{}\tcontract {}\t{}",
            profile.id, profile.name, profile.contract, service
        );
    }

    Ok(())
}
