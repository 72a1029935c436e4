use anyhow::Result;
use stellarvote::LocalSigner;

pub fn command_keygen(_matches: &clap::ArgMatches) -> Result<()> {
    let signer = LocalSigner::generate();

    println!("secret-key: {}", signer.secret_hex());
    println!("public-key: {}", hex::encode(signer.public_key().as_bytes()));
    println!("address:    {}", signer.address());

    Ok(())
}
