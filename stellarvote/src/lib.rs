//! Client protocol for confidential one-hot ballots on a public ledger.
//!
//! A vote is encrypted slot by slot under a network's public key material,
//! broadcast through the voter's signing agent and later tallied by asking
//! the key-management service to decrypt the aggregate for an authorized user.

#[macro_use]
extern crate serde;

#[macro_use]
extern crate tracing;

mod agent;
mod ballot;
mod config;
mod decryption;
mod engine;
mod error;
mod keys;
mod ledger;
mod network;
mod seal;
mod serde_hex;
mod service;
mod session;
mod signer;
mod store;
mod submission;
mod tally;

pub use agent::*;
pub use ballot::*;
pub use config::*;
pub use decryption::*;
pub use engine::*;
pub use error::*;
pub use keys::*;
pub use ledger::*;
pub use network::*;
pub use seal::*;
pub use serde_hex::*;
pub use service::*;
pub use session::*;
pub use signer::*;
pub use store::*;
pub use submission::*;
pub use tally::*;

#[cfg(test)]
mod fakes;

#[cfg(test)]
mod tests;
