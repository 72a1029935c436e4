use crate::*;
use futures::future::{BoxFuture, FutureExt};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};

/// Ciphertext handles for a batch of values plus one proof covering all of them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EngineOutput {
    pub handles: Vec<Handle>,

    #[serde(with = "hex_serde")]
    pub input_proof: Vec<u8>,
}

/// The homomorphic encryption capability.
///
/// The scheme and proof system live behind this trait. Implementations must
/// return one handle per input value, in input order, and bind the proof to
/// `binding`.
pub trait CryptoEngine: Send + Sync {
    fn encrypt_u32<'a>(
        &'a self,
        material: &'a NetworkKeyMaterial,
        binding: &'a BallotBinding,
        values: &'a [u32],
    ) -> BoxFuture<'a, Result<EngineOutput, Error>>;
}

/// A non-confidential engine for development gateways in mock mode and for tests.
///
/// Handles are digests, so they reveal nothing, but nothing can be decrypted
/// from them either. Whoever aggregates must already know the plaintexts.
#[derive(Clone, Debug, Default)]
pub struct MockEngine;

impl MockEngine {
    pub fn new() -> Self {
        MockEngine
    }

    fn handle(material: &NetworkKeyMaterial, binding: &BallotBinding, slot: usize, value: u32) -> Handle {
        let mut nonce = [0u8; 16];
        OsRng.fill(&mut nonce);

        let mut hasher = Sha256::new();
        hasher.update(material.public_key_id.as_bytes());
        hasher.update(binding.to_bytes());
        hasher.update(&(slot as u64).to_be_bytes());
        hasher.update(&value.to_be_bytes());
        hasher.update(&nonce);

        let mut handle = [0u8; Handle::LEN];
        handle.copy_from_slice(&hasher.finalize());
        Handle(handle)
    }

    /// The proof a `MockEngine` attaches to a set of handles.
    pub fn proof(binding: &BallotBinding, handles: &[Handle]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(b"stellarvote mock input proof");
        hasher.update(binding.to_bytes());
        for handle in handles {
            hasher.update(handle.as_bytes());
        }
        hasher.finalize().to_vec()
    }
}

impl CryptoEngine for MockEngine {
    fn encrypt_u32<'a>(
        &'a self,
        material: &'a NetworkKeyMaterial,
        binding: &'a BallotBinding,
        values: &'a [u32],
    ) -> BoxFuture<'a, Result<EngineOutput, Error>> {
        async move {
            let handles: Vec<Handle> = values
                .iter()
                .enumerate()
                .map(|(slot, value)| Self::handle(material, binding, slot, *value))
                .collect();
            let input_proof = Self::proof(binding, &handles);

            Ok(EngineOutput {
                handles,
                input_proof,
            })
        }
        .boxed()
    }
}
