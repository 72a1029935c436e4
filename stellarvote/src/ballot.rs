use crate::*;
use std::sync::Arc;
use tracing::instrument;

/// A choice expressed as a vector with a single 1 at the chosen slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OneHotVector(Vec<u32>);

impl OneHotVector {
    /// Build the vector for `choice` among `options`.
    ///
    /// Requires at least two options and a choice in range.
    pub fn new(choice: usize, options: usize) -> Result<Self, Error> {
        if options < 2 || choice >= options {
            return Err(Error::InvalidChoice { choice, options });
        }

        let mut slots = vec![0u32; options];
        slots[choice] = 1;
        Ok(OneHotVector(slots))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn choice(&self) -> usize {
        self.0.iter().position(|v| *v == 1).unwrap_or_default()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

/// The scope an encrypted ballot is valid in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BallotBinding {
    pub contract: Address,
    pub voter: Address,
    pub network: NetworkId,
}

impl BallotBinding {
    pub fn new(contract: Address, voter: Address, network: NetworkId) -> Self {
        BallotBinding {
            contract,
            voter,
            network,
        }
    }

    /// Fixed-width encoding: contract || voter || network id (big endian).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Address::LEN * 2 + 8);
        bytes.extend_from_slice(self.contract.as_bytes());
        bytes.extend_from_slice(self.voter.as_bytes());
        bytes.extend_from_slice(&self.network.0.to_be_bytes());
        bytes
    }
}

/// Ciphertext handles for every slot of a one-hot vector plus a validity proof.
///
/// Only valid for the contract, voter and network in `binding`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EncryptedBallot {
    pub binding: BallotBinding,
    pub handles: Vec<Handle>,

    #[serde(with = "hex_serde")]
    pub input_proof: Vec<u8>,
}

/// Turns a choice into an encrypted ballot. Holds no per-vote state.
#[derive(Clone)]
pub struct BallotEncoder {
    cache: Arc<KeyMaterialCache>,
    engine: Arc<dyn CryptoEngine>,
}

impl BallotEncoder {
    pub fn new(cache: Arc<KeyMaterialCache>, engine: Arc<dyn CryptoEngine>) -> Self {
        BallotEncoder { cache, engine }
    }

    pub fn cache(&self) -> &Arc<KeyMaterialCache> {
        &self.cache
    }

    #[instrument(level = "debug", skip_all, fields(network = %network, options = options))]
    pub async fn encode(
        &self,
        contract: Address,
        voter: Address,
        choice: usize,
        options: usize,
        network: NetworkId,
    ) -> Result<EncryptedBallot, Error> {
        // Validate before touching the network
        let vector = OneHotVector::new(choice, options)?;

        let material = self.cache.resolve(network).await?;
        let binding = BallotBinding::new(contract, voter, network);

        debug!(
            "encrypting {} slots for {} on network {}",
            vector.len(),
            contract,
            network
        );
        let output = self
            .engine
            .encrypt_u32(&material, &binding, vector.as_slice())
            .await?;

        if output.handles.len() != vector.len() {
            return Err(Error::EncodeError(format!(
                "engine returned {} handles for {} slots",
                output.handles.len(),
                vector.len()
            )));
        }
        if output.input_proof.is_empty() {
            return Err(Error::EncodeError("engine returned an empty input proof".to_owned()));
        }

        Ok(EncryptedBallot {
            binding,
            handles: output.handles,
            input_proof: output.input_proof,
        })
    }

    /// Encode for the session's voter against its network's voting contract.
    pub async fn encode_for(
        &self,
        session: &Session,
        choice: usize,
        options: usize,
    ) -> Result<EncryptedBallot, Error> {
        let contract = self.cache.networks().contract_for(session.network)?;
        self.encode(contract, session.voter, choice, options, session.network)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::*;
    use std::sync::atomic::Ordering;

    fn encoder(service: Arc<FakeKeyService>) -> BallotEncoder {
        let cache = KeyMaterialCache::new(Arc::new(test_networks()), service);
        BallotEncoder::new(Arc::new(cache), Arc::new(MockEngine::new()))
    }

    #[test]
    fn one_hot_has_a_single_one_at_the_choice() {
        for options in 2..8 {
            for choice in 0..options {
                let vector = OneHotVector::new(choice, options).unwrap();
                assert_eq!(vector.len(), options);
                assert_eq!(vector.as_slice().iter().sum::<u32>(), 1);
                assert_eq!(vector.as_slice()[choice], 1);
                assert_eq!(vector.choice(), choice);
            }
        }
    }

    #[test]
    fn one_hot_rejects_bad_input() {
        assert_eq!(
            OneHotVector::new(3, 3).unwrap_err(),
            Error::InvalidChoice {
                choice: 3,
                options: 3
            }
        );
        assert!(OneHotVector::new(0, 1).is_err());
        assert!(OneHotVector::new(0, 0).is_err());
    }

    #[tokio::test]
    async fn encode_produces_one_handle_per_option() {
        let service = Arc::new(FakeKeyService::new());
        let encoder = encoder(service);

        let ballot = encoder
            .encode(test_contract(), test_voter(), 1, 3, TEST_NETWORK)
            .await
            .unwrap();

        assert_eq!(ballot.handles.len(), 3);
        assert_eq!(ballot.binding, test_binding());
        assert_eq!(ballot.input_proof, MockEngine::proof(&ballot.binding, &ballot.handles));
    }

    #[tokio::test]
    async fn invalid_choice_never_fetches_keys() {
        let service = Arc::new(FakeKeyService::new());
        let encoder = encoder(service.clone());

        let err = encoder
            .encode(test_contract(), test_voter(), 5, 3, TEST_NETWORK)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::InvalidChoice {
                choice: 5,
                options: 3
            }
        );
        assert_eq!(service.directory_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_engine_output_is_an_encode_error() {
        let cache = KeyMaterialCache::new(Arc::new(test_networks()), Arc::new(FakeKeyService::new()));
        let encoder = BallotEncoder::new(Arc::new(cache), Arc::new(FailingEngine::short()));

        let err = encoder
            .encode(test_contract(), test_voter(), 0, 2, TEST_NETWORK)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EncodeError(_)));
    }
}
