//! In-process stand-ins for the key service, signing agents and ledger.

use crate::*;
use ed25519_dalek::{PublicKey, SecretKey};
use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const TEST_NETWORK: NetworkId = NetworkId::LOCAL;
pub const TEST_PROPOSAL: u64 = 1;
pub const FIXED_NOW: u64 = 1_700_000_000;

pub const FAKE_PUBLIC_KEY_ID: &str = "fake-public-key";
pub const FAKE_PUBLIC_KEY: &[u8] = b"fake public key bytes";
pub const FAKE_PUBLIC_PARAMS_ID: &str = "fake-crs-2048";
pub const FAKE_PUBLIC_PARAMS: &[u8] = b"fake public params bytes";

const GATEWAY_URL: &str = "http://gateway.test";

pub fn fixed_clock() -> Result<u64, Error> {
    Ok(FIXED_NOW)
}

pub fn long_ago_clock() -> Result<u64, Error> {
    Ok(FIXED_NOW - 3 * 24 * 60 * 60)
}

pub fn test_contract() -> Address {
    Address([0xc0; 20])
}

pub fn test_networks() -> NetworkTable {
    NetworkTable::new().with(NetworkProfile {
        id: TEST_NETWORK,
        name: "local".to_owned(),
        contract: test_contract(),
        key_service: KeyServiceProfile::gateway(GATEWAY_URL),
    })
}

pub fn test_signer() -> LocalSigner {
    let secret = SecretKey::from_bytes(&[7u8; 32]).unwrap();
    LocalSigner::from_secret(secret)
}

pub fn test_voter() -> Address {
    test_signer().address()
}

pub fn test_binding() -> BallotBinding {
    BallotBinding::new(test_contract(), test_voter(), TEST_NETWORK)
}

pub fn test_session() -> Session {
    Session::new(TEST_NETWORK, test_voter(), Arc::new(test_signer()))
}

/// A session whose agent broadcasts to `ledger`
pub fn test_session_on(ledger: &Arc<MemLedger>) -> Session {
    let signer = test_signer().with_broadcaster(ledger.clone());
    Session::new(TEST_NETWORK, test_voter(), Arc::new(signer))
}

pub fn fake_material() -> NetworkKeyMaterial {
    NetworkKeyMaterial {
        network: TEST_NETWORK,
        public_key_id: FAKE_PUBLIC_KEY_ID.to_owned(),
        public_key: FAKE_PUBLIC_KEY.to_vec(),
        public_params_id: FAKE_PUBLIC_PARAMS_ID.to_owned(),
        public_params: FAKE_PUBLIC_PARAMS.to_vec(),
    }
}

pub fn test_metadata() -> ProposalMetadata {
    ProposalMetadata {
        id: TEST_PROPOSAL,
        title: "Pick a callsign".to_owned(),
        description: "Three options, one vote each".to_owned(),
        options: vec!["Alpha".to_owned(), "Bravo".to_owned(), "Charlie".to_owned()],
        start_time: FIXED_NOW - 100,
        end_time: FIXED_NOW + 100,
        results_published: false,
        creator: Address([0xcc; 20]),
    }
}

/// A ledger with one active three-option proposal allowing one vote per participant
pub fn test_ledger() -> Arc<MemLedger> {
    let ledger = MemLedger::new(TEST_NETWORK, test_contract());
    ledger.add_proposal(test_metadata(), 1);
    Arc::new(ledger)
}

pub fn test_cache(service: Arc<FakeKeyService>) -> KeyMaterialCache {
    KeyMaterialCache::new(Arc::new(test_networks()), service)
}

pub fn test_encoder(service: Arc<FakeKeyService>) -> BallotEncoder {
    BallotEncoder::new(Arc::new(test_cache(service)), Arc::new(MockEngine::new()))
}

pub fn test_authorizer(service: Arc<FakeKeyService>) -> DecryptionAuthorizer {
    DecryptionAuthorizer::new(Arc::new(test_cache(service)), AuthorizationPolicy::default())
        .with_clock(fixed_clock)
}

pub fn test_machine(ledger: &Arc<MemLedger>, service: Arc<FakeKeyService>) -> SubmissionMachine {
    SubmissionMachine::new(
        test_encoder(service),
        ledger.clone(),
        test_session_on(ledger),
        TEST_PROPOSAL,
        3,
    )
    .unwrap()
}

/// A key service that serves fixed artifacts and decrypts from a plaintext table.
///
/// Decryption is only granted to `test_signer`, inside the authorization window.
pub struct FakeKeyService {
    pub directory_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
    delay: Duration,
    failing: Mutex<Option<FetchStage>>,
    decrypt_failure: Mutex<Option<ServiceError>>,
    plaintexts: Mutex<HashMap<Handle, u64>>,
    trusted: PublicKey,
    now: u64,
}

impl FakeKeyService {
    pub fn new() -> Self {
        FakeKeyService {
            directory_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            decrypt_calls: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
            failing: Mutex::new(None),
            decrypt_failure: Mutex::new(None),
            plaintexts: Mutex::new(HashMap::new()),
            trusted: *test_signer().public_key(),
            now: FIXED_NOW + 60,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_at(self, stage: FetchStage) -> Self {
        *self.failing.lock().unwrap() = Some(stage);
        self
    }

    pub fn stop_failing(&self) {
        *self.failing.lock().unwrap() = None;
    }

    pub fn set_plaintext(&self, handle: Handle, value: u64) {
        self.plaintexts.lock().unwrap().insert(handle, value);
    }

    pub fn fail_decrypt(&self, error: ServiceError) {
        *self.decrypt_failure.lock().unwrap() = Some(error);
    }

    async fn pause(&self) {
        if self.delay > Duration::from_millis(0) {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn check_stage(&self, stage: FetchStage) -> Result<(), ServiceError> {
        if *self.failing.lock().unwrap() == Some(stage) {
            return Err(ServiceError::Transport(format!("{} unreachable", stage)));
        }
        Ok(())
    }

    fn decrypt(&self, request: &UserDecryptRequest) -> Result<UserDecryptResponse, ServiceError> {
        if let Some(error) = self.decrypt_failure.lock().unwrap().clone() {
            return Err(error);
        }

        let denied = |message: &str| ServiceError::Rejected {
            status: 403,
            message: message.to_owned(),
        };

        verify_structured(&self.trusted, &request.authorization_message(), &request.signature)
            .map_err(|_| denied("bad signature"))?;
        if request.user_address != Address::from_public_key(&self.trusted) {
            return Err(denied("user is not allowed to decrypt"));
        }
        if !request.window().contains(self.now) {
            return Err(denied("authorization expired"));
        }

        let plaintexts = self.plaintexts.lock().unwrap();
        let mut results = Vec::new();
        for pair in &request.handle_contract_pairs {
            if !request.contract_addresses.contains(&pair.contract_address) {
                return Err(denied("contract not authorized"));
            }
            let value = plaintexts
                .get(&pair.handle)
                .ok_or_else(|| denied("unknown handle"))?;
            let sealed = seal(&request.public_key, pair.handle.as_bytes(), &value.to_be_bytes())
                .map_err(|e| ServiceError::Malformed(e.to_string()))?;
            results.push(SealedValue {
                handle: pair.handle,
                sealed,
            });
        }

        Ok(UserDecryptResponse { results })
    }
}

impl KeyService for FakeKeyService {
    fn fetch_directory<'a>(
        &'a self,
        _profile: &'a KeyServiceProfile,
    ) -> BoxFuture<'a, Result<serde_json::Value, ServiceError>> {
        async move {
            self.directory_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            self.check_stage(FetchStage::Directory)?;

            Ok(json!({
                "publicKeyId": FAKE_PUBLIC_KEY_ID,
                "publicKeyUrl": format!("{}/pk", GATEWAY_URL),
                "publicParamsId": FAKE_PUBLIC_PARAMS_ID,
                "publicParamsUrl": format!("{}/pp", GATEWAY_URL),
            }))
        }
        .boxed()
    }

    fn download<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, ServiceError>> {
        async move {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;

            if url.ends_with("/pk") {
                self.check_stage(FetchStage::PublicKey)?;
                Ok(FAKE_PUBLIC_KEY.to_vec())
            } else if url.ends_with("/pp") {
                self.check_stage(FetchStage::PublicParams)?;
                Ok(FAKE_PUBLIC_PARAMS.to_vec())
            } else {
                Err(ServiceError::Rejected {
                    status: 404,
                    message: url.to_owned(),
                })
            }
        }
        .boxed()
    }

    fn user_decrypt<'a>(
        &'a self,
        _profile: &'a KeyServiceProfile,
        request: &'a UserDecryptRequest,
    ) -> BoxFuture<'a, Result<UserDecryptResponse, ServiceError>> {
        async move {
            self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
            self.decrypt(request)
        }
        .boxed()
    }
}

/// An engine that misbehaves
pub struct FailingEngine {
    short: bool,
}

impl FailingEngine {
    /// Returns one handle too few
    pub fn short() -> Self {
        FailingEngine { short: true }
    }

    /// Always errors
    pub fn broken() -> Self {
        FailingEngine { short: false }
    }
}

impl CryptoEngine for FailingEngine {
    fn encrypt_u32<'a>(
        &'a self,
        material: &'a NetworkKeyMaterial,
        binding: &'a BallotBinding,
        values: &'a [u32],
    ) -> BoxFuture<'a, Result<EngineOutput, Error>> {
        async move {
            if !self.short {
                return Err(Error::EncodeError("engine fault".to_owned()));
            }
            let mut output = MockEngine::new().encrypt_u32(material, binding, values).await?;
            output.handles.pop();
            Ok(output)
        }
        .boxed()
    }
}

/// An agent whose user rejects every prompt
pub struct RefusingAgent {
    address: Address,
}

impl RefusingAgent {
    pub fn new(address: Address) -> Self {
        RefusingAgent { address }
    }
}

impl SigningAgent for RefusingAgent {
    fn address(&self) -> BoxFuture<'_, Result<Address, Error>> {
        let address = self.address;
        async move { Ok(address) }.boxed()
    }

    fn sign_structured_message<'a>(
        &'a self,
        _message: &'a StructuredMessage,
    ) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        async move { Err(Error::SignatureDenied("user rejected the request".to_owned())) }.boxed()
    }

    fn send_transaction(&self, _to: Address, _data: Vec<u8>) -> BoxFuture<'_, Result<TxRef, Error>> {
        async move { Err(Error::SignatureDenied("user rejected the transaction".to_owned())) }.boxed()
    }
}

/// An agent that holds every transaction prompt until released
pub struct GatedAgent {
    inner: LocalSigner,
    gate: Notify,
    sent: AtomicBool,
}

impl GatedAgent {
    pub fn new(inner: LocalSigner) -> Self {
        GatedAgent {
            inner,
            gate: Notify::new(),
            sent: AtomicBool::new(false),
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Whether a transaction got past the gate
    pub fn sent(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }
}

impl SigningAgent for GatedAgent {
    fn address(&self) -> BoxFuture<'_, Result<Address, Error>> {
        SigningAgent::address(&self.inner)
    }

    fn sign_structured_message<'a>(
        &'a self,
        message: &'a StructuredMessage,
    ) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        self.inner.sign_structured_message(message)
    }

    fn send_transaction(&self, to: Address, data: Vec<u8>) -> BoxFuture<'_, Result<TxRef, Error>> {
        async move {
            self.gate.notified().await;
            self.sent.store(true, Ordering::SeqCst);
            self.inner.send_transaction(to, data).await
        }
        .boxed()
    }
}

/// A ledger that accepts broadcasts but never confirms them
pub struct StallingLedger {
    inner: Arc<MemLedger>,
}

impl StallingLedger {
    pub fn new(inner: Arc<MemLedger>) -> Self {
        StallingLedger { inner }
    }
}

impl Ledger for StallingLedger {
    fn contract(&self) -> Address {
        self.inner.contract()
    }

    fn network(&self) -> NetworkId {
        self.inner.network()
    }

    fn wait_for_receipt(&self, _tx: TxRef) -> BoxFuture<'_, Result<Receipt, Error>> {
        futures::future::pending().boxed()
    }

    fn proposal_metadata(&self, proposal: u64) -> BoxFuture<'_, Result<ProposalMetadata, Error>> {
        self.inner.proposal_metadata(proposal)
    }

    fn proposal_status(&self, proposal: u64) -> BoxFuture<'_, Result<ProposalStatus, Error>> {
        self.inner.proposal_status(proposal)
    }

    fn encrypted_aggregate(&self, proposal: u64) -> BoxFuture<'_, Result<Vec<Handle>, Error>> {
        self.inner.encrypted_aggregate(proposal)
    }

    fn published_results(&self, proposal: u64) -> BoxFuture<'_, Result<PublishedResults, Error>> {
        self.inner.published_results(proposal)
    }

    fn participant_vote_count(
        &self,
        proposal: u64,
        participant: Address,
    ) -> BoxFuture<'_, Result<u32, Error>> {
        self.inner.participant_vote_count(proposal, participant)
    }

    fn max_votes_per_participant(&self, proposal: u64) -> BoxFuture<'_, Result<u32, Error>> {
        self.inner.max_votes_per_participant(proposal)
    }
}
