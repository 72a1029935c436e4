use crate::*;
use rand::rngs::OsRng;
use serde_json::json;
use std::convert::TryInto;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::instrument;
use x25519_dalek::{PublicKey, StaticSecret};

pub const DECRYPTION_DOMAIN_NAME: &str = "StellarVote Decryption";
pub const DECRYPTION_DOMAIN_VERSION: &str = "1";
pub const DECRYPTION_PRIMARY_TYPE: &str = "UserDecryptRequestVerification";

/// How long a decryption authorization stays valid.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    pub validity: Duration,
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        AuthorizationPolicy {
            validity: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl AuthorizationPolicy {
    pub fn new(validity: Duration) -> Self {
        AuthorizationPolicy { validity }
    }

    pub fn window(&self, now: u64) -> ValidityWindow {
        ValidityWindow {
            issued_at: now,
            ttl: self.validity.as_secs(),
        }
    }
}

/// Half-open validity interval `[issued_at, issued_at + ttl)`, in unix seconds.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct ValidityWindow {
    pub issued_at: u64,
    pub ttl: u64,
}

impl ValidityWindow {
    pub fn expires_at(&self) -> u64 {
        self.issued_at.saturating_add(self.ttl)
    }

    pub fn contains(&self, time: u64) -> bool {
        self.issued_at <= time && time < self.expires_at()
    }
}

/// A one-off X25519 keypair the service seals plaintexts to.
pub struct EphemeralKeypair {
    secret: StaticSecret,
    pub public: PublicKey,
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::new(OsRng);
        let public = PublicKey::from(&secret);
        EphemeralKeypair { secret, public }
    }

    /// Open a value the service sealed to this keypair.
    pub fn open(&self, handle: &Handle, sealed: &[u8]) -> Result<Vec<u8>, Error> {
        open(&self.secret, handle.as_bytes(), sealed)
    }
}

impl std::fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish()
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub handle: Handle,
    pub contract_address: Address,
}

/// The body of a user decryption request
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptRequest {
    pub handle_contract_pairs: Vec<HandleContractPair>,
    pub contract_addresses: Vec<Address>,

    #[serde(with = "hex_serde")]
    pub signature: Vec<u8>,

    #[serde(with = "x25519_hex")]
    pub public_key: PublicKey,
    pub user_address: Address,
    pub issued_at: u64,
    pub ttl: u64,
    pub key_id: String,
    pub chain_id: NetworkId,
}

impl UserDecryptRequest {
    pub fn window(&self) -> ValidityWindow {
        ValidityWindow {
            issued_at: self.issued_at,
            ttl: self.ttl,
        }
    }

    /// Rebuild the message the signature in this request covers.
    pub fn authorization_message(&self) -> StructuredMessage {
        authorization_message(
            &self.public_key,
            &self.contract_addresses,
            self.user_address,
            self.window(),
            self.chain_id,
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SealedValue {
    pub handle: Handle,

    #[serde(with = "hex_serde")]
    pub sealed: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserDecryptResponse {
    pub results: Vec<SealedValue>,
}

/// The domain-separated message a user signs to allow decryption.
pub fn authorization_message(
    public_key: &PublicKey,
    contracts: &[Address],
    user: Address,
    window: ValidityWindow,
    chain_id: NetworkId,
) -> StructuredMessage {
    StructuredMessage {
        domain: SigningDomain {
            name: DECRYPTION_DOMAIN_NAME.to_owned(),
            version: DECRYPTION_DOMAIN_VERSION.to_owned(),
            chain_id: chain_id.0,
        },
        primary_type: DECRYPTION_PRIMARY_TYPE.to_owned(),
        types: vec![
            TypedField::new("publicKey", "bytes"),
            TypedField::new("contractAddresses", "address[]"),
            TypedField::new("userAddress", "address"),
            TypedField::new("startTimestamp", "uint256"),
            TypedField::new("durationSeconds", "uint256"),
        ],
        message: json!({
            "publicKey": hex::encode(public_key.as_bytes()),
            "contractAddresses": contracts,
            "userAddress": user,
            "startTimestamp": window.issued_at,
            "durationSeconds": window.ttl,
        }),
    }
}

/// A signed, time-bounded permission to decrypt specific handles.
///
/// Single use: submitting it consumes it, and the ephemeral secret goes with it.
#[derive(Debug)]
pub struct DecryptionAuthorization {
    pub network: NetworkId,
    pub user: Address,
    pub pairs: Vec<HandleContractPair>,
    pub window: ValidityWindow,
    pub message: StructuredMessage,
    pub signature: Vec<u8>,
    keypair: EphemeralKeypair,
}

impl DecryptionAuthorization {
    pub fn public_key(&self) -> &PublicKey {
        &self.keypair.public
    }

    fn contracts(&self) -> Vec<Address> {
        let mut contracts: Vec<Address> = Vec::new();
        for pair in &self.pairs {
            if !contracts.contains(&pair.contract_address) {
                contracts.push(pair.contract_address);
            }
        }
        contracts
    }

    /// Split into the wire request and the keypair needed to read the answer.
    pub fn into_request(self, key_id: &str) -> (UserDecryptRequest, EphemeralKeypair) {
        let request = UserDecryptRequest {
            contract_addresses: self.contracts(),
            handle_contract_pairs: self.pairs,
            signature: self.signature,
            public_key: self.keypair.public,
            user_address: self.user,
            issued_at: self.window.issued_at,
            ttl: self.window.ttl,
            key_id: key_id.to_owned(),
            chain_id: self.network,
        };
        (request, self.keypair)
    }
}

/// Current unix time in seconds
pub fn unix_now() -> Result<u64, Error> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| Error::Clock(e.to_string()))
}

/// Obtains plaintexts for ciphertext handles the user is allowed to see.
#[derive(Clone)]
pub struct DecryptionAuthorizer {
    cache: Arc<KeyMaterialCache>,
    policy: AuthorizationPolicy,
    clock: fn() -> Result<u64, Error>,
}

impl DecryptionAuthorizer {
    pub fn new(cache: Arc<KeyMaterialCache>, policy: AuthorizationPolicy) -> Self {
        DecryptionAuthorizer {
            cache,
            policy,
            clock: unix_now,
        }
    }

    /// Replace the wall clock used for issue timestamps.
    pub fn with_clock(mut self, clock: fn() -> Result<u64, Error>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    /// Build and sign an authorization for `handles` held by `contract`.
    pub async fn authorize(
        &self,
        session: &Session,
        contract: Address,
        handles: &[Handle],
    ) -> Result<DecryptionAuthorization, Error> {
        let signer = session
            .agent
            .address()
            .await
            .map_err(|e| Error::SignatureDenied(e.to_string()))?;
        if signer != session.voter {
            return Err(Error::SignatureDenied(format!(
                "signing agent is {} but the session voter is {}",
                signer, session.voter
            )));
        }

        let keypair = EphemeralKeypair::generate();
        let window = self.policy.window((self.clock)()?);
        let pairs: Vec<HandleContractPair> = handles
            .iter()
            .map(|handle| HandleContractPair {
                handle: *handle,
                contract_address: contract,
            })
            .collect();

        let message = authorization_message(
            &keypair.public,
            &[contract],
            session.voter,
            window,
            session.network,
        );

        debug!(
            "requesting decryption signature from {} valid until {}",
            session.voter,
            window.expires_at()
        );
        let signature = session
            .agent
            .sign_structured_message(&message)
            .await
            .map_err(|e| match e {
                Error::SignatureDenied(reason) => Error::SignatureDenied(reason),
                other => Error::SignatureDenied(other.to_string()),
            })?;

        Ok(DecryptionAuthorization {
            network: session.network,
            user: session.voter,
            pairs,
            window,
            message,
            signature,
            keypair,
        })
    }

    /// Recover one plaintext per handle, in the order given.
    #[instrument(level = "info", skip_all, fields(network = %session.network, handles = handles.len()))]
    pub async fn request_aggregate(
        &self,
        session: &Session,
        contract: Address,
        handles: &[Handle],
    ) -> Result<Vec<u64>, Error> {
        let profile = self.cache.networks().get(session.network)?.key_service.clone();
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let material = self.cache.resolve(session.network).await?;
        let authorization = self.authorize(session, contract, handles).await?;
        let (request, keypair) = authorization.into_request(&material.public_key_id);

        info!(
            "requesting decryption of {} handles on network {}",
            handles.len(),
            session.network
        );
        let response = self
            .cache
            .service()
            .user_decrypt(&profile, &request)
            .await
            .map_err(|e| match e {
                ServiceError::Rejected { status, message } => {
                    Error::DecryptionDenied(format!("status {}: {}", status, message))
                }
                ServiceError::Transport(reason) => Error::TransportError(reason),
                ServiceError::Malformed(reason) => {
                    Error::TransportError(format!("malformed response: {}", reason))
                }
            })?;

        open_results(&keypair, handles, &response)
    }
}

fn open_results(
    keypair: &EphemeralKeypair,
    handles: &[Handle],
    response: &UserDecryptResponse,
) -> Result<Vec<u64>, Error> {
    if response.results.len() != handles.len() {
        return Err(Error::TransportError(format!(
            "malformed response: {} results for {} handles",
            response.results.len(),
            handles.len()
        )));
    }

    handles
        .iter()
        .zip(&response.results)
        .map(|(handle, result)| {
            if result.handle != *handle {
                return Err(Error::TransportError(format!(
                    "malformed response: expected {} but got {}",
                    handle, result.handle
                )));
            }

            let plaintext = keypair.open(handle, &result.sealed).map_err(|e| {
                Error::TransportError(format!("result for {} did not open: {}", handle, e))
            })?;
            let plaintext: [u8; 8] = plaintext.as_slice().try_into().map_err(|_| {
                Error::TransportError(format!(
                    "result for {} is {} bytes, expected 8",
                    handle,
                    plaintext.len()
                ))
            })?;
            Ok(u64::from_be_bytes(plaintext))
        })
        .collect()
}
