use crate::*;
use ed25519_dalek::{ExpandedSecretKey, Keypair, PublicKey, SecretKey, Signature};
use futures::future::{BoxFuture, FutureExt};
use std::convert::TryFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A contract call signed by the sender's ed25519 key
///
/// The nonce makes every call from one sender distinct, so resending the same
/// data is a new transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignedCall {
    pub to: Address,
    pub nonce: u64,

    #[serde(with = "hex_serde")]
    pub data: Vec<u8>,

    #[serde(with = "hex_serde")]
    pub public_key: Vec<u8>,

    #[serde(with = "hex_serde")]
    pub signature: Vec<u8>,
}

impl SignedCall {
    fn signing_bytes(to: &Address, nonce: u64, data: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Address::LEN + 8 + data.len());
        bytes.extend_from_slice(to.as_bytes());
        bytes.extend_from_slice(&nonce.to_be_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    /// Address of the key that signed this call
    pub fn sender(&self) -> Result<Address, Error> {
        let public_key = PublicKey::from_bytes(&self.public_key).map_err(|_| Error::InvalidSignature)?;
        Ok(Address::from_public_key(&public_key))
    }

    /// Verify the signature, returning the sender on success.
    pub fn verify(&self) -> Result<Address, Error> {
        let public_key = PublicKey::from_bytes(&self.public_key).map_err(|_| Error::InvalidSignature)?;
        let signature = Signature::try_from(self.signature.as_slice()).map_err(|_| Error::InvalidSignature)?;

        public_key
            .verify_strict(&Self::signing_bytes(&self.to, self.nonce, &self.data), &signature)
            .map_err(|_| Error::InvalidSignature)?;

        Ok(Address::from_public_key(&public_key))
    }

    pub fn tx_ref(&self) -> Result<TxRef, Error> {
        Ok(TxRef::digest(&serde_cbor::to_vec(self)?))
    }
}

/// Somewhere signed calls can be sent for inclusion in the ledger.
pub trait Broadcast: Send + Sync {
    fn broadcast(&self, call: SignedCall) -> BoxFuture<'_, Result<TxRef, Error>>;
}

/// Check an ed25519 signature over a structured message.
pub fn verify_structured(
    public_key: &PublicKey,
    message: &StructuredMessage,
    signature: &[u8],
) -> Result<(), Error> {
    let signature = Signature::try_from(signature).map_err(|_| Error::InvalidSignature)?;
    public_key
        .verify_strict(&message.signing_bytes()?, &signature)
        .map_err(|_| Error::InvalidSignature)
}

/// A signing agent backed by an ed25519 key held in process.
///
/// Never prompts, so it only suits development chains, tooling and tests.
pub struct LocalSigner {
    secret: SecretKey,
    public: PublicKey,
    broadcaster: Option<Arc<dyn Broadcast>>,
    nonce: AtomicU64,
}

impl LocalSigner {
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng {};
        let Keypair { public, secret } = Keypair::generate(&mut csprng);
        LocalSigner::from_parts(secret, public)
    }

    fn from_parts(secret: SecretKey, public: PublicKey) -> Self {
        LocalSigner {
            secret,
            public,
            broadcaster: None,
            nonce: AtomicU64::new(0),
        }
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKey::from(&secret);
        LocalSigner::from_parts(secret, public)
    }

    pub fn from_hex(secret: &str) -> Result<Self, Error> {
        let bytes = hex::decode(secret.trim()).map_err(|_| Error::BadHex("secret key"))?;
        let secret = SecretKey::from_bytes(&bytes).map_err(|_| Error::BadLength {
            kind: "secret key",
            expected: ed25519_dalek::SECRET_KEY_LENGTH,
            found: bytes.len(),
        })?;
        Ok(LocalSigner::from_secret(secret))
    }

    /// Send signed transactions to `broadcaster`.
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcast>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.as_bytes())
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public)
    }

    fn sign(&self, bytes: &[u8]) -> Vec<u8> {
        let expanded: ExpandedSecretKey = (&self.secret).into();
        expanded.sign(bytes, &self.public).to_bytes().to_vec()
    }

    pub fn verify_structured(&self, message: &StructuredMessage, signature: &[u8]) -> bool {
        verify_structured(&self.public, message, signature).is_ok()
    }

    /// Sign a call with the next nonce.
    pub fn sign_call(&self, to: Address, data: Vec<u8>) -> SignedCall {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let signature = self.sign(&SignedCall::signing_bytes(&to, nonce, &data));
        SignedCall {
            to,
            nonce,
            data,
            public_key: self.public.as_bytes().to_vec(),
            signature,
        }
    }
}

impl SigningAgent for LocalSigner {
    fn address(&self) -> BoxFuture<'_, Result<Address, Error>> {
        let address = LocalSigner::address(self);
        async move { Ok(address) }.boxed()
    }

    fn sign_structured_message<'a>(
        &'a self,
        message: &'a StructuredMessage,
    ) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        async move {
            let bytes = message.signing_bytes()?;
            Ok(self.sign(&bytes))
        }
        .boxed()
    }

    fn send_transaction(&self, to: Address, data: Vec<u8>) -> BoxFuture<'_, Result<TxRef, Error>> {
        async move {
            let broadcaster = self.broadcaster.as_ref().ok_or_else(|| {
                Error::TransportError("no broadcast endpoint configured".to_owned())
            })?;
            let call = self.sign_call(to, data);
            broadcaster.broadcast(call).await
        }
        .boxed()
    }
}
