use crate::*;
use futures::future::BoxFuture;

/// The wallet-side collaborator that holds the voter's key.
///
/// Every method may prompt a human, so every method is a suspension point.
pub trait SigningAgent: Send + Sync {
    /// The address this agent signs for
    fn address(&self) -> BoxFuture<'_, Result<Address, Error>>;

    /// Sign a domain-separated structured message.
    ///
    /// A refusal must surface as `Error::SignatureDenied`.
    fn sign_structured_message<'a>(
        &'a self,
        message: &'a StructuredMessage,
    ) -> BoxFuture<'a, Result<Vec<u8>, Error>>;

    /// Sign and broadcast a contract call, returning the broadcast transaction reference.
    fn send_transaction(&self, to: Address, data: Vec<u8>) -> BoxFuture<'_, Result<TxRef, Error>>;
}

/// Domain separator for structured messages
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SigningDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TypedField {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,
}

impl TypedField {
    pub fn new(name: &str, kind: &str) -> Self {
        TypedField {
            name: name.to_owned(),
            kind: kind.to_owned(),
        }
    }
}

/// A typed message plus the domain it is valid in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredMessage {
    pub domain: SigningDomain,
    pub primary_type: String,
    pub types: Vec<TypedField>,
    pub message: serde_json::Value,
}

impl StructuredMessage {
    /// Canonical bytes a signature over this message commits to.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_cbor::to_vec(self)?)
    }
}
