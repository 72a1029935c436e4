use crate::*;

use thiserror::Error;

/// Error types
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("stellarvote: unsupported network {0}")]
    UnsupportedNetwork(NetworkId),

    #[error("stellarvote: invalid choice {choice} for a ballot with {options} options")]
    InvalidChoice { choice: usize, options: usize },

    #[error("stellarvote: key material fetch failed at the {stage} stage: {cause}")]
    KeyFetchFailed { stage: FetchStage, cause: ServiceError },

    #[error("stellarvote: encoding failed: {0}")]
    EncodeError(String),

    #[error("stellarvote: signature denied: {0}")]
    SignatureDenied(String),

    #[error("stellarvote: decryption denied: {0}")]
    DecryptionDenied(String),

    #[error("stellarvote: transport error: {0}")]
    TransportError(String),

    #[error("stellarvote: chain error: {0}")]
    ChainError(ChainFailure),

    #[error("stellarvote: ballot binding mismatch: {0}")]
    BindingMismatch(String),

    #[error("stellarvote: vote attempt cancelled before broadcast")]
    Cancelled,

    #[error("stellarvote: a vote attempt is already in flight (state: {0})")]
    AttemptInFlight(&'static str),

    #[error("stellarvote: results are not available while the proposal is {0}")]
    ResultsUnavailable(ProposalStatus),

    #[error("stellarvote: unknown proposal status code {0}")]
    UnknownStatus(u8),

    #[error("stellarvote: proposal {0} not found")]
    ProposalNotFound(u64),

    #[error("stellarvote: tally has {found} counts for {expected} options")]
    TallyMismatch { expected: usize, found: usize },

    #[error("stellarvote: invalid signature")]
    InvalidSignature,

    #[error("stellarvote: invalid {0} - invalid hexidecimal")]
    BadHex(&'static str),

    #[error("stellarvote: invalid {kind} - expected {expected} bytes, found {found}")]
    BadLength {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("stellarvote: serialization error: {0}")]
    Serialization(String),

    #[error("stellarvote: system clock error: {0}")]
    Clock(String),

    #[error("stellarvote: configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether re-invoking the failed operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransportError(_) => true,
            Error::KeyFetchFailed { cause, .. } => cause.is_transport(),
            Error::ChainError(ChainFailure::Timeout { .. }) => true,
            _ => false,
        }
    }
}

impl From<serde_cbor::Error> for Error {
    fn from(err: serde_cbor::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Failures reported by a key-management or relayer service.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("service rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ServiceError::Transport(_))
    }
}

/// The stage of a key material fetch that failed
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    Directory,
    PublicKey,
    PublicParams,
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            FetchStage::Directory => "directory",
            FetchStage::PublicKey => "public key",
            FetchStage::PublicParams => "public params",
        };
        write!(f, "{}", name)
    }
}

/// Why a broadcast transaction did not confirm
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChainFailure {
    Reverted(String),
    Timeout { after_secs: u64 },

    /// The caller stopped waiting for a broadcast transaction
    Abandoned(TxRef),
}

impl std::fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ChainFailure::Reverted(reason) => write!(f, "transaction reverted: {}", reason),
            ChainFailure::Timeout { after_secs } => {
                write!(f, "no confirmation after {} seconds", after_secs)
            }
            ChainFailure::Abandoned(tx) => write!(f, "stopped waiting for {} to confirm", tx),
        }
    }
}
