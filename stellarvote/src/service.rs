use crate::*;
use futures::future::BoxFuture;

/// Transport to a key-management / relayer service.
///
/// Implementations only move bytes; interpreting directory documents and
/// sealed results is done by the caller.
pub trait KeyService: Send + Sync {
    /// Fetch the raw key directory document for a profile.
    fn fetch_directory<'a>(
        &'a self,
        profile: &'a KeyServiceProfile,
    ) -> BoxFuture<'a, Result<serde_json::Value, ServiceError>>;

    /// Download a key artifact.
    fn download<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, ServiceError>>;

    /// Submit a signed user decryption request.
    fn user_decrypt<'a>(
        &'a self,
        profile: &'a KeyServiceProfile,
        request: &'a UserDecryptRequest,
    ) -> BoxFuture<'a, Result<UserDecryptResponse, ServiceError>>;
}
