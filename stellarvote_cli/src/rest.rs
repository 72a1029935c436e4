use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use stellarvote::{KeyService, KeyServiceProfile, ServiceError, UserDecryptRequest, UserDecryptResponse};

/// Key-management service reached over HTTP
pub struct HttpKeyService {
    client: Client,
}

impl HttpKeyService {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpKeyService { client })
    }

    async fn get_json(&self, url: String) -> Result<Value, ServiceError> {
        tracing::debug!("GET {}", url);
        let res = self.client.get(&url).send().await.map_err(transport)?;
        check(res).await?.json().await.map_err(malformed)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        tracing::debug!("GET {}", url);
        let res = self.client.get(url).send().await.map_err(transport)?;
        let bytes = check(res).await?.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    async fn post_decrypt(
        &self,
        url: String,
        request: &UserDecryptRequest,
    ) -> Result<UserDecryptResponse, ServiceError> {
        tracing::debug!("POST {}", url);
        let res = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        check(res).await?.json().await.map_err(malformed)
    }
}

fn transport(e: reqwest::Error) -> ServiceError {
    ServiceError::Transport(e.to_string())
}

fn malformed(e: reqwest::Error) -> ServiceError {
    ServiceError::Malformed(e.to_string())
}

// Non-2xx answers become rejections carrying the response body.
async fn check(res: Response) -> Result<Response, ServiceError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let message = res.text().await.unwrap_or_default();
    Err(ServiceError::Rejected {
        status: status.as_u16(),
        message,
    })
}

impl KeyService for HttpKeyService {
    fn fetch_directory<'a>(
        &'a self,
        profile: &'a KeyServiceProfile,
    ) -> BoxFuture<'a, Result<Value, ServiceError>> {
        self.get_json(profile.directory_url()).boxed()
    }

    fn download<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, ServiceError>> {
        self.get_bytes(url).boxed()
    }

    fn user_decrypt<'a>(
        &'a self,
        profile: &'a KeyServiceProfile,
        request: &'a UserDecryptRequest,
    ) -> BoxFuture<'a, Result<UserDecryptResponse, ServiceError>> {
        self.post_decrypt(profile.user_decrypt_url(), request).boxed()
    }
}
