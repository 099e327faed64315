use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::auth::TokenCache;
use crate::error::StorefrontError;

/// Shared request plumbing for the typed clients: base-url resolution,
/// bearer injection, the bounded per-call timeout, and status/decode
/// mapping. Endpoint shapes live in the client modules.
pub(crate) struct ApiContext {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenCache>,
    request_timeout: Duration,
}

impl ApiContext {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: &str,
        tokens: Arc<TokenCache>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            tokens,
            request_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub(crate) async fn get_json(&self, path: &str) -> Result<Value, StorefrontError> {
        let bearer = self.tokens.bearer().await?;
        let response = self
            .http
            .get(self.url(path))
            .timeout(self.request_timeout)
            .bearer_auth(bearer)
            .send()
            .await?;
        decode(path, response).await
    }

    pub(crate) async fn post_json(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<Value, StorefrontError> {
        let bearer = self.tokens.bearer().await?;
        let response = self
            .http
            .post(self.url(path))
            .timeout(self.request_timeout)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await?;
        decode(path, response).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), StorefrontError> {
        let bearer = self.tokens.bearer().await?;
        let response = self
            .http
            .delete(self.url(path))
            .timeout(self.request_timeout)
            .bearer_auth(bearer)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorefrontError::Status { endpoint: path.to_owned(), status: status.as_u16() });
        }
        Ok(())
    }

    /// Fetches raw bytes from an absolute URL, e.g. a file-storage link
    /// returned by the files endpoint. No bearer: the links are signed.
    pub(crate) async fn download(&self, url: &str) -> Result<Vec<u8>, StorefrontError> {
        let response = self.http.get(url).timeout(self.request_timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorefrontError::Status { endpoint: url.to_owned(), status: status.as_u16() });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

async fn decode(path: &str, response: reqwest::Response) -> Result<Value, StorefrontError> {
    let status = response.status();
    if !status.is_success() {
        return Err(StorefrontError::Status { endpoint: path.to_owned(), status: status.as_u16() });
    }
    response.json().await.map_err(|err| StorefrontError::Decode {
        endpoint: path.to_owned(),
        detail: err.to_string(),
    })
}
