use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorefrontError;

/// Refresh this long before the reported expiry so an in-flight request
/// never rides a token that dies mid-call.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Process-wide client-credentials token cache. Reads check the cached
/// entry first and only a miss (or an expired entry) hits the token
/// endpoint. Overlapping refreshes by concurrent turns are tolerated:
/// issuing a fresh token is idempotent, so a brief duplicate fetch is
/// cheaper than serializing every turn through one lock.
pub struct TokenCache {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    default_ttl: Duration,
    request_timeout: Duration,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        client_id: String,
        client_secret: SecretString,
        default_ttl: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth/access_token", base_url.trim_end_matches('/')),
            client_id,
            client_secret,
            default_ttl,
            request_timeout,
            cached: RwLock::new(None),
        }
    }

    /// Current access token, refreshed through the token endpoint when the
    /// cached one is absent or about to expire.
    pub async fn bearer(&self) -> Result<String, StorefrontError> {
        if let Some(token) = self.fresh().await {
            return Ok(token);
        }
        self.refresh().await
    }

    async fn fresh(&self) -> Option<String> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.token.expose_secret().to_owned())
    }

    async fn refresh(&self) -> Result<String, StorefrontError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .timeout(self.request_timeout)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorefrontError::Status {
                endpoint: "oauth/access_token".to_owned(),
                status: status.as_u16(),
            });
        }
        let body: TokenResponse = response.json().await.map_err(|err| StorefrontError::Decode {
            endpoint: "oauth/access_token".to_owned(),
            detail: err.to_string(),
        })?;

        let ttl = body.expires_in.map(Duration::from_secs).unwrap_or(self.default_ttl);
        let ttl = ttl.saturating_sub(EXPIRY_MARGIN).max(Duration::from_secs(1));
        let token = body.access_token;

        let mut cached = self.cached.write().await;
        *cached =
            Some(CachedToken { token: token.clone().into(), expires_at: Instant::now() + ttl });
        debug!(event_name = "storefront.token.refreshed", ttl_secs = ttl.as_secs(), "access token refreshed");

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{CachedToken, TokenCache, TokenResponse};

    fn cache() -> TokenCache {
        TokenCache::new(
            reqwest::Client::new(),
            "https://commerce.example/",
            "client".to_owned(),
            "secret".to_owned().into(),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn token_url_is_rooted_under_the_base() {
        assert_eq!(cache().token_url, "https://commerce.example/oauth/access_token");
    }

    #[test]
    fn token_response_tolerates_a_missing_lifetime() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc"}"#).expect("token json");
        assert_eq!(body.access_token, "abc");
        assert!(body.expires_in.is_none());
    }

    #[tokio::test]
    async fn cached_token_is_served_until_it_expires() {
        let cache = cache();
        {
            let mut cached = cache.cached.write().await;
            *cached = Some(CachedToken {
                token: "cached-token".to_owned().into(),
                expires_at: Instant::now() + Duration::from_secs(60),
            });
        }
        assert_eq!(cache.fresh().await.as_deref(), Some("cached-token"));

        {
            let mut cached = cache.cached.write().await;
            *cached = Some(CachedToken {
                token: "stale-token".to_owned().into(),
                expires_at: Instant::now() - Duration::from_secs(1),
            });
        }
        assert!(cache.fresh().await.is_none());
    }
}
