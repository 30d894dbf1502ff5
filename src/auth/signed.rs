//! Signed chart access
//!
//! Tile downloads are authorized by a time-limited enroute key embedded in
//! the URL plus signed cookies, both obtained with the session's access
//! token. The bearer token itself never goes to the tile host.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crate::Result;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::http::HttpsClient;

/// Refetch this long before the nominal expiry
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Upper bound on any configured lifetime
const MAX_TTL_SECS: u64 = 24 * 60 * 60;

/// Time-limited credential for the tile host
#[derive(Clone)]
pub struct SignedAccess {
    /// Path segment placed in front of every tile path
    pub key: String,
    /// Value for the `Cookie` header
    pub cookies: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for SignedAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedAccess")
            .field("key", &"<redacted>")
            .field("cookies", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SignedAccess {
    pub fn new(key: String, cookies: String, ttl_secs: u64) -> Self {
        let ttl = ttl_secs.min(MAX_TTL_SECS) as i64;
        Self {
            key,
            cookies,
            expires_at: Utc::now() + Duration::seconds(ttl),
        }
    }

    /// Whether the credential expires within the safety margin
    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// Anything that can hand out signed tile access
#[async_trait]
pub trait ChartCredentials: Send + Sync {
    async fn signed_access(&self, cancel: &CancelToken) -> Result<SignedAccess>;
}

/// Where to fetch the enroute key and signed cookies from
#[derive(Debug, Clone)]
pub struct SignedAccessEndpoints {
    pub enroute_key_url: String,
    pub signed_cookies_url: String,
    pub ttl_secs: u64,
}

/// Fetch a fresh key and cookie pair using the bearer `access_token`
pub async fn fetch_signed_access(
    http: &HttpsClient,
    endpoints: &SignedAccessEndpoints,
    access_token: &str,
    cancel: &CancelToken,
) -> Result<SignedAccess> {
    let key_reply = http.get_authorized(&endpoints.enroute_key_url, access_token, cancel).await?;
    let key = key_reply.body.trim().trim_matches('"').to_string();
    if key.is_empty() || key.contains('/') {
        return Err(Error::Auth("Provider returned an unusable enroute key".to_string()));
    }

    let cookie_reply = http
        .get_authorized(&endpoints.signed_cookies_url, access_token, cancel)
        .await?;
    let cookies = cookie_reply.cookies.join("; ");
    if cookies.is_empty() {
        tracing::warn!("Provider returned no signed cookies");
    }

    tracing::debug!("Fetched signed chart access, valid for {}s", endpoints.ttl_secs);
    Ok(SignedAccess::new(key, cookies, endpoints.ttl_secs))
}
