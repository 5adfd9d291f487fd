//! Client for the hosted backend that stores Verdant's data.
//!
//! # Architecture
//!
//! - The backend is the source of truth - NO local copies of catalog or orders
//! - Data goes through the PostgREST-style REST API (`/rest/v1`)
//! - Auth goes through the GoTrue-style auth API (`/auth/v1`)
//! - Product images go through the object storage API (`/storage/v1`)
//! - Row-level security decides what a caller may see; the storefront passes
//!   the signed-in customer's access token, the admin panel uses the
//!   service-role key
//!
//! # Example
//!
//! ```rust,ignore
//! use verdant_backend::{BackendClient, BackendConfig, ProductFilter};
//!
//! let client = BackendClient::new(&config)?;
//!
//! let page = client.list_products(&ProductFilter::default()).await?;
//! let product = client.product_by_slug("raw-wildflower-honey").await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
mod error;
pub mod rest;
pub mod storage;
mod tables;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

pub use auth::{AuthSession, AuthUser, PkceChallenge, SignUpOutcome};
pub use error::{ApiErrorBody, BackendError};
pub use rest::{Page, Query};
pub use tables::products::{ProductFilter, ProductSort};
pub use types::*;

/// Result alias for backend calls.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Connection settings for the hosted backend.
///
/// Implements `Debug` manually to redact the key.
#[derive(Clone)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://abcd.example-backend.co`
    pub url: String,
    /// Anon key (storefront) or service-role key (admin, CLI)
    pub api_key: SecretString,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Client for the hosted backend.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the key is not a valid header
    /// value, or the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut base_url = Url::parse(config.url.trim_end_matches('/'))?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|_| BackendError::InvalidConfig("api key is not a valid header".into()))?;
        headers.insert("apikey", key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                http,
                base_url,
                api_key: config.api_key.clone(),
            }),
        })
    }

    /// Resolve a path relative to the project URL.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.inner.base_url.join(path.trim_start_matches('/'))?)
    }

    /// The bearer to send: a user's access token, or the client's own key.
    pub(crate) fn bearer<'a>(&'a self, token: Option<&'a str>) -> &'a str {
        token.unwrap_or_else(|| self.inner.api_key.expose_secret())
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Project base URL (used to build public storage links).
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Cheap reachability check for the readiness endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the REST API does not answer successfully.
    pub async fn ping(&self) -> Result<()> {
        let query = Query::table("store_settings").select("id").limit(1);
        self.select::<serde_json::Value>(&query, None).await.map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(url: &str) -> BackendClient {
        BackendClient::new(&BackendConfig {
            url: url.to_string(),
            api_key: SecretString::from("anon-key"),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let c = client("https://project.example.co/");
        assert_eq!(
            c.endpoint("/rest/v1/products").unwrap().as_str(),
            "https://project.example.co/rest/v1/products"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let c = client("http://localhost:54321/backend");
        assert_eq!(
            c.endpoint("auth/v1/token").unwrap().as_str(),
            "http://localhost:54321/backend/auth/v1/token"
        );
    }

    #[test]
    fn test_bearer_falls_back_to_key() {
        let c = client("https://project.example.co");
        assert_eq!(c.bearer(None), "anon-key");
        assert_eq!(c.bearer(Some("user-jwt")), "user-jwt");
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = BackendConfig {
            url: "https://project.example.co".to_string(),
            api_key: SecretString::from("service-role-secret"),
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("service-role-secret"));
    }

    #[test]
    fn test_client_is_clone_send_sync() {
        fn assert_traits<T: Clone + Send + Sync>() {}
        assert_traits::<BackendClient>();
    }
}
