//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use verdant_backend::{BackendClient, BackendError};

use crate::config::AdminConfig;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Holds two backend clients: the service-role
/// client for every data call, and an anon-key client used only to check an
/// admin's password.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    pool: PgPool,
    backend: BackendClient,
    auth: BackendClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if either backend client cannot be built.
    pub fn new(config: AdminConfig, pool: PgPool) -> Result<Self, BackendError> {
        let backend = BackendClient::new(&config.service_backend)?;
        let auth = BackendClient::new(&config.auth_backend)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                backend,
                auth,
            }),
        })
    }

    /// Get a reference to the admin configuration.
    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    /// Get a reference to the session database pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Service-role backend client (HIGH PRIVILEGE, bypasses row-level security).
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Anon-key backend client for password sign-in.
    #[must_use]
    pub fn auth(&self) -> &BackendClient {
        &self.inner.auth
    }
}
