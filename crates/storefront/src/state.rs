//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use verdant_backend::{BackendClient, BackendError};

use crate::config::StorefrontConfig;
use crate::services::catalog::CatalogService;
use crate::services::gemini::{GeminiClient, GeminiError};
use crate::services::stock::StockWatcher;

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("backend client: {0}")]
    Backend(#[from] BackendError),
    #[error("gemini client: {0}")]
    Gemini(#[from] GeminiError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the backend client, caches and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    backend: BackendClient,
    catalog: CatalogService,
    stock: StockWatcher,
    gemini: Option<GeminiClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend or Gemini client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let backend = BackendClient::new(&config.backend)?;
        let catalog = CatalogService::new(backend.clone());
        let gemini = config
            .gemini
            .as_ref()
            .map(GeminiClient::new)
            .transpose()?;

        if gemini.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; shopping assistant disabled");
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                backend,
                catalog,
                stock: StockWatcher::new(),
                gemini,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the session database pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the hosted backend client (anon key).
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Get a reference to the cached catalog.
    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    /// Get a reference to the stock change broadcaster.
    #[must_use]
    pub fn stock(&self) -> &StockWatcher {
        &self.inner.stock
    }

    /// Get the Gemini client, if the assistant is enabled.
    #[must_use]
    pub fn gemini(&self) -> Option<&GeminiClient> {
        self.inner.gemini.as_ref()
    }

    /// Start the background stock poller.
    pub fn start_stock_watcher(&self) -> tokio::task::JoinHandle<()> {
        self.inner.stock.spawn_poller(
            self.inner.backend.clone(),
            self.inner.catalog.clone(),
            self.inner.config.stock_poll_interval,
        )
    }
}
