//! Data every full page needs for the shared layout.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::middleware::{AuthRejection, CspNonce, OptionalAuth};
use crate::models::Flash;
use crate::services::CartService;
use crate::state::AppState;

/// Header, footer and flash data for `base.html`.
///
/// Extracting this consumes the queued flash messages, so use it only in
/// handlers that render a full page.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub nonce: String,
    pub customer_name: Option<String>,
    pub flashes: Vec<Flash>,
    pub cart_count: u32,
    pub assistant_enabled: bool,
    pub current_path: String,
}

impl PageLayout {
    #[must_use]
    pub const fn signed_in(&self) -> bool {
        self.customer_name.is_some()
    }

    /// Whether a nav link should be marked current.
    #[must_use]
    pub fn is_current(&self, prefix: &str) -> bool {
        if prefix == "/" {
            self.current_path == "/"
        } else {
            self.current_path.starts_with(prefix)
        }
    }
}

impl FromRequestParts<AppState> for PageLayout {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Ok(CspNonce(nonce)) = CspNonce::from_request_parts(parts, state).await;
        let OptionalAuth(customer) = OptionalAuth::from_request_parts(parts, state).await?;

        let mut layout = Self {
            nonce,
            customer_name: customer.as_ref().map(crate::models::CurrentCustomer::display_name),
            assistant_enabled: state.gemini().is_some(),
            current_path: parts.uri.path().to_string(),
            ..Self::default()
        };

        let Some(session) = parts.extensions.get::<Session>().cloned() else {
            return Ok(layout);
        };

        layout.flashes = Flash::take_all(&session).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read flash messages");
            Vec::new()
        });
        layout.cart_count = CartService::new(state.backend(), &session, customer.as_ref())
            .count()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to count cart");
                0
            });

        Ok(layout)
    }
}
