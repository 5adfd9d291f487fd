//! Session-related types.
//!
//! Types stored in the session for authentication state, the guest cart,
//! and one-shot flash messages.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use verdant_backend::AuthSession;
use verdant_core::UserId;

/// Refresh this long before the access token actually expires.
const REFRESH_SKEW_SECONDS: i64 = 60;

/// Session-stored customer identity and backend tokens.
///
/// Implements `Debug` manually to redact the tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentCustomer {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for CurrentCustomer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentCustomer")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CurrentCustomer {
    /// Build from a fresh backend session.
    #[must_use]
    pub fn from_auth(session: AuthSession) -> Self {
        let name = session.user.full_name();
        Self {
            id: session.user.id,
            email: session.user.email.unwrap_or_default(),
            name,
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_at: session.expires_at,
        }
    }

    /// Swap in refreshed tokens, keeping the display name we already have.
    #[must_use]
    pub fn refreshed(self, session: AuthSession) -> Self {
        let name = session.user.full_name().or(self.name);
        Self {
            name,
            ..Self::from_auth(session)
        }
    }

    /// Whether the access token must be refreshed before use.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_SKEW_SECONDS) >= self.expires_at
    }

    /// Name for greetings, falling back to the email's local part.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.email
                .split('@')
                .next()
                .unwrap_or(&self.email)
                .to_string()
        })
    }

    /// Access token for row-level-security calls.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        Some(&self.access_token)
    }
}

/// Flash message severity; doubles as a CSS modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Success,
    Info,
    Error,
}

impl FlashKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

/// A message shown once on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    /// Queue this message for the next page.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or written.
    pub async fn push(self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        let mut queued: Vec<Self> = session
            .get(session_keys::FLASH)
            .await?
            .unwrap_or_default();
        queued.push(self);
        session.insert(session_keys::FLASH, queued).await
    }

    /// Take every queued message.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be modified.
    pub async fn take_all(session: &Session) -> Result<Vec<Self>, tower_sessions::session::Error> {
        Ok(session
            .remove::<Vec<Self>>(session_keys::FLASH)
            .await?
            .unwrap_or_default())
    }
}

/// Session keys.
pub mod session_keys {
    /// Key for storing the current logged-in customer.
    pub const CURRENT_CUSTOMER: &str = "current_customer";

    /// Key for the guest cart (`Vec<CartLine>`).
    pub const GUEST_CART: &str = "guest_cart";

    /// Key for the cached cart badge count.
    pub const CART_COUNT: &str = "cart_count";

    /// Key for the coupon code applied at checkout.
    pub const COUPON_CODE: &str = "coupon_code";

    /// Key for queued flash messages.
    pub const FLASH: &str = "flash";

    /// Key for the OAuth state parameter (CSRF protection).
    pub const OAUTH_STATE: &str = "oauth_state";

    /// Key for the PKCE code verifier.
    pub const OAUTH_VERIFIER: &str = "oauth_verifier";

    /// Key for the page to return to after signing in.
    pub const RETURN_TO: &str = "return_to";

    /// Key for the assistant conversation history.
    pub const ASSISTANT_HISTORY: &str = "assistant_history";
}
