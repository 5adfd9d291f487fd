//! Session-related types for admin authentication.
//!
//! Types stored in the session for authentication state and one-shot
//! messages shown after a redirect.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use verdant_backend::{AuthSession, Profile};
use verdant_core::{Email, UserId};

/// Session-stored admin identity.
///
/// Minimal data stored in the session to identify the logged-in admin. The
/// access token is kept only so logout can revoke it; data calls use the
/// service-role key.
#[derive(Clone, Serialize, Deserialize)]
pub struct CurrentAdmin {
    /// Backend user ID.
    pub id: UserId,
    /// Admin's email address.
    pub email: Email,
    /// Admin's display name.
    pub name: String,
    /// Backend access token from the password grant.
    pub access_token: String,
}

impl std::fmt::Debug for CurrentAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentAdmin")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl CurrentAdmin {
    /// Build from a successful sign-in and the matching profile row.
    #[must_use]
    pub fn new(email: Email, auth: AuthSession, profile: &Profile) -> Self {
        let name = profile
            .full_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| auth.user.full_name())
            .unwrap_or_else(|| email.local_part().to_string());
        Self {
            id: auth.user.id,
            email,
            name,
            access_token: auth.access_token,
        }
    }
}

/// Flash message severity; doubles as a CSS modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Success,
    Error,
}

impl FlashKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
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

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    /// Queue this message for the next page. Failures are logged, not raised.
    pub async fn push(self, session: &Session) {
        let mut queued: Vec<Self> = session
            .get(keys::FLASH)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        queued.push(self);
        if let Err(e) = session.insert(keys::FLASH, queued).await {
            tracing::warn!(error = %e, "Failed to queue flash message");
        }
    }

    /// Take every queued message.
    pub async fn take_all(session: &Session) -> Vec<Self> {
        session
            .remove::<Vec<Self>>(keys::FLASH)
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }
}

/// Session keys for admin data.
pub mod keys {
    /// Key for storing the current logged-in admin.
    pub const CURRENT_ADMIN: &str = "current_admin";

    /// Key for queued flash messages.
    pub const FLASH: &str = "flash";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use tower_sessions::MemoryStore;
    use verdant_backend::AuthUser;
    use verdant_core::UserRole;

    use super::*;

    fn sign_in() -> AuthSession {
        AuthSession {
            access_token: "access-token".into(),
            refresh_token: "refresh".into(),
            expires_at: Utc::now() + Duration::hours(1),
            user: AuthUser {
                id: UserId::new(uuid::Uuid::nil()),
                email: Some("grace@verdant.test".into()),
                user_metadata: serde_json::Value::Null,
            },
        }
    }

    fn profile(full_name: Option<&str>) -> Profile {
        Profile {
            id: UserId::new(uuid::Uuid::nil()),
            email: Some("grace@verdant.test".into()),
            full_name: full_name.map(String::from),
            phone: None,
            role: UserRole::Admin,
            default_address: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_name_prefers_profile_then_email() {
        let email = Email::parse("grace@verdant.test").unwrap();
        let admin = CurrentAdmin::new(email.clone(), sign_in(), &profile(Some("Grace Hopper")));
        assert_eq!(admin.name, "Grace Hopper");

        let admin = CurrentAdmin::new(email, sign_in(), &profile(Some("  ")));
        assert_eq!(admin.name, "grace");
    }

    #[test]
    fn test_debug_redacts_token() {
        let email = Email::parse("grace@verdant.test").unwrap();
        let admin = CurrentAdmin::new(email, sign_in(), &profile(None));
        assert!(!format!("{admin:?}").contains("access-token"));
    }

    #[tokio::test]
    async fn test_flash_is_shown_once() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        Flash::success("Product saved").push(&session).await;

        let flashes = Flash::take_all(&session).await;
        assert_eq!(flashes, vec![Flash::success("Product saved")]);
        assert!(Flash::take_all(&session).await.is_empty());
    }
}
