//! GoTrue-style auth API: password and OAuth (PKCE) sign-in.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;
use url::Url;
use verdant_core::{Email, UserId};

use crate::{BackendClient, BackendError, Result};

/// Tokens are treated as expired this long before they actually expire.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// A user as reported by the auth API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// Display name from provider metadata, if any.
    #[must_use]
    pub fn full_name(&self) -> Option<String> {
        ["full_name", "name"]
            .iter()
            .find_map(|key| self.user_metadata.get(key)?.as_str())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
    }
}

/// A signed-in session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl AuthSession {
    /// Whether the access token should be refreshed before use.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECONDS) >= self.expires_at
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in.unwrap_or(3600)));
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Result of a sign-up.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// Email confirmation is off; the user is signed in.
    Session(AuthSession),
    /// The user must confirm their email before signing in.
    ConfirmationRequired(AuthUser),
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh random verifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Derive the challenge for a known verifier.
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        Self {
            challenge: URL_SAFE_NO_PAD.encode(digest),
            verifier,
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: serde_json::Value,
}

impl BackendClient {
    fn auth_url(&self, path: &str) -> Result<Url> {
        self.endpoint(&format!("auth/v1/{path}"))
    }

    async fn token_grant<B: Serialize + ?Sized>(&self, grant: &str, body: &B) -> Result<AuthSession> {
        let mut url = self.auth_url("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant);
        let response = self
            .execute(
                self.http()
                    .request(Method::POST, url)
                    .bearer_auth(self.bearer(None))
                    .json(body),
            )
            .await?;
        let token: TokenResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(token.into_session(Utc::now()))
    }

    /// Register a new customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is taken or the password is too weak.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignUpOutcome> {
        let url = self.auth_url("signup")?;
        let body = SignUpBody {
            email: email.as_str(),
            password,
            data: full_name.map_or_else(
                || serde_json::json!({}),
                |name| serde_json::json!({ "full_name": name }),
            ),
        };
        let response = self
            .execute(
                self.http()
                    .post(url)
                    .bearer_auth(self.bearer(None))
                    .json(&body),
            )
            .await?;
        let value: serde_json::Value = serde_json::from_slice(&response.bytes().await?)?;

        if value.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(value)?;
            return Ok(SignUpOutcome::Session(token.into_session(Utc::now())));
        }
        // Without a session the body is the user itself (or wraps it).
        let user_value = value.get("user").cloned().unwrap_or(value);
        Ok(SignUpOutcome::ConfirmationRequired(serde_json::from_value(
            user_value,
        )?))
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are rejected.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in_with_password(&self, email: &Email, password: &str) -> Result<AuthSession> {
        self.token_grant(
            "password",
            &Credentials {
                email: email.as_str(),
                password,
            },
        )
        .await
    }

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh token was revoked or already used.
    #[instrument(skip_all)]
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        self.token_grant(
            "refresh_token",
            &serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    /// Exchange an OAuth authorization code using the PKCE verifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the code or verifier is invalid.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<AuthSession> {
        self.token_grant(
            "pkce",
            &serde_json::json!({ "auth_code": code, "code_verifier": verifier }),
        )
        .await
    }

    /// Revoke the session behind `access_token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. An already expired token is
    /// not an error.
    #[instrument(skip_all)]
    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = self.auth_url("logout")?;
        match self
            .execute(self.http().post(url).bearer_auth(access_token))
            .await
        {
            Ok(_) | Err(BackendError::Unauthorized(_) | BackendError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Look up the user behind `access_token`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unauthorized`] if the token is invalid.
    #[instrument(skip_all)]
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let url = self.auth_url("user")?;
        let response = self
            .execute(self.http().get(url).bearer_auth(access_token))
            .await?;
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    /// URL to send the browser to for OAuth sign-in with `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the project URL cannot be joined.
    pub fn authorize_url(&self, provider: &str, redirect_to: &str, challenge: &str) -> Result<Url> {
        let mut url = self.auth_url("authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "s256");
        Ok(url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::BackendConfig;

    fn user() -> AuthUser {
        AuthUser {
            id: UserId::new(uuid::Uuid::nil()),
            email: Some("ada@example.com".to_string()),
            user_metadata: serde_json::json!({ "full_name": "Ada Lovelace" }),
        }
    }

    #[test]
    fn test_pkce_rfc7636_vector() {
        let pkce =
            PkceChallenge::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_pkce_generate_is_random_and_url_safe() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();
        assert_ne!(a.verifier, b.verifier);
        assert_eq!(a.verifier.len(), 43);
        assert!(
            a.verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_session_expiry_skew() {
        let now = Utc::now();
        let mut session = AuthSession {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: now + Duration::seconds(30),
            user: user(),
        };
        assert!(session.is_expired(now));
        session.expires_at = now + Duration::seconds(120);
        assert!(!session.is_expired(now));
    }

    #[test]
    fn test_token_response_prefers_expires_at() {
        let json = serde_json::json!({
            "access_token": "jwt",
            "refresh_token": "rt",
            "expires_in": 3600,
            "expires_at": 1_700_000_000,
            "token_type": "bearer",
            "user": { "id": "00000000-0000-0000-0000-000000000000", "email": "ada@example.com" }
        });
        let token: TokenResponse = serde_json::from_value(json).unwrap();
        let session = token.into_session(Utc::now());
        assert_eq!(session.expires_at.timestamp(), 1_700_000_000);
        assert_eq!(session.user.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_full_name_from_metadata() {
        assert_eq!(user().full_name().as_deref(), Some("Ada Lovelace"));
        let mut u = user();
        u.user_metadata = serde_json::json!({ "name": "  " });
        assert_eq!(u.full_name(), None);
    }

    #[test]
    fn test_authorize_url() {
        let client = BackendClient::new(&BackendConfig {
            url: "https://project.example.co".to_string(),
            api_key: SecretString::from("anon"),
        })
        .unwrap();
        let url = client
            .authorize_url("google", "https://shop.example/auth/callback", "abc")
            .unwrap();
        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".into(), "google".into())));
        assert!(pairs.contains(&("code_challenge_method".into(), "s256".into())));
        assert!(pairs.contains(&(
            "redirect_to".into(),
            "https://shop.example/auth/callback".into()
        )));
    }
}
