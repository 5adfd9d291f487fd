//! Error types for backend calls.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error payload.
    #[error("API error ({status}{}): {message}", .code.as_deref().map(|c| format!(", {c}")).unwrap_or_default())]
    Api {
        /// HTTP status code.
        status: u16,
        /// Backend error code, e.g. `P0001` or `invalid_grant`.
        code: Option<String>,
        /// Error message.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or rejected credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unique constraint or other conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Bad URL in configuration or request building.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Bad configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BackendError {
    /// The message raised by a database function (`raise exception '...'`),
    /// if this is one.
    #[must_use]
    pub fn raised_message(&self) -> Option<&str> {
        match self {
            Self::Api {
                code: Some(code),
                message,
                ..
            } if code == "P0001" => Some(message),
            _ => None,
        }
    }

    /// Whether the caller's credentials were rejected.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Error body shapes returned by the REST and auth APIs.
///
/// REST errors carry `code`/`message`; auth errors carry `error`/
/// `error_description` or `error_code`/`msg`. Every field is optional so one
/// type can read them all.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ApiErrorBody {
    /// Best available error code.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        self.error_code
            .clone()
            .or_else(|| match &self.code {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                _ => None,
            })
            .or_else(|| self.error.clone())
    }

    /// Best available human-readable message.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }
}

/// Turn a non-success status and body into a [`BackendError`].
pub(crate) fn classify(status: reqwest::StatusCode, retry_after: Option<u64>, body: &str) -> BackendError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message()
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status.as_u16() {
        401 | 403 => BackendError::Unauthorized(message),
        404 => BackendError::NotFound(message),
        409 => BackendError::Conflict(message),
        429 => BackendError::RateLimited(retry_after.unwrap_or(1)),
        code => BackendError::Api {
            status: code,
            code: parsed.code(),
            message,
        },
    }
}
