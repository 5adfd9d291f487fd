//! Subcommand implementations.

use secrecy::SecretString;
use thiserror::Error;
use verdant_backend::{BackendClient, BackendConfig, BackendError};

pub mod admin;
pub mod coupon;
pub mod migrate;
pub mod seed;

/// Errors shared by commands that talk to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendSetupError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// The client could not be built from the configured values.
    #[error("Backend client error: {0}")]
    Backend(#[from] BackendError),
}

/// Read a required environment variable.
pub(crate) fn required_env(key: &'static str) -> Result<String, BackendSetupError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(BackendSetupError::MissingEnvVar(key))
}

/// Backend client with the HIGH PRIVILEGE service-role key.
///
/// Reads `BACKEND_URL` and `BACKEND_SERVICE_ROLE_KEY`.
pub(crate) fn service_client() -> Result<BackendClient, BackendSetupError> {
    dotenvy::dotenv().ok();

    let config = BackendConfig {
        url: required_env("BACKEND_URL")?,
        api_key: SecretString::from(required_env("BACKEND_SERVICE_ROLE_KEY")?),
    };
    Ok(BackendClient::new(&config)?)
}
