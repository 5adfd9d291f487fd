//! Admin role management commands.
//!
//! Admins are ordinary backend users whose profile row carries the `admin`
//! role. The user must have signed up on the storefront first.
//!
//! # Usage
//!
//! ```bash
//! # Give an existing user access to the admin panel
//! verdant admin grant owner@example.com
//!
//! # Take it away again
//! verdant admin revoke owner@example.com
//! ```
//!
//! # Environment Variables
//!
//! - `BACKEND_URL` - Backend project URL
//! - `BACKEND_SERVICE_ROLE_KEY` - Service-role key (bypasses row policies)

use thiserror::Error;
use verdant_backend::BackendError;
use verdant_core::{Email, UserRole};

use super::{BackendSetupError, service_client};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Setup(#[from] BackendSetupError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No profile has the email.
    #[error("No user with email {0}. They need to sign up on the storefront first")]
    UserNotFound(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

async fn set_role(email: &str, role: UserRole) -> Result<(), AdminError> {
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let client = service_client()?;

    let profile = match client.profile_by_email(&email).await {
        Ok(profile) => profile,
        Err(BackendError::NotFound(_)) => {
            return Err(AdminError::UserNotFound(email.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    if profile.role == role {
        tracing::info!("{} already has the {:?} role", email, role);
        return Ok(());
    }

    let updated = client.set_role(profile.id, role).await?;
    tracing::info!(
        "Role updated! ID: {}, Email: {}, Role: {:?}",
        updated.id,
        email,
        updated.role
    );
    Ok(())
}

/// Give a user the admin role.
///
/// # Errors
///
/// Returns an error if the email is invalid, no user has it, or the update
/// fails.
pub async fn grant(email: &str) -> Result<(), AdminError> {
    set_role(email, UserRole::Admin).await
}

/// Return an admin to the customer role.
///
/// The role is checked at login, so an open admin session stays valid until
/// it expires or signs out.
///
/// # Errors
///
/// Returns an error if the email is invalid, no user has it, or the update
/// fails.
pub async fn revoke(email: &str) -> Result<(), AdminError> {
    set_role(email, UserRole::Customer).await
}
