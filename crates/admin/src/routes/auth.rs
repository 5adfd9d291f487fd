//! Authentication route handlers.
//!
//! Admins sign in with the backend's password grant. The account must carry
//! `profiles.role = admin`; everyone else is turned away before a session
//! is created.

use askama::Template;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::BackendError;
use verdant_core::Email;

use crate::{
    error::{Result, clear_sentry_user, set_sentry_user},
    filters,
    middleware::{OptionalAdminAuth, clear_current_admin, set_current_admin},
    models::{CurrentAdmin, Flash},
    state::AppState,
};

use super::render;

/// Shown for accounts that signed in fine but are not admins.
pub const NOT_AN_ADMIN: &str = "Not an admin";

/// Login page template.
#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub email: String,
    pub flashes: Vec<Flash>,
}

/// Login form input.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

fn login_error(err: &BackendError) -> &'static str {
    match err {
        BackendError::Api { status: 400, .. } | BackendError::Unauthorized(_) => {
            "Invalid email or password"
        }
        BackendError::RateLimited(_) => "Too many attempts, try again shortly",
        _ => "Sign-in is unavailable right now",
    }
}

/// Display the login page.
pub async fn login_page(
    OptionalAdminAuth(admin): OptionalAdminAuth,
    session: Session,
) -> Response {
    if admin.is_some() {
        return Redirect::to("/").into_response();
    }

    render(&LoginTemplate {
        error: None,
        email: String::new(),
        flashes: Flash::take_all(&session).await,
    })
    .into_response()
}

/// Handle login form submission.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let rerender = |error: &str| {
        render(&LoginTemplate {
            error: Some(error.to_string()),
            email: form.email.clone(),
            flashes: Vec::new(),
        })
        .into_response()
    };

    let Ok(email) = Email::parse(&form.email) else {
        return Ok(rerender("Enter a valid email address"));
    };

    let auth = match state
        .auth()
        .sign_in_with_password(&email, &form.password)
        .await
    {
        Ok(auth) => auth,
        Err(e) => {
            tracing::warn!(error = %e, "Admin login failed");
            return Ok(rerender(login_error(&e)));
        }
    };

    let profile = match state.backend().profile(auth.user.id, None).await {
        Ok(profile) if profile.is_admin() => profile,
        Ok(_) | Err(BackendError::NotFound(_)) => {
            tracing::warn!(user_id = %auth.user.id, "Non-admin attempted admin login");
            if let Err(e) = state.auth().sign_out(&auth.access_token).await {
                tracing::debug!(error = %e, "Failed to revoke non-admin session");
            }
            return Ok(rerender(NOT_AN_ADMIN));
        }
        Err(e) => return Err(e.into()),
    };

    let admin = CurrentAdmin::new(email, auth, &profile);

    // Prevent session fixation
    session.cycle_id().await?;
    set_current_admin(&session, &admin).await?;
    set_sentry_user(&admin.id, Some(admin.email.as_str()));

    tracing::info!(user_id = %admin.id, "Admin signed in");
    Ok(Redirect::to("/").into_response())
}

/// Handle logout.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    OptionalAdminAuth(admin): OptionalAdminAuth,
    session: Session,
) -> Result<Redirect> {
    if let Some(admin) = admin {
        if let Err(e) = state.auth().sign_out(&admin.access_token).await {
            tracing::warn!(error = %e, "Failed to revoke admin token");
        }
        tracing::info!(user_id = %admin.id, "Admin signed out");
    }

    clear_current_admin(&session).await?;
    session.flush().await?;
    clear_sentry_user();

    Ok(Redirect::to("/login"))
}
