//! Authentication route handlers.
//!
//! Password sign-in and sign-up go through the backend's auth API. OAuth
//! sign-in uses the authorization-code flow with PKCE: the verifier and a
//! random state value wait in the session until the provider redirects back.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::{AuthSession, BackendError, PkceChallenge, SignUpOutcome};
use verdant_core::Email;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalAuth, clear_current_customer, set_current_customer};
use crate::models::{CurrentCustomer, Flash, session_keys};
use crate::routes::layout::PageLayout;
use crate::services::CartService;
use crate::state::AppState;

/// OAuth providers enabled on the backend project.
pub const OAUTH_PROVIDERS: &[&str] = &["google", "github"];

/// Minimum password length accepted at sign-up.
const MIN_PASSWORD_LEN: usize = 8;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub next: Option<String>,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub full_name: Option<String>,
    pub next: Option<String>,
}

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters for pages that return somewhere afterwards.
#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Query parameters on the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: PageLayout,
    pub error: Option<String>,
    pub email: String,
    pub next: String,
    pub providers: &'static [&'static str],
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub layout: PageLayout,
    pub error: Option<String>,
    pub email: String,
    pub full_name: String,
    pub next: String,
    pub providers: &'static [&'static str],
}

/// Shown when sign-up needs email confirmation first.
#[derive(Template, WebTemplate)]
#[template(path = "auth/check_email.html")]
pub struct CheckEmailTemplate {
    pub layout: PageLayout,
    pub email: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// Accept only same-site relative paths as a post-login destination.
#[must_use]
pub fn safe_next(next: Option<&str>) -> Option<String> {
    next.map(str::trim)
        .filter(|path| path.starts_with('/') && !path.starts_with("//") && !path.contains('\\'))
        .filter(|path| !path.starts_with("/auth/"))
        .map(ToString::to_string)
}

fn random_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Store the customer, merge their guest cart and tag Sentry.
async fn complete_sign_in(
    state: &AppState,
    session: &Session,
    auth: AuthSession,
) -> Result<CurrentCustomer> {
    // New session ID on privilege change.
    session.cycle_id().await?;

    let customer = CurrentCustomer::from_auth(auth);
    set_current_customer(session, &customer).await?;
    set_sentry_user(&customer.id, Some(&customer.email));

    let cart = CartService::new(state.backend(), session, Some(&customer));
    match cart.merge_guest_cart().await {
        Ok(notices) => {
            for notice in notices {
                Flash::info(notice).push(session).await?;
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to merge guest cart"),
    }

    tracing::info!(user_id = %customer.id, "Customer signed in");
    Ok(customer)
}

fn sign_in_error(err: &BackendError) -> &'static str {
    match err {
        BackendError::Api { status: 400, .. } | BackendError::Unauthorized(_) => {
            "Invalid email or password."
        }
        BackendError::RateLimited(_) => "Too many attempts. Please wait a minute and try again.",
        _ => "Sign-in is unavailable right now. Please try again.",
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    layout: PageLayout,
    OptionalAuth(customer): OptionalAuth,
    Query(query): Query<NextQuery>,
) -> Response {
    let next = safe_next(query.next.as_deref());
    if customer.is_some() {
        return Redirect::to(next.as_deref().unwrap_or("/account")).into_response();
    }
    LoginTemplate {
        layout,
        error: None,
        email: String::new(),
        next: next.unwrap_or_default(),
        providers: OAUTH_PROVIDERS,
    }
    .into_response()
}

/// Handle login form submission.
#[instrument(skip(state, session, layout, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    layout: PageLayout,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let next = safe_next(form.next.as_deref());
    let rerender = |error: &str| LoginTemplate {
        layout: layout.clone(),
        error: Some(error.to_string()),
        email: form.email.clone(),
        next: next.clone().unwrap_or_default(),
        providers: OAUTH_PROVIDERS,
    };

    let Ok(email) = Email::parse(&form.email) else {
        return Ok(rerender("Enter a valid email address.").into_response());
    };

    match state
        .backend()
        .sign_in_with_password(&email, &form.password)
        .await
    {
        Ok(auth) => {
            let customer = complete_sign_in(&state, &session, auth).await?;
            Flash::success(format!("Welcome back, {}!", customer.display_name()))
                .push(&session)
                .await?;
            Ok(Redirect::to(next.as_deref().unwrap_or("/")).into_response())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Login failed");
            Ok(rerender(sign_in_error(&e)).into_response())
        }
    }
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(
    layout: PageLayout,
    OptionalAuth(customer): OptionalAuth,
    Query(query): Query<NextQuery>,
) -> Response {
    if customer.is_some() {
        return Redirect::to("/account").into_response();
    }
    RegisterTemplate {
        layout,
        error: None,
        email: String::new(),
        full_name: String::new(),
        next: safe_next(query.next.as_deref()).unwrap_or_default(),
        providers: OAUTH_PROVIDERS,
    }
    .into_response()
}

fn validate_registration(form: &RegisterForm) -> std::result::Result<Email, String> {
    let email = Email::parse(&form.email).map_err(|e| format!("Email: {e}."))?;
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    if form.password != form.password_confirm {
        return Err("Passwords do not match.".to_string());
    }
    Ok(email)
}

/// Handle registration form submission.
#[instrument(skip(state, session, layout, form), fields(email = %form.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    layout: PageLayout,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    let next = safe_next(form.next.as_deref());
    let full_name = form
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(ToString::to_string);
    let rerender = |error: String| RegisterTemplate {
        layout: layout.clone(),
        error: Some(error),
        email: form.email.clone(),
        full_name: full_name.clone().unwrap_or_default(),
        next: next.clone().unwrap_or_default(),
        providers: OAUTH_PROVIDERS,
    };

    let email = match validate_registration(&form) {
        Ok(email) => email,
        Err(message) => return Ok(rerender(message).into_response()),
    };

    match state
        .backend()
        .sign_up(&email, &form.password, full_name.as_deref())
        .await
    {
        Ok(SignUpOutcome::Session(auth)) => {
            let customer = complete_sign_in(&state, &session, auth).await?;
            Flash::success(format!("Welcome to Verdant, {}!", customer.display_name()))
                .push(&session)
                .await?;
            Ok(Redirect::to(next.as_deref().unwrap_or("/")).into_response())
        }
        Ok(SignUpOutcome::ConfirmationRequired(_)) => {
            tracing::info!("Sign-up awaiting email confirmation");
            Ok(CheckEmailTemplate {
                layout: layout.clone(),
                email: email.to_string(),
            }
            .into_response())
        }
        Err(BackendError::Conflict(_) | BackendError::Api { status: 422, .. }) => Ok(rerender(
            "An account with this email already exists.".to_string(),
        )
        .into_response()),
        Err(e) => {
            tracing::warn!(error = %e, "Registration failed");
            Ok(rerender("Registration failed. Please try again.".to_string()).into_response())
        }
    }
}

// =============================================================================
// Logout
// =============================================================================

/// Sign out, revoke the backend session, and drop the local session.
#[instrument(skip(state, session, customer))]
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
) -> Result<Redirect> {
    if let Some(customer) = customer {
        if let Err(e) = state.backend().sign_out(&customer.access_token).await {
            tracing::warn!(error = %e, "Failed to revoke backend session");
        }
        tracing::info!(user_id = %customer.id, "Customer signed out");
    }

    clear_current_customer(&session).await?;
    clear_sentry_user();
    session.flush().await?;

    Ok(Redirect::to("/"))
}

// =============================================================================
// OAuth (PKCE)
// =============================================================================

/// Start OAuth sign-in with `provider`.
#[instrument(skip(state, session))]
pub async fn oauth_start(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
    Query(query): Query<NextQuery>,
) -> Result<Redirect> {
    if !OAUTH_PROVIDERS.contains(&provider.as_str()) {
        return Err(AppError::NotFound(format!("sign-in provider {provider}")));
    }

    let pkce = PkceChallenge::generate();
    let csrf_state = random_state();
    let callback = format!(
        "{}?state={csrf_state}",
        state.config().absolute_url("/auth/callback")
    );

    session.insert(session_keys::OAUTH_STATE, &csrf_state).await?;
    session
        .insert(session_keys::OAUTH_VERIFIER, &pkce.verifier)
        .await?;
    if let Some(next) = safe_next(query.next.as_deref()) {
        session.insert(session_keys::RETURN_TO, next).await?;
    }

    let url = state
        .backend()
        .authorize_url(&provider, &callback, &pkce.challenge)?;
    Ok(Redirect::to(url.as_str()))
}

/// Finish OAuth sign-in: check state, exchange the code, sign in.
#[instrument(skip(state, session, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect> {
    let expected: Option<String> = session.remove(session_keys::OAUTH_STATE).await?;
    let verifier: Option<String> = session.remove(session_keys::OAUTH_VERIFIER).await?;
    let return_to: Option<String> = session.remove(session_keys::RETURN_TO).await?;

    if let Some(error) = query.error {
        tracing::warn!(%error, description = ?query.error_description, "OAuth provider refused");
        Flash::error("Sign-in was cancelled or refused.")
            .push(&session)
            .await?;
        return Ok(Redirect::to("/auth/login"));
    }

    let (Some(code), Some(verifier)) = (query.code, verifier) else {
        Flash::error("Sign-in expired. Please try again.")
            .push(&session)
            .await?;
        return Ok(Redirect::to("/auth/login"));
    };
    if expected.is_none() || query.state != expected {
        tracing::warn!("OAuth state mismatch");
        Flash::error("Sign-in expired. Please try again.")
            .push(&session)
            .await?;
        return Ok(Redirect::to("/auth/login"));
    }

    match state.backend().exchange_code(&code, &verifier).await {
        Ok(auth) => {
            let customer = complete_sign_in(&state, &session, auth).await?;
            Flash::success(format!("Welcome, {}!", customer.display_name()))
                .push(&session)
                .await?;
            Ok(Redirect::to(
                safe_next(return_to.as_deref()).as_deref().unwrap_or("/"),
            ))
        }
        Err(e) => {
            tracing::warn!(error = %e, "OAuth code exchange failed");
            Flash::error("Sign-in failed. Please try again.")
                .push(&session)
                .await?;
            Ok(Redirect::to("/auth/login"))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next_accepts_local_paths() {
        assert_eq!(safe_next(Some("/checkout")).as_deref(), Some("/checkout"));
        assert_eq!(
            safe_next(Some("/products?q=oat")).as_deref(),
            Some("/products?q=oat")
        );
    }

    #[test]
    fn test_safe_next_rejects_offsite_and_auth_paths() {
        assert!(safe_next(Some("//evil.example")).is_none());
        assert!(safe_next(Some("https://evil.example")).is_none());
        assert!(safe_next(Some("/\\evil.example")).is_none());
        assert!(safe_next(Some("/auth/login")).is_none());
        assert!(safe_next(None).is_none());
    }

    #[test]
    fn test_random_state_is_unique() {
        let a = random_state();
        let b = random_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    fn form(password: &str, confirm: &str) -> RegisterForm {
        RegisterForm {
            email: "ada@example.com".to_string(),
            password: password.to_string(),
            password_confirm: confirm.to_string(),
            full_name: None,
            next: None,
        }
    }

    #[test]
    fn test_validate_registration() {
        assert!(validate_registration(&form("longenough", "longenough")).is_ok());
        assert_eq!(
            validate_registration(&form("short", "short")).unwrap_err(),
            "Password must be at least 8 characters."
        );
        assert_eq!(
            validate_registration(&form("longenough", "different")).unwrap_err(),
            "Passwords do not match."
        );
    }
}
