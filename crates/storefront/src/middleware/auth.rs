//! Authentication middleware and extractors.
//!
//! Provides extractors for requiring a signed-in customer in route handlers.
//! Both extractors refresh an expired backend access token before handing the
//! customer to the handler, so handlers can pass `customer.token()` straight
//! to row-level-security calls.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tower_sessions::Session;
use verdant_backend::BackendError;

use crate::models::{CurrentCustomer, session_keys};
use crate::state::AppState;

/// Path prefixes answered with 401 instead of a login redirect.
const JSON_PREFIXES: &[&str] = &["/api", "/assistant", "/events"];

/// Extractor that requires a signed-in customer.
///
/// If the customer is not logged in, returns a redirect to the login page
/// (or 401 for JSON and event-stream endpoints).
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(customer): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", customer.display_name())
/// }
/// ```
pub struct RequireAuth(pub CurrentCustomer);

/// Error returned when authentication is required but the customer is not logged in.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests), then come back.
    RedirectToLogin { return_to: Option<String> },
    /// HTMX fragment request: tell the client to navigate to the login page.
    HtmxRedirect,
    /// Unauthorized response (for JSON and event-stream requests).
    Unauthorized,
    /// The access token expired and the backend could not refresh it right
    /// now. The customer stays signed in.
    Unavailable,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin { return_to: None } => {
                Redirect::to("/auth/login").into_response()
            }
            Self::RedirectToLogin {
                return_to: Some(path),
            } => Redirect::to(&format!("/auth/login?next={}", urlencoding::encode(&path)))
                .into_response(),
            Self::HtmxRedirect => {
                (StatusCode::UNAUTHORIZED, [("HX-Redirect", "/auth/login")]).into_response()
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                [("Retry-After", "5")],
                "The store is briefly unavailable. Please try again in a moment.",
            )
                .into_response(),
        }
    }
}

/// Whether the path is served to scripts rather than people.
fn is_json_path(path: &str) -> bool {
    JSON_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

/// Pick the rejection that suits the request.
fn rejection_for(parts: &Parts) -> AuthRejection {
    let path = parts.uri.path();
    if is_json_path(path) {
        return AuthRejection::Unauthorized;
    }
    if parts.headers.contains_key("hx-request") {
        return AuthRejection::HtmxRedirect;
    }
    let return_to = (parts.method == axum::http::Method::GET).then(|| {
        parts
            .uri
            .path_and_query()
            .map_or_else(|| path.to_string(), ToString::to_string)
    });
    AuthRejection::RedirectToLogin { return_to }
}

/// Whether a refresh failure means the refresh token itself is dead.
///
/// The auth API answers a revoked or reused token with `400 invalid_grant`.
const fn refresh_token_rejected(err: &BackendError) -> bool {
    matches!(
        err,
        BackendError::Unauthorized(_) | BackendError::Api { status: 400, .. }
    )
}

/// Load the customer from the session, refreshing the access token if needed.
///
/// Returns `Ok(None)` when nobody is signed in or the refresh token was
/// rejected (in which case the stale customer is removed from the session).
/// Any other refresh failure leaves the session alone and is returned.
async fn load_customer(
    session: &Session,
    state: &AppState,
) -> Result<Option<CurrentCustomer>, BackendError> {
    let Some(customer) = session
        .get::<CurrentCustomer>(session_keys::CURRENT_CUSTOMER)
        .await
        .ok()
        .flatten()
    else {
        return Ok(None);
    };

    if !customer.needs_refresh(Utc::now()) {
        return Ok(Some(customer));
    }

    match state.backend().refresh_session(&customer.refresh_token).await {
        Ok(fresh) => {
            let customer = customer.refreshed(fresh);
            if let Err(e) = set_current_customer(session, &customer).await {
                tracing::warn!(error = %e, "Failed to store refreshed tokens");
            }
            tracing::debug!(user_id = %customer.id, "Refreshed access token");
            Ok(Some(customer))
        }
        Err(e) if refresh_token_rejected(&e) => {
            tracing::info!(error = %e, user_id = %customer.id, "Refresh token rejected, signing out");
            let _ = clear_current_customer(session).await;
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(error = %e, user_id = %customer.id, "Token refresh failed");
            Err(e)
        }
    }
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthRejection::Unauthorized)?;

        match load_customer(&session, state).await {
            Ok(Some(customer)) => Ok(Self(customer)),
            Ok(None) => Err(rejection_for(parts)),
            Err(_) => Err(AuthRejection::Unavailable),
        }
    }
}

/// Extractor that optionally gets the current customer.
///
/// Unlike `RequireAuth`, this does not reject the request if the customer is not logged in.
/// It only fails when a signed-in customer's token could not be refreshed,
/// so their request is not silently served as a guest.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(
///     OptionalAuth(customer): OptionalAuth,
/// ) -> impl IntoResponse {
///     match customer {
///         Some(c) => format!("Hello, {}!", c.display_name()),
///         None => "Hello, guest!".to_string(),
///     }
/// }
/// ```
pub struct OptionalAuth(pub Option<CurrentCustomer>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let customer = match parts.extensions.get::<Session>().cloned() {
            Some(session) => load_customer(&session, state)
                .await
                .map_err(|_| AuthRejection::Unavailable)?,
            None => None,
        };

        Ok(Self(customer))
    }
}

/// Helper to set the current customer in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_customer(
    session: &Session,
    customer: &CurrentCustomer,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::CURRENT_CUSTOMER, customer)
        .await
}

/// Helper to clear the current customer from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_customer(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentCustomer>(session_keys::CURRENT_CUSTOMER)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{Method, Request};
    use chrono::Duration;

    use super::*;
    use crate::test_support::{self, BackendData, FakeBackend};

    fn parts(method: Method, uri: &str, htmx: bool) -> Parts {
        let mut builder = Request::builder().method(method).uri(uri);
        if htmx {
            builder = builder.header("hx-request", "true");
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_json_paths() {
        assert!(is_json_path("/assistant/messages"));
        assert!(is_json_path("/events/stock"));
        assert!(is_json_path("/api"));
        assert!(!is_json_path("/assistants-guide"));
        assert!(!is_json_path("/checkout"));
    }

    #[test]
    fn test_html_get_redirects_back() {
        let rejection = rejection_for(&parts(Method::GET, "/orders/7?tab=items", false));
        match rejection {
            AuthRejection::RedirectToLogin { return_to } => {
                assert_eq!(return_to.as_deref(), Some("/orders/7?tab=items"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_post_does_not_remember_path() {
        let rejection = rejection_for(&parts(Method::POST, "/checkout", false));
        assert!(matches!(
            rejection,
            AuthRejection::RedirectToLogin { return_to: None }
        ));
    }

    #[test]
    fn test_htmx_and_json_rejections() {
        assert!(matches!(
            rejection_for(&parts(Method::POST, "/wishlist/toggle", true)),
            AuthRejection::HtmxRedirect
        ));
        assert!(matches!(
            rejection_for(&parts(Method::POST, "/assistant/recipes", true)),
            AuthRejection::Unauthorized
        ));
    }

    #[test]
    fn test_redirect_encodes_return_path() {
        let response = AuthRejection::RedirectToLogin {
            return_to: Some("/orders/7?tab=items".into()),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/auth/login?next=%2Forders%2F7%3Ftab%3Ditems"
        );
    }

    #[test]
    fn test_only_dead_refresh_tokens_sign_out() {
        assert!(refresh_token_rejected(&BackendError::Unauthorized("expired".into())));
        assert!(refresh_token_rejected(&BackendError::Api {
            status: 400,
            code: Some("invalid_grant".into()),
            message: "Invalid Refresh Token".into(),
        }));
        assert!(!refresh_token_rejected(&BackendError::RateLimited(30)));
        assert!(!refresh_token_rejected(&BackendError::Api {
            status: 502,
            code: None,
            message: "bad gateway".into(),
        }));
    }

    #[test]
    fn test_unavailable_keeps_customer_waiting() {
        let response = AuthRejection::Unavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key("retry-after"));
    }

    /// Session holding a customer whose access token has expired.
    async fn expired_session() -> Session {
        let session = test_support::session();
        let mut customer = test_support::customer();
        customer.expires_at = Utc::now() - Duration::minutes(1);
        set_current_customer(&session, &customer).await.unwrap();
        session
    }

    async fn state_with_token_status(status: Option<StatusCode>) -> AppState {
        FakeBackend::start(BackendData {
            token_status: status,
            ..BackendData::default()
        })
        .await
        .state()
    }

    async fn stored_customer(session: &Session) -> Option<CurrentCustomer> {
        session
            .get::<CurrentCustomer>(session_keys::CURRENT_CUSTOMER)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_outage_keeps_customer_signed_in() {
        for status in [StatusCode::SERVICE_UNAVAILABLE, StatusCode::TOO_MANY_REQUESTS] {
            let state = state_with_token_status(Some(status)).await;
            let session = expired_session().await;

            assert!(load_customer(&session, &state).await.is_err(), "{status}");
            let kept = stored_customer(&session).await.unwrap();
            assert_eq!(kept.refresh_token, "customer-refresh");
        }
    }

    #[tokio::test]
    async fn test_rejected_refresh_token_signs_out() {
        let state = state_with_token_status(Some(StatusCode::BAD_REQUEST)).await;
        let session = expired_session().await;

        assert!(load_customer(&session, &state).await.unwrap().is_none());
        assert!(stored_customer(&session).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_stored() {
        let state = state_with_token_status(None).await;
        let session = expired_session().await;

        let customer = load_customer(&session, &state).await.unwrap().unwrap();
        assert_eq!(customer.access_token, "fresh-jwt");
        assert_eq!(customer.name.as_deref(), Some("Ada"));
        assert_eq!(
            stored_customer(&session).await.unwrap().refresh_token,
            "fresh-refresh"
        );
    }
}
