//! Verdant Organics storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    routing::get,
};
use tower_http::{
    services::ServeDir,
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tower_sessions::{SessionManagerLayer, SessionStore};
use tracing::Span;

use crate::state::AppState;

/// Directory served under `/static`.
pub const STATIC_DIR: &str = "crates/storefront/static";

/// Build the full application router with its middleware stack.
///
/// Layers run outermost-last: request ID wraps everything, then security
/// headers (which read the nonce set by the CSP layer), then the session.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(session_layer)
        .layer(from_fn(middleware::security_headers_middleware))
        .layer(from_fn(middleware::csp_nonce_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .layer(from_fn(middleware::request_id_middleware))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies the session database and the hosted backend are reachable.
/// Returns 503 Service Unavailable if either is down.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let (db, backend) = tokio::join!(
        sqlx::query("SELECT 1").fetch_one(state.pool()),
        state.backend().ping(),
    );
    match (db, backend) {
        (Ok(_), Ok(())) => StatusCode::OK,
        (db, backend) => {
            tracing::warn!(
                db_ok = db.is_ok(),
                backend_ok = backend.is_ok(),
                "Readiness check failed"
            );
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request, response::Response};
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::test_support::{BackendData, FakeBackend, product};

    async fn test_app() -> Router {
        let fake = FakeBackend::start(BackendData {
            products: vec![product(1, "Raw Honey", 1250, 3)],
            ..BackendData::default()
        })
        .await;
        app(fake.state(), SessionManagerLayer::new(MemoryStore::default()))
    }

    async fn send(request: Request<Body>) -> Response {
        test_app().await.oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn htmx_add(form: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/cart/add")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("hx-request", "true")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = send(Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_guest_add_to_cart_returns_badge() {
        let response = send(htmx_add("product_id=1&quantity=2")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["hx-trigger"], "cart-updated");
        let html = body_text(response).await;
        assert!(html.contains("id=\"cart-count\""));
        assert!(html.contains(">2</span>"));
    }

    #[tokio::test]
    async fn test_add_beyond_stock_is_refused() {
        let response = send(htmx_add("product_id=1&quantity=4")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = body_text(response).await;
        assert!(html.contains("data-error=\"Only 3 left in stock\""));
        assert!(html.contains(">0</span>"));
    }

    #[tokio::test]
    async fn test_checkout_sends_guests_to_login() {
        let response = send(Request::builder().uri("/checkout").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"],
            "/auth/login?next=%2Fcheckout"
        );
    }

    #[tokio::test]
    async fn test_assistant_stream_unavailable_without_gemini() {
        let response = send(
            Request::builder()
                .method("POST")
                .uri("/assistant/stream")
                .header("content-type", "application/json")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::from(r#"{"message":"What goes with honey?"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_text(response).await;
        assert!(body.contains("Assistant unavailable"));
    }
}
