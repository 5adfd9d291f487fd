//! Integration tests for Verdant Organics.
//!
//! Every test here talks to running services and is `#[ignore]`d by
//! default.
//!
//! # Running Tests
//!
//! ```bash
//! # Start both servers against a backend project with the seed catalog loaded
//! cargo run -p verdant-storefront &
//! cargo run -p verdant-admin &
//!
//! # Run the ignored tests
//! cargo test -p verdant-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_BASE_URL` - Defaults to `http://localhost:3000`
//! - `ADMIN_BASE_URL` - Defaults to `http://localhost:3001`
//! - `BACKEND_URL` and `BACKEND_ANON_KEY` - For tests that call the backend directly
//! - `TEST_CUSTOMER_EMAIL` and `TEST_CUSTOMER_PASSWORD` - An existing customer
//! - `TEST_ADMIN_EMAIL` and `TEST_ADMIN_PASSWORD` - A user with the admin role

#![allow(clippy::missing_panics_doc)]

use reqwest::{Client, StatusCode, redirect::Policy};
use secrecy::SecretString;
use verdant_backend::{BackendClient, BackendConfig};

/// Base URL for the storefront.
#[must_use]
pub fn storefront_base_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Base URL for the admin panel.
#[must_use]
pub fn admin_base_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("ADMIN_BASE_URL").unwrap_or_else(|_| "http://localhost:3001".to_string())
}

/// Read a required test variable.
#[must_use]
pub fn env(key: &str) -> String {
    dotenvy::dotenv().ok();
    std::env::var(key).unwrap_or_else(|_| panic!("{key} must be set for this test"))
}

/// Client with a cookie jar that does not follow redirects, so tests can
/// assert on `Location`.
#[must_use]
pub fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

/// Backend client with the public anon key.
#[must_use]
pub fn anon_backend() -> BackendClient {
    let config = BackendConfig {
        url: env("BACKEND_URL"),
        api_key: SecretString::from(env("BACKEND_ANON_KEY")),
    };
    BackendClient::new(&config).expect("Failed to create backend client")
}

/// The redirect target of a response.
#[must_use]
pub fn location(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Sign in to the storefront as the test customer.
pub async fn storefront_login(client: &Client) {
    let resp = client
        .post(format!("{}/auth/login", storefront_base_url()))
        .form(&[
            ("email", env("TEST_CUSTOMER_EMAIL")),
            ("password", env("TEST_CUSTOMER_PASSWORD")),
        ])
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "login should redirect");
}

/// Sign in to the admin panel as the test admin.
pub async fn admin_login(client: &Client) {
    let resp = client
        .post(format!("{}/login", admin_base_url()))
        .form(&[
            ("email", env("TEST_ADMIN_EMAIL")),
            ("password", env("TEST_ADMIN_PASSWORD")),
        ])
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "login should redirect");
    assert_eq!(location(&resp).as_deref(), Some("/"));
}
