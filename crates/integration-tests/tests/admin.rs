//! Integration tests for the admin panel.
//!
//! These tests require:
//! - The admin panel running (cargo run -p verdant-admin)
//! - `TEST_ADMIN_*` credentials for a user granted the admin role
//!   (verdant admin grant -e ...)
//!
//! Run with: cargo test -p verdant-integration-tests -- --ignored

use reqwest::{StatusCode, header};
use uuid::Uuid;
use verdant_integration_tests::{admin_base_url, admin_login, client, env, location};

// ============================================================================
// Access Control
// ============================================================================

#[tokio::test]
#[ignore = "Requires running admin panel"]
async fn test_pages_redirect_to_login() {
    let client = client();
    let base_url = admin_base_url();

    for path in ["/", "/products", "/orders", "/coupons", "/settings"] {
        let resp = client
            .get(format!("{base_url}{path}"))
            .send()
            .await
            .expect("Failed to load page");
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&resp).as_deref(), Some("/login"), "{path}");
    }
}

#[tokio::test]
#[ignore = "Requires running admin panel"]
async fn test_login_page_is_not_cached() {
    let resp = client()
        .get(format!("{}/login", admin_base_url()))
        .send()
        .await
        .expect("Failed to load login page");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
        Some("no-store")
    );
}

#[tokio::test]
#[ignore = "Requires running admin panel and TEST_CUSTOMER_* credentials"]
async fn test_customer_cannot_sign_in() {
    let resp = client()
        .post(format!("{}/login", admin_base_url()))
        .form(&[
            ("email", env("TEST_CUSTOMER_EMAIL")),
            ("password", env("TEST_CUSTOMER_PASSWORD")),
        ])
        .send()
        .await
        .expect("Failed to post login");

    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("Not an admin"));
}

#[tokio::test]
#[ignore = "Requires running admin panel"]
async fn test_wrong_password_rerenders_login() {
    let resp = client()
        .post(format!("{}/login", admin_base_url()))
        .form(&[
            ("email", "nobody@example.com"),
            ("password", "definitely-wrong"),
        ])
        .send()
        .await
        .expect("Failed to post login");

    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("Invalid email or password"));
}

// ============================================================================
// Dashboard & Listings
// ============================================================================

#[tokio::test]
#[ignore = "Requires running admin panel and TEST_ADMIN_* credentials"]
async fn test_admin_pages_render() {
    let client = client();
    let base_url = admin_base_url();
    admin_login(&client).await;

    for path in [
        "/",
        "/products",
        "/products/new",
        "/orders",
        "/orders?status=pending",
        "/coupons",
        "/settings",
    ] {
        let resp = client
            .get(format!("{base_url}{path}"))
            .send()
            .await
            .expect("Failed to load page");
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
    }
}

// ============================================================================
// Coupons
// ============================================================================

#[tokio::test]
#[ignore = "Requires running admin panel and TEST_ADMIN_* credentials"]
async fn test_coupon_create_and_delete() {
    let client = client();
    let base_url = admin_base_url();
    admin_login(&client).await;

    let code = format!("IT{}", &Uuid::new_v4().simple().to_string()[..8]).to_uppercase();

    let resp = client
        .post(format!("{base_url}/coupons"))
        .form(&[
            ("code", code.as_str()),
            ("kind", "percentage"),
            ("value", "10"),
        ])
        .send()
        .await
        .expect("Failed to create coupon");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let body = client
        .get(format!("{base_url}/coupons"))
        .send()
        .await
        .expect("Failed to list coupons")
        .text()
        .await
        .expect("Failed to read response");
    assert!(body.contains(&code));

    // Same code again is a conflict, shown on the form
    let resp = client
        .post(format!("{base_url}/coupons"))
        .form(&[
            ("code", code.as_str()),
            ("kind", "fixed"),
            ("value", "5"),
        ])
        .send()
        .await
        .expect("Failed to post duplicate coupon");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("already exists"));

    // Find the delete form in the row after the code
    let listing = client
        .get(format!("{base_url}/coupons"))
        .send()
        .await
        .expect("Failed to list coupons")
        .text()
        .await
        .expect("Failed to read response");
    let row = &listing[listing.find(&code).expect("Coupon row missing")..];
    let start = row.find("/coupons/").expect("Delete form missing") + "/coupons/".len();
    let id: String = row[start..].chars().take_while(char::is_ascii_digit).collect();

    let resp = client
        .post(format!("{base_url}/coupons/{id}/delete"))
        .send()
        .await
        .expect("Failed to delete coupon");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let listing = client
        .get(format!("{base_url}/coupons"))
        .send()
        .await
        .expect("Failed to list coupons")
        .text()
        .await
        .expect("Failed to read response");
    assert!(!listing.contains(&code));
}

#[tokio::test]
#[ignore = "Requires running admin panel and TEST_ADMIN_* credentials"]
async fn test_invalid_settings_are_rejected() {
    let client = client();
    admin_login(&client).await;

    let resp = client
        .post(format!("{}/settings", admin_base_url()))
        .form(&[
            ("shipping_flat_fee", "-3"),
            ("free_shipping_threshold", "50"),
        ])
        .send()
        .await
        .expect("Failed to post settings");

    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("Flat fee must be zero or more"));
}
