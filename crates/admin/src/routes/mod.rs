//! HTTP route handlers for admin.
//!
//! # Route Structure
//!
//! ```text
//! # Auth (backend password grant, admins only)
//! GET  /login                     - Login page
//! POST /login                     - Sign in
//! POST /logout                    - Sign out
//!
//! # Dashboard
//! GET  /                          - Order counts, revenue, low stock
//!
//! # Products
//! GET  /products                  - Product listing (?q=)
//! GET  /products/new              - New product form
//! POST /products                  - Create product
//! GET  /products/{id}/edit        - Edit product form
//! POST /products/{id}             - Update product
//! POST /products/{id}/delete      - Delete product
//! POST /products/{id}/image       - Upload product image (multipart)
//!
//! # Orders
//! GET  /orders                    - Order listing (?status=&page=)
//! GET  /orders/{id}               - Order detail
//! POST /orders/{id}/status        - Advance order status
//!
//! # Coupons
//! GET  /coupons                   - Coupon listing
//! POST /coupons                   - Create coupon
//! POST /coupons/{id}/toggle       - Activate or deactivate
//! POST /coupons/{id}/delete       - Delete coupon
//!
//! # Settings
//! GET  /settings                  - Shipping settings
//! POST /settings                  - Update shipping settings
//! ```

use askama::Template;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    response::Html,
    routing::{get, post},
};

use crate::state::AppState;

pub mod auth;
pub mod coupons;
pub mod dashboard;
pub mod orders;
pub mod products;
pub mod settings;

/// Largest accepted product image upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Build the admin router.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Auth
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", post(auth::logout))
        // Dashboard
        .route("/", get(dashboard::dashboard))
        // Products
        .route("/products", get(products::index).post(products::create))
        .route("/products/new", get(products::new_product))
        .route("/products/{id}", post(products::update))
        .route("/products/{id}/edit", get(products::edit))
        .route("/products/{id}/delete", post(products::delete))
        .route(
            "/products/{id}/image",
            post(products::upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)),
        )
        // Orders
        .route("/orders", get(orders::index))
        .route("/orders/{id}", get(orders::show))
        .route("/orders/{id}/status", post(orders::update_status))
        // Coupons
        .route("/coupons", get(coupons::index).post(coupons::create))
        .route("/coupons/{id}/toggle", post(coupons::toggle))
        .route("/coupons/{id}/delete", post(coupons::delete))
        // Settings
        .route("/settings", get(settings::index).post(settings::update))
}

/// Render a template, logging failures instead of exposing them.
pub(crate) fn render(template: &impl Template) -> Html<String> {
    Html(template.render().unwrap_or_else(|e| {
        tracing::error!("Template render error: {}", e);
        "Internal Server Error".to_string()
    }))
}

/// Trimmed form value, `None` when blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  jar ")), Some("jar".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
