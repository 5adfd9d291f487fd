//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page
//! GET  /health                 - Health check
//!
//! # Products
//! GET  /products               - Product listing (?q=&category=&sort=&page=)
//! GET  /products/{slug}        - Product detail
//! GET  /products/{slug}/quick-view - Quick view fragment (HTMX)
//!
//! # Cart (HTMX fragments)
//! GET  /cart                   - Cart page
//! POST /cart/add               - Add to cart (count badge, triggers cart-updated)
//! POST /cart/update            - Update quantity (returns cart_items fragment)
//! POST /cart/remove            - Remove item (returns cart_items fragment)
//! GET  /cart/count             - Cart count badge (fragment)
//!
//! # Checkout (requires auth)
//! GET  /checkout               - Checkout form
//! POST /checkout               - Place order
//! POST /checkout/coupon        - Apply or clear a coupon
//!
//! # Orders & wishlist (requires auth)
//! GET  /orders                 - Order history
//! GET  /orders/{id}            - Order tracking
//! GET  /wishlist               - Wishlist
//! POST /wishlist/toggle        - Add/remove (heart fragment)
//! POST /wishlist/{id}/move-to-cart
//!
//! # Auth
//! GET  /auth/login             - Login page
//! POST /auth/login             - Login action
//! GET  /auth/register          - Register page
//! POST /auth/register          - Register action
//! POST /auth/logout            - Logout action
//! GET  /auth/oauth/{provider}  - Redirect to the OAuth provider (PKCE)
//! GET  /auth/callback          - OAuth code exchange
//!
//! # Account (requires auth)
//! GET  /account                - Profile and recent orders
//! POST /account                - Save profile
//!
//! # Assistant
//! GET  /assistant              - Chat page
//! POST /assistant/messages     - JSON reply
//! POST /assistant/stream       - SSE reply
//! POST /assistant/recipes      - Recipe ideas from the cart (JSON)
//! DELETE /assistant/history    - Forget the conversation
//!
//! # Events
//! GET  /events/stock           - SSE stream of stock changes
//! ```

pub mod account;
pub mod assistant;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod events;
pub mod home;
pub mod layout;
pub mod orders;
pub mod products;
pub mod views;
pub mod wishlist;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter, chat_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/oauth/{provider}", get(auth::oauth_start))
        .route("/callback", get(auth::oauth_callback))
        .layer(auth_rate_limiter())
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{slug}", get(products::show))
        .route("/{slug}/quick-view", get(products::quick_view))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    let writes = Router::new()
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .layer(api_rate_limiter());

    Router::new()
        .route("/", get(cart::show))
        .route("/count", get(cart::count))
        .merge(writes)
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show).post(checkout::place_order))
        .route("/coupon", post(checkout::coupon))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::index))
        .route("/toggle", post(wishlist::toggle))
        .route("/{id}/move-to-cart", post(wishlist::move_to_cart))
        .layer(api_rate_limiter())
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new().route("/", get(account::index).post(account::update))
}

/// Create the assistant routes router.
pub fn assistant_routes() -> Router<AppState> {
    let calls = Router::new()
        .route("/messages", post(assistant::message))
        .route("/stream", post(assistant::stream))
        .route("/recipes", post(assistant::recipes))
        .layer(chat_rate_limiter());

    Router::new()
        .route("/", get(assistant::page))
        .route("/history", delete(assistant::clear))
        .merge(calls)
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/orders", order_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/account", account_routes())
        .nest("/auth", auth_routes())
        .nest("/assistant", assistant_routes())
        .route("/events/stock", get(events::stock))
}
