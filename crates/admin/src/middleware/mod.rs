//! HTTP middleware stack for admin.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. Request ID (add unique ID to each request)
//! 3. `TraceLayer` (request tracing)
//! 4. Security headers (no inline scripts, no framing, no caching)
//! 5. Session layer (tower-sessions with `PostgreSQL` store, `SameSite=Strict`)
//!
//! Authentication is an extractor ([`RequireAdminAuth`]) rather than a
//! layer, so the login page and health checks stay reachable.

pub mod auth;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{OptionalAdminAuth, RequireAdminAuth, clear_current_admin, set_current_admin};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
