//! Admin session database connection.
//!
//! The admin panel's own `PostgreSQL` database holds only the
//! `tower_sessions.session` table. Everything it manages lives in the hosted
//! backend.
//!
//! # Migrations
//!
//! The sessions table is created via:
//! ```bash
//! cargo run -p verdant-cli -- migrate sessions
//! ```

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a `PostgreSQL` connection pool.
///
/// The admin panel has few concurrent users, so the pool stays small.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
