//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! # Apply the backend schema (tables, policies, order functions)
//! verdant migrate backend
//!
//! # Create the session tables for the storefront and admin panel
//! verdant migrate sessions
//!
//! # Both
//! verdant migrate all
//! ```
//!
//! # Environment Variables
//!
//! - `BACKEND_DATABASE_URL` - Direct `PostgreSQL` connection to the hosted backend
//! - `STOREFRONT_DATABASE_URL` - Storefront session database (falls back to `DATABASE_URL`)
//! - `ADMIN_DATABASE_URL` - Admin session database (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Backend migrations live in `crates/backend/migrations/`.

use sqlx::PgPool;
use thiserror::Error;
use tower_sessions_sqlx_store::PostgresStore;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

fn database_url(key: &'static str) -> Result<String, MigrationError> {
    std::env::var(key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| MigrationError::MissingEnvVar(key))
}

/// Apply the backend schema migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn backend() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("BACKEND_DATABASE_URL")
        .map_err(|_| MigrationError::MissingEnvVar("BACKEND_DATABASE_URL"))?;

    tracing::info!("Connecting to backend database...");
    let pool = PgPool::connect(&database_url).await?;

    tracing::info!("Running backend migrations...");
    sqlx::migrate!("../backend/migrations").run(&pool).await?;

    tracing::info!("Backend migrations complete!");
    Ok(())
}

/// Create the `tower_sessions` schema in both session databases.
///
/// When both variables point at the same database the second run is a no-op.
///
/// # Errors
///
/// Returns an error if either database is unreachable.
pub async fn sessions() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    for (name, key) in [
        ("storefront", "STOREFRONT_DATABASE_URL"),
        ("admin", "ADMIN_DATABASE_URL"),
    ] {
        let database_url = database_url(key)?;

        tracing::info!("Connecting to {name} session database...");
        let pool = PgPool::connect(&database_url).await?;

        PostgresStore::new(pool).migrate().await?;
        tracing::info!("{name} session table ready");
    }

    Ok(())
}
