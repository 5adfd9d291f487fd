//! Verdant CLI - Migrations, seeding, and store management tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply the backend schema
//! verdant migrate backend
//!
//! # Create the session tables
//! verdant migrate sessions
//!
//! # Both
//! verdant migrate all
//!
//! # Load the starter catalog
//! verdant seed products crates/cli/seed/products.yaml
//!
//! # Let an existing user into the admin panel
//! verdant admin grant owner@example.com
//!
//! # Create a coupon
//! verdant coupon create --code SPRING10 --kind percentage --value 10
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Load products from a YAML file
//! - `admin` - Grant or revoke the admin role
//! - `coupon` - Create discount codes

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "verdant")]
#[command(author, version, about = "Verdant Organics CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Seed the catalog
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Manage admin access
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Manage coupons
    Coupon {
        #[command(subcommand)]
        action: CouponAction,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Apply backend schema migrations
    Backend,
    /// Create storefront and admin session tables
    Sessions,
    /// Run all migrations
    All,
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert products from a YAML file
    Products {
        /// Path to the seed file
        #[arg(default_value = "crates/cli/seed/products.yaml")]
        file: String,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Give a user the admin role
    Grant {
        /// The user's email address
        email: String,
    },
    /// Return an admin to the customer role
    Revoke {
        /// The user's email address
        email: String,
    },
}

#[derive(Subcommand)]
enum CouponAction {
    /// Create an active coupon
    Create {
        /// Code customers type at checkout (stored uppercase)
        #[arg(long)]
        code: String,

        /// Discount kind (`percentage` or `fixed`)
        #[arg(long, default_value = "percentage")]
        kind: String,

        /// Percentage (1-100) or fixed amount off
        #[arg(long)]
        value: String,

        /// Minimum order subtotal
        #[arg(long)]
        min_order: Option<String>,

        /// Total number of redemptions allowed
        #[arg(long)]
        max_uses: Option<u32>,

        /// Days until the coupon expires
        #[arg(long)]
        expires_days: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate { target } => match target {
            MigrateTarget::Backend => commands::migrate::backend().await?,
            MigrateTarget::Sessions => commands::migrate::sessions().await?,
            MigrateTarget::All => {
                commands::migrate::backend().await?;
                commands::migrate::sessions().await?;
            }
        },
        Commands::Seed { target } => match target {
            SeedTarget::Products { file } => commands::seed::products(&file).await?,
        },
        Commands::Admin { action } => match action {
            AdminAction::Grant { email } => commands::admin::grant(&email).await?,
            AdminAction::Revoke { email } => commands::admin::revoke(&email).await?,
        },
        Commands::Coupon { action } => match action {
            CouponAction::Create {
                code,
                kind,
                value,
                min_order,
                max_uses,
                expires_days,
            } => {
                commands::coupon::create(commands::coupon::CreateArgs {
                    code,
                    kind,
                    value,
                    min_order,
                    max_uses,
                    expires_days,
                })
                .await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
