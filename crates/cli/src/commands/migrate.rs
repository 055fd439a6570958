//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! bazaar migrate
//! ```
//!
//! Runs `crates/storefront/migrations/` and then creates the
//! `tower_sessions.session` table used by the session layer.

use tower_sessions_sqlx_store::PostgresStore;

use super::{CliError, connect};

/// Run storefront database migrations.
pub async fn run() -> Result<(), CliError> {
    let pool = connect().await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Creating session table...");
    PostgresStore::new(pool).migrate().await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
