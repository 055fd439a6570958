//! CLI command implementations.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! `order status` also reads the full storefront configuration so status
//! emails go out exactly as they would from the web process.

pub mod migrate;
pub mod orders;
pub mod reviews;
pub mod stock;
pub mod users;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use bazaar_core::EmailError;
use bazaar_storefront::config::ConfigError;
use bazaar_storefront::db::{RepositoryError, create_pool};
use bazaar_storefront::services::OrderError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Email relay error: {0}")]
    Notifier(String),

    /// A write was requested without `--yes`.
    #[error("{0} writes to the database; re-run with --yes or use --dry-run")]
    Unconfirmed(&'static str),
}

/// Connect to the storefront database named by the environment.
async fn connect() -> Result<PgPool, CliError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| CliError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;

    tracing::info!("Connecting to storefront database...");
    Ok(create_pool(&SecretString::from(database_url)).await?)
}
