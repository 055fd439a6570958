//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! bazaar user create -e vendor@example.com -n "Vendor Name" -r vendor
//! ```

use bazaar_core::{Email, Role, UserId};
use bazaar_storefront::db::UserRepository;

use super::{CliError, connect};

/// Register a user with the given role.
pub async fn create(email: &str, name: &str, role: Role) -> Result<UserId, CliError> {
    let email = Email::parse(email)?;
    let pool = connect().await?;

    tracing::info!("Creating user: {} ({})", email, role);
    let (user, profile) = UserRepository::new(&pool)
        .register(&email, name.trim(), Some(role))
        .await?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        profile.role
    );
    Ok(user.id)
}
