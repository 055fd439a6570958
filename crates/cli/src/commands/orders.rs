//! Order maintenance commands.
//!
//! # Usage
//!
//! ```bash
//! bazaar order status ORD-1A2B3C4D processing
//! bazaar order status ORD-1A2B3C4D cancelled
//! ```
//!
//! Status emails are sent when SMTP is configured. Cancelling does not
//! return stock; use `bazaar stock restock` for that.

use bazaar_core::{OrderNumber, OrderStatus};
use bazaar_storefront::config::StorefrontConfig;
use bazaar_storefront::db::{PgStore, create_pool};
use bazaar_storefront::services::StatusChange;
use bazaar_storefront::state::AppState;

use super::CliError;

/// Move an order to `next`.
pub async fn change_status(
    number: &OrderNumber,
    next: OrderStatus,
) -> Result<StatusChange, CliError> {
    let config = StorefrontConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    let state = AppState::from_config(config, PgStore::new(pool))
        .map_err(|e| CliError::Notifier(e.to_string()))?;

    let change = state.orders().change_status(number, next).await?;

    tracing::info!(
        "Order {} moved from {} to {}",
        change.order.number,
        change.previous,
        change.order.status
    );
    match change.notified {
        Some(true) => tracing::info!("Customer notified at {}", change.order.contact_email),
        Some(false) => tracing::warn!("Status saved but the customer email could not be sent"),
        None => {}
    }

    Ok(change)
}
