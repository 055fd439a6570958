//! Stock maintenance commands.
//!
//! # Usage
//!
//! ```bash
//! bazaar stock restock 42 10
//! ```

use bazaar_core::ProductId;
use bazaar_storefront::db::{PgStore, StockLedger};

use super::{CliError, connect};

/// Add `quantity` units to a product, returning the new available count.
pub async fn restock(product_id: ProductId, quantity: u32) -> Result<u32, CliError> {
    let store = PgStore::new(connect().await?);

    let available = store.restock(product_id, quantity).await?;

    tracing::info!(
        "Restocked product {}: +{} units, {} now available",
        product_id,
        quantity,
        available
    );
    Ok(available)
}
