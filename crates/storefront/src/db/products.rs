//! Product repository and the SQL half of the stock ledger.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use bazaar_core::{ProductId, StoreId};

use super::{RepositoryError, StockError, price_from_db, quantity_from_db, quantity_to_db};
use crate::models::{InsufficientStock, Product};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    store_id: StoreId,
    name: String,
    description: String,
    price: Decimal,
    available_quantity: i32,
    is_active: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            store_id: row.store_id,
            name: row.name,
            description: row.description,
            price: price_from_db("price", row.price)?,
            available_quantity: quantity_from_db("available_quantity", row.available_quantity)?,
            is_active: row.is_active,
        })
    }
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, store_id, name, description, price, available_quantity, is_active
            FROM storefront.products
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Get several products at once.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();

        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, store_id, name, description, price, available_quantity, is_active
            FROM storefront.products
            WHERE id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(raw)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Add units back to a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for unknown products and
    /// `RepositoryError::OutOfRange` if the new count would overflow.
    pub async fn restock(&self, id: ProductId, quantity: u32) -> Result<u32, RepositoryError> {
        let quantity = quantity_to_db(quantity)?;

        let available: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE storefront.products
            SET available_quantity = available_quantity + $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING available_quantity
            ",
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE)
            {
                return RepositoryError::OutOfRange(format!("restocking product {id}"));
            }
            RepositoryError::Database(e)
        })?;

        let available = available.ok_or(RepositoryError::NotFound)?;
        quantity_from_db("available_quantity", available)
    }
}

/// `SQLSTATE` for integer overflow.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// Atomically take `quantity` units of an active product.
///
/// The decrement and the sufficiency check are one `UPDATE`, so the row lock
/// it takes serializes concurrent reservations of the same product. Callers
/// inside a transaction keep that lock until commit or rollback.
///
/// Returns the remaining available quantity.
///
/// # Errors
///
/// Returns `StockError::Insufficient` (with the quantity that was available)
/// when the product is unknown, inactive, or short.
pub async fn reserve_and_decrement(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: u32,
) -> Result<u32, StockError> {
    let requested = quantity_to_db(quantity)?;

    let remaining: Option<i32> = sqlx::query_scalar(
        r"
        UPDATE storefront.products
        SET available_quantity = available_quantity - $2,
            updated_at = NOW()
        WHERE id = $1
          AND is_active
          AND available_quantity >= $2
        RETURNING available_quantity
        ",
    )
    .bind(product_id)
    .bind(requested)
    .fetch_optional(&mut *conn)
    .await
    .map_err(RepositoryError::from)?;

    if let Some(remaining) = remaining {
        return Ok(quantity_from_db("available_quantity", remaining)?);
    }

    let current: Option<(i32, bool)> = sqlx::query_as(
        r"
        SELECT available_quantity, is_active
        FROM storefront.products
        WHERE id = $1
        ",
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(RepositoryError::from)?;

    let available = match current {
        Some((available, true)) => quantity_from_db("available_quantity", available)?,
        _ => 0,
    };

    Err(InsufficientStock {
        product_id,
        requested: quantity,
        available,
    }
    .into())
}
