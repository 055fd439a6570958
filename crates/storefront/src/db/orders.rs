//! Order repository.
//!
//! Placing an order is the only multi-statement write in the storefront: stock
//! reservations, the order row and its items share one transaction, so a
//! failure anywhere rolls all of them back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use bazaar_core::{Email, OrderId, OrderItemId, OrderNumber, OrderStatus, ProductId, UserId};

use super::{
    PlaceOrderError, RepositoryError, StockError, price_from_db, products, quantity_from_db,
    quantity_to_db,
};
use crate::models::{Buyer, Order, OrderDraft, OrderItem, OrderSummary};

/// Unique constraint guarding against a cart being checked out twice.
const CART_TOKEN_CONSTRAINT: &str = "orders_cart_token_key";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: OrderNumber,
    buyer_id: Option<UserId>,
    guest_name: Option<String>,
    guest_email: Option<String>,
    contact_email: String,
    status: OrderStatus,
    subtotal: Decimal,
    tax: Decimal,
    total_amount: Decimal,
    shipping_address: String,
    payment_method: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    product_id: ProductId,
    product_name: String,
    quantity: i32,
    price: Decimal,
}

#[derive(sqlx::FromRow)]
struct OrderSummaryRow {
    order_number: OrderNumber,
    status: OrderStatus,
    total_amount: Decimal,
    item_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderSummaryRow> for OrderSummary {
    type Error = RepositoryError;

    fn try_from(row: OrderSummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            total_amount: price_from_db("total_amount", row.total_amount)?,
            item_count: u64::try_from(row.item_count).map_err(|_| {
                RepositoryError::DataCorruption(format!(
                    "negative item count on order {}",
                    row.order_number
                ))
            })?,
            number: row.order_number,
            status: row.status,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: quantity_from_db("order_items.quantity", row.quantity)?,
            price: price_from_db("order_items.price", row.price)?,
        })
    }
}

fn parse_email(column: &str, raw: &str) -> Result<Email, RepositoryError> {
    Email::parse(raw)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid {column} in database: {e}")))
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        Ok(Order {
            id: self.id,
            number: self.order_number,
            buyer_id: self.buyer_id,
            guest_name: self.guest_name,
            guest_email: self
                .guest_email
                .as_deref()
                .map(|raw| parse_email("guest_email", raw))
                .transpose()?,
            contact_email: parse_email("contact email", &self.contact_email)?,
            status: self.status,
            subtotal: price_from_db("subtotal", self.subtotal)?,
            tax: price_from_db("tax", self.tax)?,
            total_amount: price_from_db("total_amount", self.total_amount)?,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
        })
    }
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Reserve stock for every line, then insert the order and its items.
    ///
    /// Lines are reserved in draft order. Since drafts are sorted by product
    /// id, concurrent checkouts lock product rows in the same order.
    ///
    /// # Errors
    ///
    /// Returns `PlaceOrderError::InsufficientStock` for the first line that
    /// cannot be reserved, `PlaceOrderError::DuplicateCart` if an order with
    /// the same cart token exists, and `PlaceOrderError::Repository` for any
    /// other database failure. The transaction is rolled back in every case.
    pub async fn place(&self, draft: &OrderDraft) -> Result<Order, PlaceOrderError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        for line in &draft.lines {
            products::reserve_and_decrement(&mut *tx, line.product_id, line.quantity)
                .await
                .map_err(|e| match e {
                    StockError::Insufficient(short) => PlaceOrderError::InsufficientStock(short),
                    StockError::Repository(e) => PlaceOrderError::Repository(e),
                })?;
        }

        let (guest_name, guest_email) = match &draft.buyer {
            Buyer::Guest { name, email } => (Some(name.as_str()), Some(email)),
            Buyer::Customer { .. } => (None, None),
        };

        let (order_id, created_at, updated_at): (OrderId, DateTime<Utc>, DateTime<Utc>) =
            sqlx::query_as(
                r"
                INSERT INTO storefront.orders
                    (order_number, buyer_id, guest_name, guest_email, status,
                     subtotal, tax, total_amount, shipping_address, payment_method, cart_token)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING id, created_at, updated_at
                ",
            )
            .bind(&draft.number)
            .bind(draft.buyer.user_id())
            .bind(guest_name)
            .bind(guest_email)
            .bind(OrderStatus::Pending)
            .bind(draft.subtotal.amount())
            .bind(draft.tax.amount())
            .bind(draft.total.amount())
            .bind(&draft.shipping_address)
            .bind(&draft.payment_method)
            .bind(draft.cart_token)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                    && db_err.constraint() == Some(CART_TOKEN_CONSTRAINT)
                {
                    return PlaceOrderError::DuplicateCart;
                }
                PlaceOrderError::Repository(RepositoryError::Database(e))
            })?;

        let mut items = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            let item_id: OrderItemId = sqlx::query_scalar(
                r"
                INSERT INTO storefront.order_items (order_id, product_id, quantity, price)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                ",
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(quantity_to_db(line.quantity)?)
            .bind(line.unit_price.amount())
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

            items.push(OrderItem {
                id: item_id,
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                price: line.unit_price,
            });
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        Ok(Order {
            id: order_id,
            number: draft.number.clone(),
            buyer_id: draft.buyer.user_id(),
            guest_name: guest_name.map(str::to_owned),
            guest_email: guest_email.cloned(),
            contact_email: draft.buyer.email().clone(),
            status: OrderStatus::Pending,
            subtotal: draft.subtotal,
            tax: draft.tax,
            total_amount: draft.total,
            shipping_address: draft.shipping_address.clone(),
            payment_method: draft.payment_method.clone(),
            created_at,
            updated_at,
            items,
        })
    }

    /// Get an order and its items by public order number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored values are invalid.
    pub async fn get_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT o.id, o.order_number, o.buyer_id, o.guest_name, o.guest_email,
                   COALESCE(u.email, o.guest_email) AS contact_email,
                   o.status, o.subtotal, o.tax, o.total_amount,
                   o.shipping_address, o.payment_method, o.created_at, o.updated_at
            FROM storefront.orders o
            LEFT JOIN storefront.users u ON u.id = o.buyer_id
            WHERE o.order_number = $1
            ",
        )
        .bind(number)
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT oi.id, oi.product_id, p.name AS product_name, oi.quantity, oi.price
            FROM storefront.order_items oi
            JOIN storefront.products p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            ORDER BY oi.id
            ",
        )
        .bind(row.id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(OrderItem::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        row.into_order(items).map(Some)
    }

    /// One page of a buyer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored values are invalid.
    pub async fn for_buyer(
        &self,
        buyer_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        sqlx::query_as::<_, OrderSummaryRow>(
            r"
            SELECT o.order_number, o.status, o.total_amount, o.created_at,
                   COALESCE(SUM(oi.quantity), 0)::BIGINT AS item_count
            FROM storefront.orders o
            LEFT JOIN storefront.order_items oi ON oi.order_id = o.id
            WHERE o.buyer_id = $1
            GROUP BY o.id
            ORDER BY o.created_at DESC, o.id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(buyer_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(OrderSummary::try_from)
        .collect()
    }

    /// Move an order from `from` to `to` if nobody changed it meanwhile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
