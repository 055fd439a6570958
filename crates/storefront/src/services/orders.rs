//! Administrator-driven order status changes.

use std::time::Duration;

use thiserror::Error;
use tracing::instrument;

use bazaar_core::{OrderNumber, OrderStatus, TransitionError};

use super::notify::{OrderNotifier, within};
use crate::db::{OrderStore, RepositoryError};
use crate::models::Order;

/// Errors from [`OrderService::change_status`].
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(OrderNumber),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Another writer changed the status between our read and our update.
    #[error("order {number} changed concurrently; it is now {current}")]
    Conflict {
        number: OrderNumber,
        current: OrderStatus,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of a status change.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: Order,
    pub previous: OrderStatus,
    /// `None` when the transition does not notify the customer.
    pub notified: Option<bool>,
}

/// Applies order status transitions.
pub struct OrderService<'a, S, N> {
    store: &'a S,
    notifier: &'a N,
    notify_timeout: Duration,
}

impl<'a, S: OrderStore, N: OrderNotifier> OrderService<'a, S, N> {
    #[must_use]
    pub const fn new(store: &'a S, notifier: &'a N, notify_timeout: Duration) -> Self {
        Self {
            store,
            notifier,
            notify_timeout,
        }
    }

    /// Move an order to `next`.
    ///
    /// Leaving `pending` or `processing` sends the customer a status update
    /// after the change is stored; a failed send does not undo it.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`] for unknown orders,
    /// [`OrderError::Transition`] for moves the lifecycle forbids, and
    /// [`OrderError::Conflict`] if the status changed underneath us.
    #[instrument(skip(self), fields(number = %number, next = %next))]
    pub async fn change_status(
        &self,
        number: &OrderNumber,
        next: OrderStatus,
    ) -> Result<StatusChange, OrderError> {
        let mut order = self
            .store
            .order_by_number(number)
            .await?
            .ok_or_else(|| OrderError::NotFound(number.clone()))?;
        let previous = order.status;
        previous.transition_to(next)?;

        if !self.store.update_status(order.id, previous, next).await? {
            let current = self
                .store
                .order_by_number(number)
                .await?
                .map_or(previous, |o| o.status);
            return Err(OrderError::Conflict {
                number: number.clone(),
                current,
            });
        }
        order.status = next;
        tracing::info!(from = %previous, to = %next, "Order status changed");

        let notified = if previous.notifies_on_exit() {
            Some(within(self.notify_timeout, self.notifier.status_changed(&order, previous)).await)
        } else {
            None
        };

        Ok(StatusChange {
            order,
            previous,
            notified,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bazaar_core::{Email, Price, StoreId};
    use uuid::Uuid;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Buyer, DraftLine, OrderDraft};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl OrderNotifier for Counter {
        async fn order_placed(&self, _order: &Order) -> bool {
            true
        }

        async fn status_changed(&self, _order: &Order, _previous: OrderStatus) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    async fn placed_order(store: &MemoryStore) -> Order {
        let product = store
            .add_product(StoreId::new(1), "Mug", Price::from_cents(1000), 5)
            .await;
        let draft = OrderDraft {
            number: OrderNumber::generate(),
            buyer: Buyer::Guest {
                name: "Ada".to_owned(),
                email: Email::parse("ada@example.com").unwrap(),
            },
            shipping_address: "1 Loop Rd".to_owned(),
            payment_method: "cod".to_owned(),
            lines: vec![DraftLine {
                product_id: product,
                product_name: "Mug".to_owned(),
                quantity: 1,
                unit_price: Price::from_cents(1000),
            }],
            subtotal: Price::from_cents(1000),
            tax: Price::from_cents(80),
            total: Price::from_cents(1080),
            cart_token: Uuid::new_v4(),
        };
        store.place_order(&draft).await.unwrap()
    }

    #[tokio::test]
    async fn test_walks_the_lifecycle() {
        let store = MemoryStore::new();
        let notifier = Counter::default();
        let order = placed_order(&store).await;
        let service = OrderService::new(&store, &notifier, Duration::from_secs(1));

        let change = service.change_status(&order.number, OrderStatus::Processing).await.unwrap();
        assert_eq!(change.previous, OrderStatus::Pending);
        assert_eq!(change.notified, Some(true));

        service.change_status(&order.number, OrderStatus::Shipped).await.unwrap();
        let change = service.change_status(&order.number, OrderStatus::Delivered).await.unwrap();
        // Leaving shipped is silent.
        assert_eq!(change.notified, None);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 2);

        let stored = store.order_by_number(&order.number).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_rejects_backward_and_terminal_moves() {
        let store = MemoryStore::new();
        let notifier = Counter::default();
        let order = placed_order(&store).await;
        let service = OrderService::new(&store, &notifier, Duration::from_secs(1));

        assert!(matches!(
            service.change_status(&order.number, OrderStatus::Pending).await,
            Err(OrderError::Transition(_))
        ));
        assert!(matches!(
            service.change_status(&order.number, OrderStatus::Delivered).await,
            Err(OrderError::Transition(_))
        ));

        service.change_status(&order.number, OrderStatus::Cancelled).await.unwrap();
        assert!(matches!(
            service.change_status(&order.number, OrderStatus::Processing).await,
            Err(OrderError::Transition(_))
        ));
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let store = MemoryStore::new();
        let notifier = Counter::default();
        let service = OrderService::new(&store, &notifier, Duration::from_secs(1));
        let number = OrderNumber::parse("ORD-DEADBEEF").unwrap();

        assert!(matches!(
            service.change_status(&number, OrderStatus::Processing).await,
            Err(OrderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_stock_decremented() {
        let store = MemoryStore::new();
        let notifier = Counter::default();
        let order = placed_order(&store).await;
        let product = order.items[0].product_id;
        let service = OrderService::new(&store, &notifier, Duration::from_secs(1));

        service.change_status(&order.number, OrderStatus::Cancelled).await.unwrap();

        assert_eq!(store.available_quantity(product).await, 4);
    }
}
