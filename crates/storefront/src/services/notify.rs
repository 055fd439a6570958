//! Customer notifications.
//!
//! Notifications are best effort: a failed or slow send is logged and
//! reported as `false`, never as an error. Callers bound each send with
//! [`within`] so a stuck SMTP server cannot hold a request open.

use std::future::Future;
use std::time::Duration;

use bazaar_core::OrderStatus;

use super::email::EmailService;
use crate::models::Order;

/// Sends order-related messages to customers.
pub trait OrderNotifier: Send + Sync {
    /// Confirmation plus invoice for a freshly placed order. Returns whether
    /// the message was handed to the mail server.
    fn order_placed(&self, order: &Order) -> impl Future<Output = bool> + Send;

    /// The order moved from `previous` to `order.status`.
    fn status_changed(
        &self,
        order: &Order,
        previous: OrderStatus,
    ) -> impl Future<Output = bool> + Send;
}

/// The notifier configured for this deployment.
#[derive(Clone)]
pub enum Notifier {
    /// Deliver by SMTP.
    Email(EmailService),
    /// No mail server configured; every send reports not-sent.
    Disabled,
}

impl OrderNotifier for Notifier {
    async fn order_placed(&self, order: &Order) -> bool {
        match self {
            Self::Email(email) => match email.send_order_confirmation(order).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(order_number = %order.number, error = %e, "Order confirmation email failed");
                    false
                }
            },
            Self::Disabled => {
                tracing::debug!(order_number = %order.number, "Email disabled; confirmation not sent");
                false
            }
        }
    }

    async fn status_changed(&self, order: &Order, previous: OrderStatus) -> bool {
        match self {
            Self::Email(email) => match email.send_status_update(order, previous).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(order_number = %order.number, error = %e, "Status update email failed");
                    false
                }
            },
            Self::Disabled => {
                tracing::debug!(order_number = %order.number, "Email disabled; status update not sent");
                false
            }
        }
    }
}

/// Run a notification, treating a timeout as a failed send.
pub async fn within<F>(timeout: Duration, send: F) -> bool
where
    F: Future<Output = bool>,
{
    tokio::time::timeout(timeout, send).await.unwrap_or_else(|_| {
        tracing::warn!(timeout_secs = timeout.as_secs(), "Notification timed out");
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_within_passes_result_through() {
        assert!(within(Duration::from_secs(1), async { true }).await);
        assert!(!within(Duration::from_secs(1), async { false }).await);
    }

    #[tokio::test]
    async fn test_within_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        };
        assert!(!within(Duration::from_millis(10), slow).await);
    }
}
