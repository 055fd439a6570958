//! Email service for order confirmations and status updates.
//!
//! Uses SMTP via lettre for delivery with Askama templates. Confirmation
//! emails carry a plain-text invoice as an attachment.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use bazaar_core::{OrderStatus, Price};

use crate::config::EmailConfig;
use crate::models::Order;

/// One rendered order line.
struct EmailLine {
    name: String,
    quantity: u32,
    unit_price: Price,
    total: Price,
}

/// HTML template for the order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    recipient: &'a str,
    number: &'a str,
    lines: &'a [EmailLine],
    subtotal: Price,
    tax: Price,
    total: Price,
    shipping_address: &'a str,
    order_url: &'a str,
}

/// Plain text template for the order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    recipient: &'a str,
    number: &'a str,
    lines: &'a [EmailLine],
    subtotal: Price,
    tax: Price,
    total: Price,
    shipping_address: &'a str,
    order_url: &'a str,
}

/// Invoice attached to the order confirmation.
#[derive(Template)]
#[template(path = "email/invoice.txt")]
struct InvoiceText<'a> {
    number: &'a str,
    date: String,
    recipient: &'a str,
    email: &'a str,
    shipping_address: &'a str,
    payment_method: &'a str,
    lines: &'a [EmailLine],
    subtotal: Price,
    tax: Price,
    total: Price,
}

/// HTML template for a status update.
#[derive(Template)]
#[template(path = "email/status_update.html")]
struct StatusUpdateHtml<'a> {
    recipient: &'a str,
    number: &'a str,
    previous: &'a str,
    current: &'a str,
    order_url: &'a str,
}

/// Plain text template for a status update.
#[derive(Template)]
#[template(path = "email/status_update.txt")]
struct StatusUpdateText<'a> {
    recipient: &'a str,
    number: &'a str,
    previous: &'a str,
    current: &'a str,
    order_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// An order amount could not be computed.
    #[error("Amount error: {0}")]
    Amount(#[from] bazaar_core::PriceError),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    base_url: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// `base_url` is used to link back to order pages.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig, base_url: &str) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn order_url(&self, order: &Order) -> String {
        format!("{}/orders/{}", self.base_url, order.number)
    }

    /// Send the order confirmation with the invoice attached.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(&self, order: &Order) -> Result<(), EmailError> {
        let lines = email_lines(order)?;
        let order_url = self.order_url(order);
        let recipient = order.recipient_name();

        let html = OrderConfirmationHtml {
            recipient,
            number: order.number.as_str(),
            lines: &lines,
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total_amount,
            shipping_address: &order.shipping_address,
            order_url: &order_url,
        }
        .render()?;
        let text = OrderConfirmationText {
            recipient,
            number: order.number.as_str(),
            lines: &lines,
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total_amount,
            shipping_address: &order.shipping_address,
            order_url: &order_url,
        }
        .render()?;
        let invoice = InvoiceText {
            number: order.number.as_str(),
            date: order.created_at.format("%Y-%m-%d").to_string(),
            recipient,
            email: order.contact_email.as_str(),
            shipping_address: &order.shipping_address,
            payment_method: &order.payment_method,
            lines: &lines,
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total_amount,
        }
        .render()?;

        let body = MultiPart::mixed()
            .multipart(alternative(text, html))
            .singlepart(
                Attachment::new(format!("invoice-{}.txt", order.number))
                    .body(invoice, ContentType::TEXT_PLAIN),
            );

        self.send(
            order.contact_email.as_str(),
            &format!("Order Confirmation - {}", order.number),
            body,
        )
        .await
    }

    /// Tell the customer their order moved to a new status.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_status_update(
        &self,
        order: &Order,
        previous: OrderStatus,
    ) -> Result<(), EmailError> {
        let order_url = self.order_url(order);
        let recipient = order.recipient_name();

        let html = StatusUpdateHtml {
            recipient,
            number: order.number.as_str(),
            previous: previous.label(),
            current: order.status.label(),
            order_url: &order_url,
        }
        .render()?;
        let text = StatusUpdateText {
            recipient,
            number: order.number.as_str(),
            previous: previous.label(),
            current: order.status.label(),
            order_url: &order_url,
        }
        .render()?;

        self.send(
            order.contact_email.as_str(),
            &format!("Order {} - {}", order.number, order.status.label()),
            alternative(text, html),
        )
        .await
    }

    async fn send(&self, to: &str, subject: &str, body: MultiPart) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(body)?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

fn alternative(text: String, html: String) -> MultiPart {
    MultiPart::alternative()
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(text),
        )
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(html),
        )
}

fn email_lines(order: &Order) -> Result<Vec<EmailLine>, EmailError> {
    order
        .items
        .iter()
        .map(|item| {
            Ok(EmailLine {
                name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.price,
                total: item.line_total()?,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{Email, OrderId, OrderItemId, OrderNumber, ProductId};
    use chrono::Utc;

    use super::*;
    use crate::models::OrderItem;

    fn order() -> Order {
        Order {
            id: OrderId::new(1),
            number: OrderNumber::parse("ORD-0000ABCD").unwrap(),
            buyer_id: None,
            guest_name: Some("Ada <Lovelace>".to_owned()),
            guest_email: Some(Email::parse("ada@example.com").unwrap()),
            contact_email: Email::parse("ada@example.com").unwrap(),
            status: OrderStatus::Pending,
            subtotal: Price::from_cents(2500),
            tax: Price::from_cents(200),
            total_amount: Price::from_cents(2700),
            shipping_address: "1 Loop Rd".to_owned(),
            payment_method: "cash_on_delivery".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                product_id: ProductId::new(1),
                product_name: "Mug".to_owned(),
                quantity: 2,
                price: Price::from_cents(1000),
            }],
        }
    }

    #[test]
    fn test_confirmation_text_lists_lines_and_totals() {
        let order = order();
        let lines = email_lines(&order).unwrap();
        let text = OrderConfirmationText {
            recipient: order.recipient_name(),
            number: order.number.as_str(),
            lines: &lines,
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total_amount,
            shipping_address: &order.shipping_address,
            order_url: "https://shop.test/orders/ORD-0000ABCD",
        }
        .render()
        .unwrap();

        assert!(text.contains("2 x Mug @ 10.00 = 20.00"));
        assert!(text.contains("Total:    27.00"));
    }

    #[test]
    fn test_html_escapes_names() {
        let order = order();
        let html = StatusUpdateHtml {
            recipient: order.recipient_name(),
            number: order.number.as_str(),
            previous: OrderStatus::Pending.label(),
            current: OrderStatus::Processing.label(),
            order_url: "https://shop.test/orders/ORD-0000ABCD",
        }
        .render()
        .unwrap();

        assert!(html.contains("Ada &#60;Lovelace&#62;") || html.contains("Ada &lt;Lovelace&gt;"));
        assert!(html.contains("Processing"));
    }
}
