//! Checkout route handlers.

use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use bazaar_core::OrderNumber;

use super::cart::CartView;
use crate::db::Backend;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::models::{FlashLevel, FlashMessage, session_keys};
use crate::services::{CheckoutRequest, SessionCart, flash};
use crate::state::AppState;

/// How many order numbers a session remembers for guest order access.
const RECENT_ORDERS_KEPT: usize = 20;

/// Checkout form data.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutForm {
    pub shipping_address: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub payment_method: Option<String>,
}

impl From<CheckoutForm> for CheckoutRequest {
    fn from(form: CheckoutForm) -> Self {
        Self {
            shipping_address: form.shipping_address,
            name: form.name,
            email: form.email,
            payment_method: form.payment_method,
        }
    }
}

/// Checkout page payload.
#[derive(Debug, Serialize)]
pub struct CheckoutPage {
    pub cart: CartView,
    /// Whether name and email must be filled in.
    pub guest: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub messages: Vec<FlashMessage>,
}

/// Show the checkout summary.
#[instrument(skip(state, session, user))]
pub async fn show<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Response> {
    let cart = SessionCart::load(session.clone()).await?;
    if cart.cart().is_empty() {
        flash::push(&session, FlashLevel::Error, "Your cart is empty!").await?;
        return Ok(Redirect::to("/cart").into_response());
    }

    let page = CheckoutPage {
        cart: CartView::build(&state, &cart).await?,
        guest: user.is_none(),
        error: None,
        messages: flash::take(&session).await?,
    };
    Ok(Json(page).into_response())
}

/// Place the order.
#[instrument(skip(state, session, user, form))]
pub async fn submit<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<CheckoutForm>,
) -> Result<Response> {
    let mut cart = SessionCart::load(session.clone()).await?;
    let lines = cart.cart().len().to_string();
    add_breadcrumb("checkout", "Checkout submitted", &[("lines", lines.as_str())]);

    match state.checkout().checkout(&mut cart, user.as_ref(), form.into()).await {
        Ok(outcome) => {
            Ok(order_placed(&session, &outcome.order.number, outcome.message())
                .await
                .into_response())
        }
        Err(abort) if abort.is_form_error() => {
            let page = CheckoutPage {
                cart: CartView::build(&state, &cart).await?,
                guest: user.is_none(),
                error: Some(abort.user_message()),
                messages: Vec::new(),
            };
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(page)).into_response())
        }
        Err(abort) => {
            flash::push(&session, FlashLevel::Error, abort.user_message()).await?;
            Ok(Redirect::to("/cart").into_response())
        }
    }
}

/// Send the shopper to a committed order. Session trouble from here on is
/// only logged: the order exists whether or not the session remembers it.
async fn order_placed(session: &Session, number: &OrderNumber, message: &str) -> Redirect {
    if let Err(e) = remember_order(session, number).await {
        tracing::error!(order_number = %number, error = %e, "Failed to remember order in session");
    }
    if let Err(e) = flash::push(session, FlashLevel::Success, message).await {
        tracing::warn!(order_number = %number, error = %e, "Failed to store order message");
    }
    Redirect::to(&format!("/orders/{number}"))
}

/// Let this session view the order later, whether or not anyone is logged in.
async fn remember_order(session: &Session, number: &OrderNumber) -> Result<()> {
    let mut recent: Vec<OrderNumber> = session
        .get(session_keys::RECENT_ORDERS)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    recent.push(number.clone());
    if recent.len() > RECENT_ORDERS_KEPT {
        recent.drain(..recent.len() - RECENT_ORDERS_KEPT);
    }
    session.insert(session_keys::RECENT_ORDERS, recent).await?;
    Ok(())
}

/// Whether this session placed `number`.
pub async fn placed_in_session(session: &Session, number: &OrderNumber) -> bool {
    session
        .get::<Vec<OrderNumber>>(session_keys::RECENT_ORDERS)
        .await
        .ok()
        .flatten()
        .is_some_and(|recent| recent.contains(number))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::{StatusCode, header};
    use tower_sessions::MemoryStore;
    use tower_sessions::session::{Id, Record};
    use tower_sessions::session_store::{self, SessionStore};

    use super::*;

    /// Session backend that has gone away.
    #[derive(Debug, Clone)]
    struct Unreachable;

    #[async_trait::async_trait]
    impl SessionStore for Unreachable {
        async fn save(&self, _record: &Record) -> session_store::Result<()> {
            Err(session_store::Error::Backend("connection refused".to_owned()))
        }

        async fn load(&self, _id: &Id) -> session_store::Result<Option<Record>> {
            Err(session_store::Error::Backend("connection refused".to_owned()))
        }

        async fn delete(&self, _id: &Id) -> session_store::Result<()> {
            Err(session_store::Error::Backend("connection refused".to_owned()))
        }
    }

    #[tokio::test]
    async fn test_order_placed_redirects_when_session_store_fails() {
        let session = Session::new(Some(Id::default()), Arc::new(Unreachable), None);
        let number = OrderNumber::generate();

        let response = order_placed(&session, &number, "Order placed successfully!")
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers().get(header::LOCATION).unwrap();
        assert_eq!(location.to_str().unwrap(), format!("/orders/{number}"));
    }

    #[tokio::test]
    async fn test_order_placed_remembers_order() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let number = OrderNumber::generate();

        order_placed(&session, &number, "Order placed successfully!").await;

        assert!(placed_in_session(&session, &number).await);
        let messages = flash::take(&session).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_orders_are_capped() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let first = OrderNumber::generate();
        remember_order(&session, &first).await.unwrap();
        for _ in 0..RECENT_ORDERS_KEPT {
            remember_order(&session, &OrderNumber::generate()).await.unwrap();
        }

        assert!(!placed_in_session(&session, &first).await);
    }
}
