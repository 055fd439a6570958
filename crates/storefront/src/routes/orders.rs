//! Order route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use bazaar_core::OrderNumber;

use super::checkout::placed_in_session;
use crate::db::Backend;
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{FlashMessage, Order, OrderSummary};
use crate::services::flash;
use crate::state::AppState;

/// Orders per history page.
pub const HISTORY_PAGE_SIZE: u32 = 10;

/// History query string. A missing or unreadable page means the first.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HistoryQuery {
    pub page: Option<String>,
}

/// Order history payload.
#[derive(Debug, Serialize)]
pub struct OrderHistoryPage {
    pub orders: Vec<OrderSummary>,
    pub page: u32,
    pub has_previous: bool,
    pub has_next: bool,
    pub messages: Vec<FlashMessage>,
}

/// Order page payload.
#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub order: Order,
    pub messages: Vec<FlashMessage>,
}

/// Show one order.
///
/// Visible to the buyer it belongs to and to the session that placed it.
/// Anyone else gets a 404 so order numbers cannot be probed.
#[instrument(skip(state, session, user))]
pub async fn show<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(number): Path<String>,
) -> Result<Json<OrderPage>> {
    let not_found = || AppError::NotFound(format!("order {number}"));
    let number = OrderNumber::parse(&number).map_err(|_| not_found())?;
    let order = state
        .store()
        .order_by_number(&number)
        .await?
        .ok_or_else(not_found)?;

    let owns = user
        .as_ref()
        .is_some_and(|user| order.buyer_id == Some(user.id));
    if !owns && !placed_in_session(&session, &number).await {
        return Err(not_found());
    }

    Ok(Json(OrderPage {
        order,
        messages: flash::take(&session).await?,
    }))
}

/// The logged-in buyer's orders, newest first.
#[instrument(skip(state, session, user, query), fields(user_id = %user.id))]
pub async fn history<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<OrderHistoryPage>> {
    let page = query
        .page
        .as_deref()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|page| *page > 0)
        .unwrap_or(1);
    let offset = (page - 1).saturating_mul(HISTORY_PAGE_SIZE);

    // One extra row tells whether another page follows.
    let mut orders = state
        .store()
        .orders_for_buyer(user.id, HISTORY_PAGE_SIZE + 1, offset)
        .await?;
    let page_len = usize::try_from(HISTORY_PAGE_SIZE).unwrap_or(usize::MAX);
    let has_next = orders.len() > page_len;
    orders.truncate(page_len);

    Ok(Json(OrderHistoryPage {
        orders,
        page,
        has_previous: page > 1,
        has_next,
        messages: flash::take(&session).await?,
    }))
}
