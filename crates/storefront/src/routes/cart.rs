//! Cart route handlers.
//!
//! Form posts answer with a 303 redirect and leave a flash message; the
//! views and the quantity update endpoint speak JSON. Quantities arrive as
//! raw text so a typo gets a message instead of an extractor rejection.

use axum::{
    Form, Json,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use bazaar_core::{Price, ProductId};

use crate::db::Backend;
use crate::error::{AppError, Result};
use crate::models::{FlashLevel, FlashMessage};
use crate::services::{AddMode, CartError, CartItem, SessionCart, flash};
use crate::state::AppState;

/// Shown when a quantity is not a positive whole number.
const INVALID_QUANTITY: &str = "Please choose a valid quantity.";

/// Add to cart form data. A missing quantity means one.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub quantity: Option<String>,
}

/// JSON body of a quantity change. A missing quantity means zero.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub quantity: serde_json::Value,
}

/// Reply to an add made with `X-Requested-With: XMLHttpRequest`.
#[derive(Debug, Serialize)]
pub struct AddToCartResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_count: Option<usize>,
}

/// Reply to a quantity change.
#[derive(Debug, Serialize)]
pub struct UpdateCartResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateCartResponse {
    fn ok(cart: &SessionCart) -> Result<Self> {
        Ok(Self {
            success: true,
            cart_count: Some(cart.cart().len()),
            total_price: Some(cart_total(cart)?),
            error: None,
        })
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            cart_count: None,
            total_price: None,
            error: Some(error.into()),
        }
    }
}

/// One cart line as shown to the shopper.
#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub quantity: u32,
    pub unit_price: Price,
    pub line_total: Price,
    pub available: bool,
}

impl From<CartItem> for CartLineView {
    fn from(item: CartItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.product.map(|p| p.name),
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total,
            available: item.available,
        }
    }
}

/// Cart contents with totals.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub total: Price,
    pub tax: Price,
    pub grand_total: Price,
    pub items_count: usize,
    pub total_quantity: u64,
}

impl CartView {
    /// Resolve the cart against the catalog and price it.
    ///
    /// # Errors
    ///
    /// Returns error if the catalog lookup fails or a total overflows.
    pub async fn build<S: Backend>(state: &AppState<S>, cart: &SessionCart) -> Result<Self> {
        let items = cart.items(state.store()).await?;
        let total = cart_total(cart)?;
        let tax = state.config().tax_rate.tax_on(total);
        let grand_total = total
            .checked_add(tax)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(Self {
            items_count: items.len(),
            total_quantity: cart.cart().total_quantity(),
            items: items.into_iter().map(CartLineView::from).collect(),
            total,
            tax,
            grand_total,
        })
    }
}

/// Cart page payload.
#[derive(Debug, Serialize)]
pub struct CartPage {
    pub cart: CartView,
    pub messages: Vec<FlashMessage>,
}

fn cart_total(cart: &SessionCart) -> Result<Price> {
    cart.cart()
        .total_price()
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn product_url(product_id: ProductId) -> String {
    format!("/products/{product_id}")
}

fn parse_quantity(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

/// Accepts a JSON number or a numeric string; null counts as zero.
fn json_quantity(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Null => Some(0),
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(raw) => parse_quantity(raw),
        _ => None,
    }
}

fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"XMLHttpRequest"))
}

/// Display the cart.
#[instrument(skip(state, session))]
pub async fn show<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
) -> Result<Json<CartPage>> {
    let cart = SessionCart::load(session.clone()).await?;
    let view = CartView::build(&state, &cart).await?;
    let messages = flash::take(&session).await?;
    Ok(Json(CartPage {
        cart: view,
        messages,
    }))
}

/// Cart summary for the header dropdown.
#[instrument(skip(state, session))]
pub async fn api<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
) -> Result<Json<CartView>> {
    let cart = SessionCart::load(session).await?;
    Ok(Json(CartView::build(&state, &cart).await?))
}

/// Add a product to the cart.
///
/// Browsers get a redirect and a flash message; script requests get an
/// [`AddToCartResponse`] instead.
#[instrument(skip(state, session, headers, form), fields(product_id = %product_id))]
pub async fn add<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
    Path(product_id): Path<ProductId>,
    headers: HeaderMap,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let product = state
        .store()
        .product(product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))?;

    let ajax = is_ajax(&headers);
    let quantity = match form.quantity.as_deref() {
        None => Some(1),
        Some(raw) => parse_quantity(raw),
    };
    let Some(quantity) = quantity else {
        return refuse_add(&session, ajax, product_id, INVALID_QUANTITY.to_owned()).await;
    };

    let mut cart = SessionCart::load(session.clone()).await?;
    match cart.add(&product, quantity, AddMode::Increment).await {
        Ok(_) => {
            let message = format!("{} added to cart!", product.name);
            if ajax {
                return Ok(Json(AddToCartResponse {
                    success: true,
                    message,
                    cart_count: Some(cart.cart().len()),
                })
                .into_response());
            }
            flash::push(&session, FlashLevel::Success, message).await?;
            Ok(Redirect::to("/cart").into_response())
        }
        Err(CartError::NotEnoughStock { remaining, .. }) => {
            let message = if remaining == 0 {
                "Not enough stock available!".to_owned()
            } else {
                format!("Sorry, only {remaining} more items can be added to cart.")
            };
            refuse_add(&session, ajax, product_id, message).await
        }
        Err(CartError::ZeroQuantity | CartError::QuantityOverflow) => {
            refuse_add(&session, ajax, product_id, INVALID_QUANTITY.to_owned()).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Answer an add that changed nothing.
async fn refuse_add(
    session: &Session,
    ajax: bool,
    product_id: ProductId,
    message: String,
) -> Result<Response> {
    if ajax {
        return Ok(Json(AddToCartResponse {
            success: false,
            message,
            cart_count: None,
        })
        .into_response());
    }
    flash::push(session, FlashLevel::Error, message).await?;
    Ok(Redirect::to(&product_url(product_id)).into_response())
}

/// Set a line's quantity; zero removes the line.
#[instrument(skip(state, session))]
pub async fn update<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
    Json(request): Json<UpdateCartRequest>,
) -> Result<Json<UpdateCartResponse>> {
    let Some(quantity) = json_quantity(&request.quantity) else {
        return Ok(Json(UpdateCartResponse::failed("Invalid quantity")));
    };
    let mut cart = SessionCart::load(session).await?;

    if quantity == 0 {
        cart.remove(request.product_id).await?;
        return Ok(Json(UpdateCartResponse::ok(&cart)?));
    }

    let Some(product) = state
        .store()
        .product(request.product_id)
        .await?
        .filter(|p| p.is_active)
    else {
        return Ok(Json(UpdateCartResponse::failed("Product is no longer available")));
    };

    match cart.add(&product, quantity, AddMode::Replace).await {
        Ok(_) => Ok(Json(UpdateCartResponse::ok(&cart)?)),
        Err(CartError::NotEnoughStock { remaining, .. }) => Ok(Json(UpdateCartResponse::failed(
            format!("Only {remaining} items available"),
        ))),
        Err(CartError::QuantityOverflow) => Ok(Json(UpdateCartResponse::failed("Invalid quantity"))),
        Err(e) => Err(e.into()),
    }
}

/// Remove a product from the cart.
#[instrument(skip(session))]
pub async fn remove(session: Session, Path(product_id): Path<ProductId>) -> Result<Redirect> {
    let mut cart = SessionCart::load(session.clone()).await?;
    if cart.remove(product_id).await? {
        flash::push(&session, FlashLevel::Success, "Item removed from cart!").await?;
    }
    Ok(Redirect::to("/cart"))
}
