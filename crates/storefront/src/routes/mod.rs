//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness check
//! GET  /health/ready                 - Database readiness check
//!
//! # Products
//! GET  /products/{id}                - Product with reviews
//! POST /products/{id}/review         - Submit a review (requires login)
//!
//! # Cart
//! GET  /cart                         - Cart contents and messages
//! GET  /cart/api                     - Cart summary for the header dropdown
//! POST /cart/add/{product_id}        - Add to cart (form, redirects)
//! POST /cart/update                  - Set a quantity (JSON)
//! POST /cart/remove/{product_id}     - Remove a line (redirects)
//!
//! # Checkout
//! GET  /checkout                     - Checkout summary
//! POST /checkout                     - Place the order
//!
//! # Orders
//! GET  /orders                       - Buyer's order history (requires login)
//! GET  /orders/{order_number}        - Order detail (buyer or placing session)
//! ```

pub mod cart;
pub mod checkout;
pub mod orders;
pub mod products;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use crate::db::Backend;
use crate::middleware::{make_request_span, tag_request_id};
use crate::state::AppState;

/// Create all routes for the storefront.
pub fn routes<S: Backend>() -> Router<AppState<S>> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness::<S>))
        // Product routes
        .route("/products/{id}", get(products::show::<S>))
        .route("/products/{id}/review", post(products::review::<S>))
        // Cart routes
        .route("/cart", get(cart::show::<S>))
        .route("/cart/api", get(cart::api::<S>))
        .route("/cart/add/{product_id}", post(cart::add::<S>))
        .route("/cart/update", post(cart::update::<S>))
        .route("/cart/remove/{product_id}", post(cart::remove))
        // Checkout
        .route(
            "/checkout",
            get(checkout::show::<S>).post(checkout::submit::<S>),
        )
        // Orders
        .route("/orders", get(orders::history::<S>))
        .route("/orders/{order_number}", get(orders::show::<S>))
}

/// The complete application: routes, sessions, tracing and Sentry.
pub fn app<S, Store>(state: AppState<S>, sessions: SessionManagerLayer<Store>) -> Router
where
    S: Backend,
    Store: SessionStore + Clone,
{
    routes::<S>()
        .layer(sessions)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
                .layer(axum::middleware::from_fn(tag_request_id)),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness<S: Backend>(State(state): State<AppState<S>>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
