//! Product route handlers.

use axum::{
    Form, Json,
    extract::{Path, State},
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use bazaar_core::ProductId;

use crate::db::Backend;
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{FlashLevel, FlashMessage, Product, Review};
use crate::services::{ReviewError, flash};
use crate::state::AppState;

/// Review form data. The rating arrives as text so a bad value becomes a
/// message instead of a rejected request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReviewForm {
    pub rating: String,
    pub comment: String,
}

/// Product page payload.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub product: Product,
    pub reviews: Vec<Review>,
    pub verified_count: usize,
    pub unverified_count: usize,
    /// Whether the logged-in user may still leave a review.
    pub can_review: bool,
    pub messages: Vec<FlashMessage>,
}

/// Show a product with its reviews.
#[instrument(skip(state, session, user))]
pub async fn show<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(product_id): Path<ProductId>,
) -> Result<Json<ProductPage>> {
    let product = state
        .store()
        .product(product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))?;
    let reviews = state.store().reviews_for_product(product_id).await?;
    let verified_count = reviews.iter().filter(|r| r.is_verified).count();
    let can_review = user
        .as_ref()
        .is_some_and(|user| !reviews.iter().any(|r| r.user_id == user.id));

    Ok(Json(ProductPage {
        product,
        unverified_count: reviews.len() - verified_count,
        verified_count,
        reviews,
        can_review,
        messages: flash::take(&session).await?,
    }))
}

/// Submit a review.
#[instrument(skip(state, session, user, form))]
pub async fn review<S: Backend>(
    State(state): State<AppState<S>>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    Form(form): Form<ReviewForm>,
) -> Result<Redirect> {
    let back = Redirect::to(&format!("/products/{product_id}"));
    let Ok(rating) = form.rating.trim().parse::<i64>() else {
        flash::push(&session, FlashLevel::Error, "Rating must be between 1 and 5.").await?;
        return Ok(back);
    };

    let (level, message) = match state.reviews().submit(&user, product_id, rating, &form.comment).await {
        Ok(review) if review.is_verified => (
            FlashLevel::Success,
            "Verified review added successfully! Thank you for your feedback as a verified purchaser.",
        ),
        Ok(_) => (
            FlashLevel::Success,
            "Review added successfully! Your review will be marked as unverified since you haven't purchased this product.",
        ),
        Err(ReviewError::AlreadyReviewed) => {
            (FlashLevel::Error, "You have already reviewed this product!")
        }
        Err(ReviewError::ProductNotFound) => {
            return Err(AppError::NotFound(format!("product {product_id}")));
        }
        Err(ReviewError::InvalidRating(_)) => (FlashLevel::Error, "Rating must be between 1 and 5."),
        Err(ReviewError::EmptyComment) => (FlashLevel::Error, "Please write a comment."),
        Err(ReviewError::CommentTooLong) => (FlashLevel::Error, "Your comment is too long."),
        Err(ReviewError::Repository(e)) => return Err(e.into()),
    };

    flash::push(&session, level, message).await?;
    Ok(back)
}
