//! Product route handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use naxstore_core::{AnalyticsEventType, Product, ProductId, Review};

use crate::error::{AppError, Result};
use crate::middleware::{OptionalUser, RequireUser};
use crate::services::analytics;
use crate::state::AppState;

use super::caller_of;

/// Product listing.
pub async fn index(State(state): State<AppState>) -> Json<Arc<Vec<Product>>> {
    Json(state.catalog().ensure_loaded().await)
}

/// Product detail. Viewing a product logs a `product_click`.
#[instrument(skip(state, current))]
pub async fn show(
    State(state): State<AppState>,
    OptionalUser(current): OptionalUser,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    let product = state
        .catalog()
        .get_product(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    analytics::track(
        state.backend(),
        caller_of(current.as_ref()),
        AnalyticsEventType::ProductClick,
        serde_json::json!({ "productId": product.id, "productName": product.name }),
    );
    Ok(Json(product))
}

#[derive(Debug, Deserialize)]
pub struct ReviewForm {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review: Review,
    pub message: &'static str,
}

/// Add a review as the signed-in user.
#[instrument(skip(state, current, form), fields(rating = form.rating))]
pub async fn add_review(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<ProductId>,
    Json(form): Json<ReviewForm>,
) -> Result<Json<ReviewResponse>> {
    let review = state
        .catalog()
        .add_review(current.caller(), &current.user, id, form.rating, form.comment.trim())
        .await?;
    Ok(Json(ReviewResponse {
        review,
        message: "Review submitted!",
    }))
}
