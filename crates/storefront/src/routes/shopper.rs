//! Personal shopper handler.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use naxstore_core::Product;

use crate::error::{AppError, Result};
use crate::services::shopper::ShopperError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShopperForm {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ShopperResponse {
    pub products: Vec<Product>,
}

/// Suggest catalog products for a free-text request.
#[instrument(skip_all, fields(query_len = form.query.len()))]
pub async fn suggest(
    State(state): State<AppState>,
    Json(form): Json<ShopperForm>,
) -> Result<Json<ShopperResponse>> {
    let shopper = state
        .shopper()
        .ok_or(AppError::Shopper(ShopperError::NotConfigured))?;
    let catalog = state.catalog().ensure_loaded().await;
    let products = shopper.suggest(&catalog, &form.query).await?;
    Ok(Json(ShopperResponse { products }))
}
