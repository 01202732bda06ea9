//! Seller portal handlers. Non-sellers get 403.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use naxstore_core::{Commission, OrderSummary, Product, User};

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::session_keys;
use crate::services::catalog::{AddedProduct, ProductInput};
use crate::services::seller::{self as seller_service, SellerDashboard};
use crate::services::{Caller, profile};
use crate::state::AppState;

/// Sales figures for the seller's products.
pub async fn dashboard(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<SellerDashboard>> {
    let figures = seller_service::dashboard(state.backend(), current.caller(), &current.user).await?;
    Ok(Json(figures))
}

/// The seller's own listings.
pub async fn products(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<Vec<Product>>> {
    let products = seller_service::products(state.catalog(), &current.user).await?;
    Ok(Json(products))
}

/// Orders containing the seller's products.
pub async fn orders(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<Vec<OrderSummary>>> {
    let orders = seller_service::orders(state.backend(), current.caller(), &current.user).await?;
    Ok(Json(orders))
}

/// Commission ledger.
pub async fn commissions(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<Vec<Commission>>> {
    let rows =
        seller_service::commissions(state.backend(), current.caller(), &current.user).await?;
    Ok(Json(rows))
}

/// List a new product.
#[instrument(skip_all, fields(seller_id = %current.user.id))]
pub async fn add_product(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Json(input): Json<ProductInput>,
) -> Result<Json<AddedProduct>> {
    let added = state
        .catalog()
        .add_product(current.caller(), &current.user, input)
        .await?;
    Ok(Json(added))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettingsForm {
    pub store_name: String,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub user: User,
    pub message: &'static str,
}

/// Rename the seller's store.
#[instrument(skip_all, fields(seller_id = %current.user.id))]
pub async fn update_settings(
    State(state): State<AppState>,
    session: Session,
    RequireUser(mut current): RequireUser,
    Json(form): Json<StoreSettingsForm>,
) -> Result<Json<SettingsResponse>> {
    let caller = Caller::new(current.user.id, &current.tokens.access_token);
    let message = profile::update_store_settings(
        state.backend(),
        caller,
        &mut current.user,
        &form.store_name,
    )
    .await?;
    session
        .insert(session_keys::CURRENT_USER, &current.user)
        .await?;
    Ok(Json(SettingsResponse {
        user: current.user,
        message,
    }))
}
