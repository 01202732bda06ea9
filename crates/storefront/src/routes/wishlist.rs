//! Wishlist route handlers (requires auth).

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use naxstore_core::{Product, ProductId};

use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::services::wishlist;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WishlistView {
    /// Wishlisted products still in the catalog.
    pub products: Vec<Product>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The user's wishlist resolved against the catalog.
pub async fn show(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Json<WishlistView> {
    let data = state.user_data().get(current.caller()).await;
    Json(WishlistView {
        products: state.catalog().by_ids(&data.wishlist.product_ids).await,
        message: None,
    })
}

/// Add or remove a product.
#[instrument(skip(state, current), fields(user_id = %current.user.id))]
pub async fn toggle(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(product_id): Path<ProductId>,
) -> Result<Json<WishlistView>> {
    let product = state
        .catalog()
        .get_product(product_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))?;

    let data = state.user_data().get(current.caller()).await;
    let mut list = data.wishlist.clone();
    let message = wishlist::toggle(state.backend(), current.caller(), &mut list, &product).await?;

    let products = state.catalog().by_ids(&list.product_ids).await;
    state
        .user_data()
        .update(current.user.id, move |data| data.wishlist = list)
        .await;
    Ok(Json(WishlistView {
        products,
        message: Some(message),
    }))
}
