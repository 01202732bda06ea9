//! Admin panel handlers. Non-admins get 403.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use naxstore_core::{OrderId, OrderStatus, OrderSummary, Product, ProductId, UserId};

use crate::backend::rows::{OrderItemTitleRow, ProfileRefRow};
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::services::admin::{
    self as admin_service, AdminDashboard, AdminProductInput, AdminUser, UserSort, UserUpdate,
};
use crate::state::AppState;

use super::{MessageBody, message};

pub async fn dashboard(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<AdminDashboard>> {
    let figures = admin_service::dashboard(state.backend(), current.caller(), &current.user).await?;
    Ok(Json(figures))
}

/// All users, sorted by `?key=..&direction=..`.
pub async fn users(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Query(sort): Query<UserSort>,
) -> Result<Json<Vec<AdminUser>>> {
    let users = admin_service::users(state.backend(), current.caller(), &current.user, sort).await?;
    Ok(Json(users))
}

#[instrument(skip(state, current, update), fields(admin_id = %current.user.id))]
pub async fn update_user(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<UserId>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<MessageBody>> {
    let msg =
        admin_service::update_user(state.backend(), current.caller(), &current.user, id, &update)
            .await?;
    Ok(message(msg))
}

pub async fn sellers(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<Vec<ProfileRefRow>>> {
    let sellers = admin_service::sellers(state.backend(), current.caller(), &current.user).await?;
    Ok(Json(sellers))
}

#[instrument(skip(state, current), fields(admin_id = %current.user.id))]
pub async fn verify_seller(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<UserId>,
) -> Result<Json<MessageBody>> {
    let msg =
        admin_service::verify_seller(state.backend(), current.caller(), &current.user, id).await?;
    Ok(message(msg))
}

pub async fn products(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<Arc<Vec<Product>>>> {
    let products = admin_service::products(state.catalog(), &current.user).await?;
    Ok(Json(products))
}

async fn save_product(
    state: &AppState,
    current: &crate::middleware::CurrentUser,
    id: Option<ProductId>,
    input: &AdminProductInput,
) -> Result<Json<MessageBody>> {
    let msg = admin_service::save_product(
        state.backend(),
        state.catalog(),
        current.caller(),
        &current.user,
        id,
        input,
    )
    .await?;
    Ok(message(msg))
}

#[instrument(skip_all, fields(admin_id = %current.user.id))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Json(input): Json<AdminProductInput>,
) -> Result<Json<MessageBody>> {
    save_product(&state, &current, None, &input).await
}

#[instrument(skip(state, current, input), fields(admin_id = %current.user.id))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<ProductId>,
    Json(input): Json<AdminProductInput>,
) -> Result<Json<MessageBody>> {
    save_product(&state, &current, Some(id), &input).await
}

pub async fn orders(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<Vec<OrderSummary>>> {
    let orders = admin_service::orders(state.backend(), current.caller(), &current.user).await?;
    Ok(Json(orders))
}

pub async fn order_items(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Vec<OrderItemTitleRow>>> {
    let items =
        admin_service::order_items(state.backend(), current.caller(), &current.user, id).await?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: OrderStatus,
}

#[instrument(skip(state, current, form), fields(admin_id = %current.user.id, status = %form.status))]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<OrderId>,
    Json(form): Json<StatusForm>,
) -> Result<Json<MessageBody>> {
    let msg = admin_service::update_order_status(
        state.backend(),
        current.caller(),
        &current.user,
        id,
        form.status,
    )
    .await?;
    Ok(message(msg))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::routes::test_support::{Client, app};

    #[tokio::test]
    async fn test_admin_routes_require_sign_in() {
        let (router, _) = app(vec![]).await;
        let mut client = Client::new(router);

        for uri in [
            "/api/admin/dashboard",
            "/api/admin/users?key=tier&direction=ascending",
            "/api/admin/products",
            "/api/admin/orders",
            "/api/admin/sellers",
            "/api/seller/dashboard",
            "/api/seller/products",
        ] {
            let (status, _) = client.send("GET", uri, None).await;
            assert_eq!(status, 401, "{uri}");
        }
    }
}
