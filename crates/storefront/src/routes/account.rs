//! Account route handlers (requires auth).
//!
//! Profile changes are written to the backend, then to the session copy of
//! the user. Address changes are mirrored into the cached user data.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use naxstore_core::{AddressId, Order, ShippingAddress, User};

use crate::error::{AppError, Result};
use crate::middleware::{CurrentUser, RequireUser};
use crate::models::session_keys;
use crate::services::{Caller, profile, rewards};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub user: User,
    pub orders: Vec<Order>,
    pub addresses: Vec<ShippingAddress>,
}

/// The signed-in user with their orders and saved addresses.
#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Json<AccountView> {
    let data = state.user_data().get(current.caller()).await;
    Json(AccountView {
        orders: data.orders.clone(),
        addresses: data.addresses.clone(),
        user: current.user,
    })
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
    pub message: String,
}

async fn save_user(
    session: &Session,
    current: CurrentUser,
    message: String,
) -> Result<Json<UserResponse>> {
    session
        .insert(session_keys::CURRENT_USER, &current.user)
        .await?;
    Ok(Json(UserResponse {
        user: current.user,
        message,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub name: String,
}

/// Rename the user.
#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    RequireUser(mut current): RequireUser,
    Json(form): Json<ProfileForm>,
) -> Result<Json<UserResponse>> {
    let caller = Caller::new(current.user.id, &current.tokens.access_token);
    let message =
        profile::update_profile(state.backend(), caller, &mut current.user, &form.name).await?;
    save_user(&session, current, message.to_string()).await
}

#[derive(Debug, Serialize)]
pub struct AddressesResponse {
    pub addresses: Vec<ShippingAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

async fn mirror_addresses(
    state: &AppState,
    current: &CurrentUser,
    addresses: Vec<ShippingAddress>,
    message: Option<&'static str>,
) -> Json<AddressesResponse> {
    let cached = addresses.clone();
    state
        .user_data()
        .update(current.user.id, move |data| data.addresses = cached)
        .await;
    Json(AddressesResponse { addresses, message })
}

/// Save a new address.
#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn add_address(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Json(address): Json<ShippingAddress>,
) -> Result<Json<AddressesResponse>> {
    let addresses = profile::add_address(state.backend(), current.caller(), &address).await?;
    Ok(mirror_addresses(&state, &current, addresses, Some("Address added!")).await)
}

/// Delete a saved address.
#[instrument(skip(state, current), fields(user_id = %current.user.id))]
pub async fn remove_address(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<AddressId>,
) -> Result<Json<AddressesResponse>> {
    let addresses = profile::remove_address(state.backend(), current.caller(), id).await?;
    Ok(mirror_addresses(&state, &current, addresses, Some("Address removed.")).await)
}

/// Make one address the default.
#[instrument(skip(state, current), fields(user_id = %current.user.id))]
pub async fn set_default_address(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<AddressId>,
) -> Result<Json<AddressesResponse>> {
    let addresses = profile::set_default_address(state.backend(), current.caller(), id).await?;
    Ok(mirror_addresses(&state, &current, addresses, None).await)
}

#[derive(Debug, Deserialize)]
pub struct PointsForm {
    pub points: i64,
}

/// Credit reward points to the user.
#[instrument(skip_all, fields(user_id = %current.user.id, points = form.points))]
pub async fn add_points(
    State(state): State<AppState>,
    session: Session,
    RequireUser(mut current): RequireUser,
    Json(form): Json<PointsForm>,
) -> Result<Json<UserResponse>> {
    if form.points <= 0 {
        return Err(AppError::BadRequest(
            "Points must be a positive number.".to_string(),
        ));
    }
    let balance = rewards::add_points(state.backend(), current.caller(), form.points).await?;
    current.user.points = balance;
    save_user(&session, current, rewards::points_message(form.points)).await
}

/// Upgrade the account to a seller account.
#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn become_seller(
    State(state): State<AppState>,
    session: Session,
    RequireUser(mut current): RequireUser,
) -> Result<Json<UserResponse>> {
    let caller = Caller::new(current.user.id, &current.tokens.access_token);
    let message = profile::become_seller(state.backend(), caller, &mut current.user).await?;
    save_user(&session, current, message.to_string()).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use crate::routes::test_support::{Client, app};

    #[tokio::test]
    async fn test_account_routes_require_sign_in() {
        let (router, _) = app(vec![]).await;
        let mut client = Client::new(router);

        for (method, uri, body) in [
            ("GET", "/api/account", None),
            ("PATCH", "/api/account/profile", Some(json!({ "name": "Ana" }))),
            ("POST", "/api/account/points", Some(json!({ "points": 10 }))),
            ("POST", "/api/account/become-seller", None),
            ("DELETE", "/api/account/addresses/3", None),
        ] {
            let (status, body) = client.send(method, uri, body).await;
            assert_eq!(status, 401, "{method} {uri}");
            assert_eq!(body["error"], "Please sign in to continue.");
        }
    }
}
