//! Cart and coupon route handlers.
//!
//! The cart lives in the session. For signed-in visitors every change is
//! written to the backend first and only then applied to the session copy,
//! so a failed write leaves the session cart as it was.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use naxstore_core::{AnalyticsEventType, Cart, CartTotals, Coupon, ProductId};

use crate::error::{AppError, Result};
use crate::middleware::OptionalUser;
use crate::models::session::{load_or_default, store_optional};
use crate::models::{CartState, session_keys};
use crate::services::{analytics, cart as cart_service, rewards};
use crate::state::AppState;

use super::caller_of;

/// Cart lines with their derived totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Cart,
    pub totals: CartTotals,
    pub coupon: Option<Coupon>,
    /// Whether the last removal can still be undone.
    pub can_undo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CartView {
    fn new(cart: &CartState, coupon: Option<Coupon>, message: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            items: cart.items.clone(),
            totals: CartTotals::for_cart(&cart.items, coupon.as_ref()),
            coupon,
            can_undo: cart
                .last_removed
                .as_ref()
                .is_some_and(|removed| removed.is_restorable(now)),
            message,
        }
    }
}

async fn load_cart(session: &Session) -> Result<CartState> {
    Ok(load_or_default(session, session_keys::CART).await?)
}

async fn respond(
    session: &Session,
    cart: &CartState,
    message: Option<String>,
) -> Result<Json<CartView>> {
    session.insert(session_keys::CART, cart).await?;
    let coupon = session.get::<Coupon>(session_keys::COUPON).await?;
    Ok(Json(CartView::new(cart, coupon, message)))
}

/// Current cart.
pub async fn show(session: Session) -> Result<Json<CartView>> {
    let cart = load_cart(&session).await?;
    let coupon = session.get::<Coupon>(session_keys::COUPON).await?;
    Ok(Json(CartView::new(&cart, coupon, None)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemForm {
    pub product_id: ProductId,
}

/// Add one unit of a product.
#[instrument(skip(state, session, current))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(current): OptionalUser,
    Json(form): Json<AddItemForm>,
) -> Result<Json<CartView>> {
    let product = state
        .catalog()
        .get_product(form.product_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("product {}", form.product_id)))?;

    let caller = caller_of(current.as_ref());
    let mut cart = load_cart(&session).await?;
    let message = cart_service::add(state.backend(), caller, &mut cart, &product.summary()).await?;

    analytics::track(
        state.backend(),
        caller,
        AnalyticsEventType::AddToCart,
        serde_json::json!({ "productId": product.id, "price": product.price }),
    );
    respond(&session, &cart, Some(message)).await
}

#[derive(Debug, Deserialize)]
pub struct QuantityForm {
    pub quantity: i64,
}

/// Set a line's quantity. Zero or less removes the line.
#[instrument(skip(state, session, current))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(current): OptionalUser,
    Path(product_id): Path<ProductId>,
    Json(form): Json<QuantityForm>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    cart_service::update_quantity(
        state.backend(),
        caller_of(current.as_ref()),
        &mut cart,
        product_id,
        form.quantity,
        Utc::now(),
    )
    .await?;
    respond(&session, &cart, None).await
}

/// Remove a line. The removal can be undone for a few seconds.
#[instrument(skip(state, session, current))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(current): OptionalUser,
    Path(product_id): Path<ProductId>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    let message = cart_service::remove(
        state.backend(),
        caller_of(current.as_ref()),
        &mut cart,
        product_id,
        Utc::now(),
    )
    .await?;
    respond(&session, &cart, message).await
}

/// Undo the last removal.
#[instrument(skip(state, session, current))]
pub async fn restore(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(current): OptionalUser,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    let result = cart_service::restore_last_removed(
        state.backend(),
        caller_of(current.as_ref()),
        &mut cart,
        Utc::now(),
    )
    .await;
    match result {
        Ok(message) => respond(&session, &cart, Some(message)).await,
        Err(e) => {
            // An expired undo record is dropped even though the restore fails
            session.insert(session_keys::CART, &cart).await?;
            Err(e)
        }
    }
}

/// Empty the cart.
#[instrument(skip(state, session, current))]
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(current): OptionalUser,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&session).await?;
    cart_service::clear(state.backend(), caller_of(current.as_ref()), &mut cart).await?;
    respond(&session, &cart, None).await
}

#[derive(Debug, Deserialize)]
pub struct CouponForm {
    pub code: String,
}

/// Validate and apply a coupon code.
#[instrument(skip(state, session, current, form))]
pub async fn apply_coupon(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(current): OptionalUser,
    Json(form): Json<CouponForm>,
) -> Result<Json<CartView>> {
    let coupon =
        rewards::apply_coupon(state.backend(), caller_of(current.as_ref()), &form.code).await?;
    session.insert(session_keys::COUPON, &coupon).await?;

    let cart = load_cart(&session).await?;
    let message = rewards::applied_message(&coupon);
    Ok(Json(CartView::new(&cart, Some(coupon), Some(message))))
}

/// Remove the active coupon.
pub async fn remove_coupon(session: Session) -> Result<Json<CartView>> {
    store_optional::<Coupon>(&session, session_keys::COUPON, None).await?;
    let cart = load_cart(&session).await?;
    Ok(Json(CartView::new(
        &cart,
        None,
        Some(rewards::REMOVED_MESSAGE.to_string()),
    )))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use crate::routes::test_support::{Client, app};
    use crate::services::fixtures::product;

    #[tokio::test]
    async fn test_guest_cart_flow() {
        let (router, _) = app(vec![product(1, "Nebula Hoodie", 60), product(2, "Comet Cap", 25)]).await;
        let mut client = Client::new(router);

        let (status, body) = client.send("GET", "/api/cart", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["items"], json!([]));
        assert_eq!(body["totals"]["totalItems"], 0);

        let (status, body) = client
            .send("POST", "/api/cart/items", Some(json!({ "productId": 1 })))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Nebula Hoodie added to cart");

        client
            .send("POST", "/api/cart/items", Some(json!({ "productId": 1 })))
            .await;
        let (_, body) = client
            .send("POST", "/api/cart/items", Some(json!({ "productId": 2 })))
            .await;
        assert_eq!(body["items"][0]["quantity"], 2);
        assert_eq!(body["items"][1]["name"], "Comet Cap");
        assert_eq!(body["totals"]["totalItems"], 3);

        let (status, body) = client
            .send("PATCH", "/api/cart/items/2", Some(json!({ "quantity": 4 })))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["items"][1]["quantity"], 4);
        assert_eq!(body["totals"]["totalItems"], 6);
    }

    #[tokio::test]
    async fn test_guest_remove_and_undo() {
        let (router, _) = app(vec![product(1, "Nebula Hoodie", 60)]).await;
        let mut client = Client::new(router);

        client
            .send("POST", "/api/cart/items", Some(json!({ "productId": 1 })))
            .await;
        let (status, body) = client.send("DELETE", "/api/cart/items/1", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Nebula Hoodie removed");
        assert_eq!(body["items"], json!([]));
        assert_eq!(body["canUndo"], true);

        let (status, body) = client.send("POST", "/api/cart/restore", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Item restored");
        assert_eq!(body["items"][0]["quantity"], 1);
        assert_eq!(body["canUndo"], false);

        let (status, body) = client.send("POST", "/api/cart/restore", None).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Nothing to restore.");
    }

    #[tokio::test]
    async fn test_zero_quantity_removes_line() {
        let (router, _) = app(vec![product(1, "Nebula Hoodie", 60)]).await;
        let mut client = Client::new(router);

        client
            .send("POST", "/api/cart/items", Some(json!({ "productId": 1 })))
            .await;
        let (_, body) = client
            .send("PATCH", "/api/cart/items/1", Some(json!({ "quantity": 0 })))
            .await;
        assert_eq!(body["items"], json!([]));
        assert_eq!(body["canUndo"], true);
    }

    #[tokio::test]
    async fn test_unknown_product_and_clear() {
        let (router, _) = app(vec![product(1, "Nebula Hoodie", 60)]).await;
        let mut client = Client::new(router);

        let (status, _) = client
            .send("POST", "/api/cart/items", Some(json!({ "productId": 42 })))
            .await;
        assert_eq!(status, 404);

        client
            .send("POST", "/api/cart/items", Some(json!({ "productId": 1 })))
            .await;
        let (status, body) = client.send("DELETE", "/api/cart", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["items"], json!([]));
        assert_eq!(body["canUndo"], false);
    }

    #[tokio::test]
    async fn test_blank_coupon_and_removal() {
        let (router, _) = app(vec![]).await;
        let mut client = Client::new(router);

        let (status, body) = client
            .send("POST", "/api/coupon", Some(json!({ "code": "   " })))
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Invalid or expired coupon code.");

        let (status, body) = client.send("DELETE", "/api/coupon", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Coupon removed.");
        assert!(body["coupon"].is_null());
    }
}
