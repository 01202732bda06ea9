//! Checkout wizard route handlers.
//!
//! Steps are 1 shipping, 2 payment, 3 review. Progress and the shipping
//! address are kept in the session; card details are validated and dropped.

use axum::{Json, extract::State};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use naxstore_core::{CartTotals, Coupon, ShippingAddress};

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::session::{load_or_default, store_optional};
use crate::models::{CartState, CheckoutState, CheckoutStep, session_keys};
use crate::services::checkout::{self as checkout_service, CheckoutSession, PaymentDetails};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub step: u8,
    pub step_name: CheckoutStep,
    pub shipping: ShippingAddress,
    pub totals: CartTotals,
}

async fn view(session: &Session, checkout: &CheckoutState) -> Result<Json<CheckoutView>> {
    let cart: CartState = load_or_default(session, session_keys::CART).await?;
    let coupon = session.get::<Coupon>(session_keys::COUPON).await?;
    Ok(Json(CheckoutView {
        step: checkout.step.number(),
        step_name: checkout.step,
        shipping: checkout.shipping.clone(),
        totals: CartTotals::for_cart(&cart.items, coupon.as_ref()),
    }))
}

async fn load_checkout(session: &Session) -> Result<CheckoutState> {
    Ok(load_or_default(session, session_keys::CHECKOUT).await?)
}

/// Current checkout state.
pub async fn show(session: Session) -> Result<Json<CheckoutView>> {
    let checkout = load_checkout(&session).await?;
    view(&session, &checkout).await
}

/// Save the shipping address and move to payment.
#[instrument(skip_all)]
pub async fn shipping(
    session: Session,
    Json(address): Json<ShippingAddress>,
) -> Result<Json<CheckoutView>> {
    let mut checkout = load_checkout(&session).await?;
    checkout_service::set_shipping(&mut checkout, address)?;
    session.insert(session_keys::CHECKOUT, &checkout).await?;
    view(&session, &checkout).await
}

/// Validate payment details and move to review.
#[instrument(skip_all)]
pub async fn payment(
    session: Session,
    Json(payment): Json<PaymentDetails>,
) -> Result<Json<CheckoutView>> {
    let mut checkout = load_checkout(&session).await?;
    checkout_service::set_payment(&mut checkout, &payment)?;
    session.insert(session_keys::CHECKOUT, &checkout).await?;
    view(&session, &checkout).await
}

/// Go back one step.
pub async fn back(session: Session) -> Result<Json<CheckoutView>> {
    let mut checkout = load_checkout(&session).await?;
    checkout_service::back(&mut checkout);
    session.insert(session_keys::CHECKOUT, &checkout).await?;
    view(&session, &checkout).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacedResponse {
    #[serde(flatten)]
    pub order: checkout_service::PlacedOrder,
    pub points_balance: i64,
}

/// Place the order for the session cart.
#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
    RequireUser(mut current): RequireUser,
) -> Result<Json<OrderPlacedResponse>> {
    let mut cart: CartState = load_or_default(&session, session_keys::CART).await?;
    let mut coupon = session.get::<Coupon>(session_keys::COUPON).await?;
    let mut checkout = load_checkout(&session).await?;

    let placed = checkout_service::place_order(
        state.backend(),
        state.user_data(),
        current.caller(),
        CheckoutSession {
            cart: &mut cart,
            coupon: &mut coupon,
            checkout: &mut checkout,
        },
    )
    .await?;

    session.insert(session_keys::CART, &cart).await?;
    store_optional(&session, session_keys::COUPON, coupon.as_ref()).await?;
    session.insert(session_keys::CHECKOUT, &checkout).await?;

    current.user.points += placed.points_earned;
    session
        .insert(session_keys::CURRENT_USER, &current.user)
        .await?;

    Ok(Json(OrderPlacedResponse {
        points_balance: current.user.points,
        order: placed,
    }))
}
