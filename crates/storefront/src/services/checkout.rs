//! Checkout wizard and order placement.
//!
//! Progress lives in the session as [`CheckoutState`]: shipping, then
//! payment, then review. Payment details are validated when submitted and
//! then discarded.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::instrument;

use naxstore_core::{
    AnalyticsEventType, CartTotals, Coupon, NotificationType, OrderId, ShippingAddress,
};

use crate::backend::BackendClient;
use crate::error::{BackendResultExt, Result};
use crate::models::{CartState, CheckoutState, CheckoutStep};
use crate::services::user_data::UserDataCache;
use crate::services::{Caller, analytics, cart, notifications, rewards};

pub const ORDER_FAILED: &str = "There was an error placing your order. Please try again.";

/// Checkout precondition or validation failure. Displays as the message
/// shown to the shopper.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("Your cart is empty.")]
    EmptyCart,

    #[error("Please complete the previous checkout step first.")]
    NotReady,

    #[error("Please fill in all required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("{0}")]
    InvalidPayment(&'static str),
}

/// Card details submitted on the payment step.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub cardholder_name: String,
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
}

impl fmt::Debug for PaymentDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentDetails")
            .field("cardholder_name", &self.cardholder_name)
            .field("card_number", &"[REDACTED]")
            .field("expiry_date", &"[REDACTED]")
            .field("cvv", &"[REDACTED]")
            .finish()
    }
}

impl PaymentDetails {
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidPayment` naming the first bad field.
    pub fn validate(&self) -> std::result::Result<(), CheckoutError> {
        if self.cardholder_name.trim().is_empty() {
            return Err(CheckoutError::InvalidPayment(
                "Cardholder name is required.",
            ));
        }

        let digits: String = self
            .card_number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if !(13..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CheckoutError::InvalidPayment("Card number is invalid."));
        }

        if !is_valid_expiry(self.expiry_date.trim()) {
            return Err(CheckoutError::InvalidPayment(
                "Expiry date must be in MM/YY format.",
            ));
        }

        let cvv = self.cvv.trim();
        if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(CheckoutError::InvalidPayment("CVV is invalid."));
        }
        Ok(())
    }
}

fn is_valid_expiry(expiry: &str) -> bool {
    let Some((month, year)) = expiry.split_once('/') else {
        return false;
    };
    let two_digits = |s: &str| s.len() == 2 && s.chars().all(|c| c.is_ascii_digit());
    two_digits(month)
        && two_digits(year)
        && month.parse::<u8>().is_ok_and(|m| (1..=12).contains(&m))
}

/// Save the shipping address and move to the payment step.
///
/// # Errors
///
/// Returns `CheckoutError::MissingFields` if a required field is blank.
pub fn set_shipping(
    checkout: &mut CheckoutState,
    address: ShippingAddress,
) -> std::result::Result<(), CheckoutError> {
    let missing = address.missing_fields();
    if !missing.is_empty() {
        return Err(CheckoutError::MissingFields(missing));
    }
    checkout.shipping = address;
    checkout.step = CheckoutStep::Payment;
    Ok(())
}

/// Validate payment details and move to the review step.
///
/// # Errors
///
/// Returns `CheckoutError::NotReady` before shipping is saved and
/// `CheckoutError::InvalidPayment` for bad details.
pub fn set_payment(
    checkout: &mut CheckoutState,
    payment: &PaymentDetails,
) -> std::result::Result<(), CheckoutError> {
    if checkout.step == CheckoutStep::Shipping {
        return Err(CheckoutError::NotReady);
    }
    payment.validate()?;
    checkout.step = CheckoutStep::Review;
    Ok(())
}

pub fn back(checkout: &mut CheckoutState) {
    checkout.step = checkout.step.previous();
}

#[derive(Serialize)]
struct CreateOrderArgs<'a> {
    shipping_address_payload: &'a ShippingAddress,
    coupon_discount: Decimal,
    coupon_code: Option<&'a str>,
}

/// Outcome of [`place_order`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub total: Decimal,
    pub points_earned: i64,
    pub message: &'static str,
}

/// Session state [`place_order`] reads and resets.
pub struct CheckoutSession<'s> {
    pub cart: &'s mut CartState,
    pub coupon: &'s mut Option<Coupon>,
    pub checkout: &'s mut CheckoutState,
}

/// Place the order for the cart in `session`.
///
/// Once the order exists, follow-up steps (analytics, notification, points,
/// order refetch) are best-effort and only logged on failure. The cart,
/// coupon, and checkout are then reset.
///
/// # Errors
///
/// Returns `CheckoutError` if checkout is not at the review step or the
/// cart is empty, and `AppError::Backend` if order creation fails, in which
/// case nothing is changed.
#[instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn place_order(
    backend: &BackendClient,
    user_data: &UserDataCache,
    caller: Caller<'_>,
    session: CheckoutSession<'_>,
) -> Result<PlacedOrder> {
    if session.checkout.step != CheckoutStep::Review {
        return Err(CheckoutError::NotReady.into());
    }
    if session.cart.items.is_empty() {
        return Err(CheckoutError::EmptyCart.into());
    }

    let totals = CartTotals::for_cart(&session.cart.items, session.coupon.as_ref());
    let order_id: OrderId = backend
        .rpc(
            "create_order_from_cart",
            &CreateOrderArgs {
                shipping_address_payload: &session.checkout.shipping,
                coupon_discount: totals.discount,
                coupon_code: session.coupon.as_ref().map(|c| c.code.as_str()),
            },
            caller.bearer(),
        )
        .await
        .or_message(ORDER_FAILED)?;
    tracing::info!(order_id = %order_id, total = %totals.total, "Order placed");

    analytics::track(
        backend,
        Some(caller),
        AnalyticsEventType::Purchase,
        json!({ "orderId": order_id, "total": totals.total }),
    );

    let message = format!(
        "Order #{order_id} placed successfully! We'll keep you updated on its status."
    );
    if let Err(e) =
        notifications::add(backend, Some(caller), &message, NotificationType::Order, None).await
    {
        tracing::warn!(error = %e, "Failed to add order notification");
    }

    let points_earned = points_for(totals.total);
    if points_earned > 0
        && let Err(e) = rewards::add_points(backend, caller, points_earned).await
    {
        tracing::warn!(error = %e, "Failed to award order points");
    }

    if let Err(e) = user_data.refresh_orders(caller).await {
        tracing::warn!(error = %e, "Failed to refetch orders");
    }

    cart::clear_after_checkout(session.cart, session.coupon);
    *session.checkout = CheckoutState::default();

    Ok(PlacedOrder {
        order_id,
        total: totals.total,
        points_earned,
        message: "Order placed successfully!",
    })
}

/// One point per whole currency unit spent.
#[must_use]
pub fn points_for(total: Decimal) -> i64 {
    total.floor().to_i64().unwrap_or(0).max(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::fixtures::{FakeBackend, offline_backend, product, user};
    use naxstore_core::{DiscountType, UserRole};
    use std::time::Duration;

    fn payment() -> PaymentDetails {
        PaymentDetails {
            cardholder_name: "Ana Lima".to_string(),
            card_number: "4242 4242 4242 4242".to_string(),
            expiry_date: "09/29".to_string(),
            cvv: "123".to_string(),
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ana Lima".to_string(),
            address_line1: "1 Orbit Way".to_string(),
            city: "Phoenix".to_string(),
            state: "AZ".to_string(),
            zip_code: "85001".to_string(),
            ..ShippingAddress::default()
        }
    }

    #[test]
    fn test_payment_validation() {
        assert!(payment().validate().is_ok());

        let mut p = payment();
        p.card_number = "4242".to_string();
        assert_eq!(
            p.validate(),
            Err(CheckoutError::InvalidPayment("Card number is invalid."))
        );

        let mut p = payment();
        p.expiry_date = "13/29".to_string();
        assert!(p.validate().is_err());

        let mut p = payment();
        p.cvv = "12a".to_string();
        assert!(p.validate().is_err());

        let mut p = payment();
        p.cardholder_name = " ".to_string();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_payment_debug_redacts_card() {
        let debug = format!("{:?}", payment());
        assert!(!debug.contains("4242"));
        assert!(debug.contains("Ana Lima"));
    }

    #[test]
    fn test_wizard_steps() {
        let mut checkout = CheckoutState::default();
        assert_eq!(
            set_payment(&mut checkout, &payment()),
            Err(CheckoutError::NotReady)
        );

        let err = set_shipping(&mut checkout, ShippingAddress::default()).unwrap_err();
        assert!(matches!(err, CheckoutError::MissingFields(ref f) if f.contains(&"city")));

        set_shipping(&mut checkout, address()).unwrap();
        assert_eq!(checkout.step, CheckoutStep::Payment);
        set_payment(&mut checkout, &payment()).unwrap();
        assert_eq!(checkout.step, CheckoutStep::Review);
        back(&mut checkout);
        assert_eq!(checkout.step, CheckoutStep::Payment);
    }

    #[test]
    fn test_points_for_floors_total() {
        assert_eq!(points_for(Decimal::new(12_999, 2)), 129);
        assert_eq!(points_for(Decimal::ZERO), 0);
    }

    #[tokio::test]
    async fn test_place_order_requires_review_step() {
        let backend = offline_backend();
        let cache = UserDataCache::new(backend.clone(), Duration::from_secs(180));
        let user = user(UserRole::User);
        let mut cart = CartState::default();
        let mut coupon = None;
        let mut checkout = CheckoutState::default();

        let err = place_order(
            &backend,
            &cache,
            Caller::new(user.id, "t"),
            CheckoutSession {
                cart: &mut cart,
                coupon: &mut coupon,
                checkout: &mut checkout,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Checkout(CheckoutError::NotReady)));
    }

    #[tokio::test]
    async fn test_failed_order_leaves_state_untouched() {
        let backend = offline_backend();
        let cache = UserDataCache::new(backend.clone(), Duration::from_secs(180));
        let user = user(UserRole::User);
        let mut cart = CartState::default();
        cart.items.add(product(1, "Nebula Hoodie", 60).summary(), 1);
        let mut coupon = None;
        let mut checkout = CheckoutState::default();
        set_shipping(&mut checkout, address()).unwrap();
        set_payment(&mut checkout, &payment()).unwrap();

        let err = place_order(
            &backend,
            &cache,
            Caller::new(user.id, "t"),
            CheckoutSession {
                cart: &mut cart,
                coupon: &mut coupon,
                checkout: &mut checkout,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.client_message(), ORDER_FAILED);
        assert_eq!(cart.items.total_items(), 1);
        assert_eq!(checkout.step, CheckoutStep::Review);
    }

    #[tokio::test]
    async fn test_place_order_notifies_awards_points_and_resets() {
        let (fake, backend) = FakeBackend::start().await;
        fake.on_rpc("create_order_from_cart", json!(42));
        let user = user(UserRole::User);
        fake.seed(
            "reward_points",
            vec![json!({ "user_id": user.id, "points_balance": 10 })],
        );
        let cache = UserDataCache::new(backend.clone(), Duration::from_secs(180));

        let mut cart = CartState::default();
        cart.items.add(product(1, "Nebula Hoodie", 60).summary(), 1);
        let mut coupon = Some(Coupon {
            code: "SAVE10".to_string(),
            discount_type: DiscountType::Percentage,
            value: Decimal::from(10),
        });
        let mut checkout = CheckoutState::default();
        set_shipping(&mut checkout, address()).unwrap();
        set_payment(&mut checkout, &payment()).unwrap();

        let placed = place_order(
            &backend,
            &cache,
            Caller::new(user.id, "t"),
            CheckoutSession {
                cart: &mut cart,
                coupon: &mut coupon,
                checkout: &mut checkout,
            },
        )
        .await
        .unwrap();

        // 60 - 6 discount + 10 shipping + 4.32 tax
        assert_eq!(placed.order_id, OrderId::new(42));
        assert_eq!(placed.total, Decimal::new(6832, 2));
        assert_eq!(placed.points_earned, 68);

        let args = fake.rpc_args("create_order_from_cart");
        assert_eq!(args.len(), 1);
        assert_eq!(args[0]["coupon_code"], "SAVE10");
        let discount: Decimal = args[0]["coupon_discount"].as_str().unwrap().parse().unwrap();
        assert_eq!(discount, Decimal::from(6));
        assert_eq!(args[0]["shipping_address_payload"]["city"], "Phoenix");

        let notifications = fake.rows("notifications");
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0]["message"],
            "Order #42 placed successfully! We'll keep you updated on its status."
        );
        assert_eq!(fake.rows("reward_points")[0]["points_balance"], 78);

        assert!(cart.items.is_empty());
        assert!(cart.cart_id.is_none());
        assert!(coupon.is_none());
        assert_eq!(checkout.step, CheckoutStep::Shipping);
    }
}
