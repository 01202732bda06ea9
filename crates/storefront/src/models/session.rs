//! Session-related types.
//!
//! Everything a visitor's session carries between requests: auth tokens,
//! the signed-in user, the guest or mirrored cart, the active coupon, and
//! checkout progress.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_sessions::{Session, session};

use naxstore_core::cart::RemovedItem;
use naxstore_core::{Cart, CartId, ShippingAddress};

use crate::backend::AuthSession;

/// Session-stored auth tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    /// Tokens from a fresh auth session issued at `now`.
    #[must_use]
    pub fn from_session(session: &AuthSession, now: DateTime<Utc>) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at(now),
        }
    }

    /// Whether the access token expires within `threshold` of `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expires_at - now < threshold
    }
}

/// Session-held cart.
///
/// `cart_id` is set once the cart is mirrored to the backend (signed in).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartState {
    #[serde(default)]
    pub cart_id: Option<CartId>,
    #[serde(default)]
    pub items: Cart,
    #[serde(default)]
    pub last_removed: Option<RemovedItem>,
}

/// Checkout wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    #[default]
    Shipping,
    Payment,
    Review,
}

impl CheckoutStep {
    /// 1-based position in the wizard.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Shipping => 1,
            Self::Payment => 2,
            Self::Review => 3,
        }
    }

    #[must_use]
    pub const fn previous(self) -> Self {
        match self {
            Self::Shipping | Self::Payment => Self::Shipping,
            Self::Review => Self::Payment,
        }
    }
}

/// Session-held checkout progress. Payment details are never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutState {
    pub step: CheckoutStep,
    pub shipping: ShippingAddress,
}

/// Session keys.
pub mod keys {
    /// Auth tokens for the signed-in user.
    pub const AUTH: &str = "auth";

    /// The signed-in user's profile.
    pub const CURRENT_USER: &str = "current_user";

    /// Cart lines and mirror id.
    pub const CART: &str = "cart";

    /// Active coupon.
    pub const COUPON: &str = "coupon";

    /// Checkout wizard state.
    pub const CHECKOUT: &str = "checkout";
}

/// Read a session value, falling back to its default when absent.
///
/// # Errors
///
/// Returns an error if the session store fails or the value cannot be
/// deserialized.
pub async fn load_or_default<T>(session: &Session, key: &str) -> Result<T, session::Error>
where
    T: DeserializeOwned + Default,
{
    Ok(session.get::<T>(key).await?.unwrap_or_default())
}

/// Write `value` under `key`, removing the key for `None`.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn store_optional<T>(
    session: &Session,
    key: &str,
    value: Option<&T>,
) -> Result<(), session::Error>
where
    T: Serialize + Sync,
{
    match value {
        Some(v) => session.insert(key, v).await,
        None => session.remove_value(key).await.map(drop),
    }
}
