//! Orders and shipping.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{AddressId, OrderId, OrderPublicId, UserId};
use super::status::OrderStatus;
use crate::cart::CartItem;

/// A fully populated order for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Public UUID shown to the customer.
    pub id: OrderPublicId,
    pub internal_id: OrderId,
    pub date: DateTime<Utc>,
    pub status: OrderStatus,
    pub total: Decimal,
    pub items: Vec<CartItem>,
    /// Oldest first.
    pub tracking_history: Vec<TrackingEvent>,
    pub shipping_address: ShippingAddress,
}

/// An order without its lines or tracking, for seller and admin listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: OrderPublicId,
    pub internal_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub date: DateTime<Utc>,
    pub status: OrderStatus,
    pub total: Decimal,
}

/// One step in an order's tracking history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// Capitalized status label, e.g. "Shipped".
    pub status: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// A shipping address, either saved to the account or entered at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AddressId>,
    pub full_name: String,
    pub address_line1: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

impl ShippingAddress {
    pub const DEFAULT_COUNTRY: &'static str = "USA";

    /// Names of required fields that are blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("fullName", &self.full_name),
            ("addressLine1", &self.address_line1),
            ("city", &self.city),
            ("state", &self.state),
            ("zipCode", &self.zip_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

impl Default for ShippingAddress {
    fn default() -> Self {
        Self {
            id: None,
            full_name: String::new(),
            address_line1: String::new(),
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            country: default_country(),
            is_default: false,
        }
    }
}

fn default_country() -> String {
    ShippingAddress::DEFAULT_COUNTRY.to_owned()
}
