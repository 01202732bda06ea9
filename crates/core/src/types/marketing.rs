//! Coupons, banners and seller commissions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{BannerId, CommissionId, OrderItemId, OrderPublicId};
use super::status::DiscountType;

/// A validated coupon held against the visitor's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
}

/// Promotional banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Banner {
    pub id: BannerId,
    pub title: String,
    pub subtitle: Option<String>,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
}

/// A commission earned by a seller on one order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: CommissionId,
    pub amount: Decimal,
    pub rate: Decimal,
    pub date: DateTime<Utc>,
    pub order_item_id: OrderItemId,
    pub order_public_id: OrderPublicId,
    pub product_name: String,
}
