//! Backend table rows and insert payloads.
//!
//! Read rows mirror the JSON the REST layer returns for a given `select`
//! projection, embeds included. Write payloads carry only the columns a
//! request sets.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use naxstore_core::{
    AddressId, BannerId, CartId, CategoryId, CommissionId, NotificationId, NotificationType,
    OrderId, OrderItemId, OrderPublicId, OrderStatus, ProductId, ProductStatus, ReviewId,
    RewardTier, UserId, UserRole, VariantId, WishlistId,
};

/// Products with variants, seller profile, and reviews with reviewer profiles.
pub const PRODUCT_SELECT: &str = "*, product_variants(*), profiles(*), reviews(*, profiles(*))";

/// Profile with reward balance and seller row.
pub const PROFILE_SELECT: &str = "*, reward_points(*), sellers(*)";

/// Orders with line items (and their products) and tracking history.
pub const ORDER_SELECT: &str = "*, order_items(*, products(*)), order_tracking(*)";

/// Embedded relations come back as an object, an array, or `null` depending
/// on how the backend resolves the relationship's cardinality.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(
        match Option::<OneOrMany<T>>::deserialize(deserializer)? {
            Some(OneOrMany::Many(rows)) => rows,
            Some(OneOrMany::One(row)) => vec![row],
            None => Vec::new(),
        },
    )
}

fn first_of<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    one_or_many(deserializer).map(|rows| rows.into_iter().next())
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRow {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub base_price: Decimal,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    pub seller_id: UserId,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub product_variants: Vec<VariantRow>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub reviews: Vec<ReviewRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantRow {
    pub id: VariantId,
    pub product_id: ProductId,
    pub stock: i64,
    #[serde(default)]
    pub price_modifier: Option<Decimal>,
    #[serde(default)]
    pub sku: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRow {
    pub id: ReviewId,
    pub rating: i16,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "first_of")]
    pub profiles: Option<ReviewerRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewerRow {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewProduct<'a> {
    pub seller_id: UserId,
    pub category_id: CategoryId,
    pub title: &'a str,
    pub description: &'a str,
    pub base_price: Decimal,
    pub images: Vec<String>,
    pub status: ProductStatus,
}

#[derive(Debug, Serialize)]
pub struct NewVariant {
    pub product_id: ProductId,
    pub stock: i64,
}

#[derive(Debug, Serialize)]
pub struct NewReview<'a> {
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: u8,
    pub comment: &'a str,
}

// =============================================================================
// Profiles
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRow {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub reward_points: Vec<RewardPointsRow>,
    #[serde(default, deserialize_with = "first_of")]
    pub sellers: Option<SellerRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardPointsRow {
    pub points_balance: i64,
    #[serde(default)]
    pub tier: Option<RewardTier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SellerRow {
    pub id: UserId,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
    #[serde(default)]
    pub is_verified: Option<bool>,
}

/// Profile id and name, for seller pickers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileRefRow {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewProfile<'a> {
    pub id: UserId,
    pub full_name: &'a str,
    pub avatar_url: Option<&'a str>,
    pub role: UserRole,
}

// =============================================================================
// Addresses
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AddressRow {
    pub id: AddressId,
    pub full_name: String,
    pub address_line_1: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct NewAddress<'a> {
    pub user_id: UserId,
    pub full_name: &'a str,
    pub address_line_1: &'a str,
    pub city: &'a str,
    pub state: &'a str,
    pub zip_code: &'a str,
    pub country: &'a str,
    pub is_default: bool,
}

// =============================================================================
// Carts and wishlists
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CartRow {
    pub id: CartId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartItemRow {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct NewCart {
    pub user_id: UserId,
}

/// Cart line payload; `variant_id` is part of the upsert conflict target.
#[derive(Debug, Serialize)]
pub struct CartItemUpsert {
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WishlistRow {
    pub id: WishlistId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WishlistItemRow {
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct NewWishlistItem {
    pub wishlist_id: WishlistId,
    pub product_id: ProductId,
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRow {
    pub id: OrderId,
    pub public_id: OrderPublicId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_price: Decimal,
    #[serde(default)]
    pub shipping_address_json: serde_json::Value,
    #[serde(default, deserialize_with = "one_or_many")]
    pub order_items: Vec<OrderItemRow>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub order_tracking: Vec<TrackingRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRow {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub price: Decimal,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub quantity: i64,
    #[serde(default, deserialize_with = "first_of")]
    pub products: Option<ProductRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingRow {
    pub status: String,
    #[serde(default)]
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Order id pair, for joining commissions to public order ids.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRefRow {
    pub id: OrderId,
    pub public_id: OrderPublicId,
}

/// An order item with only its order and product title.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderItemTitleRow {
    pub id: OrderItemId,
    pub order_id: OrderId,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default, deserialize_with = "first_of")]
    pub products: Option<ProductTitle>,
}

/// Just a product's title, for `products(title)` embeds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProductTitle {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRefRow {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdRow<T> {
    pub id: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommissionRow {
    pub id: CommissionId,
    pub amount: Decimal,
    pub commission_rate: Decimal,
    pub created_at: DateTime<Utc>,
    pub order_item_id: OrderItemId,
}

// =============================================================================
// Notifications and marketing
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRow {
    pub id: NotificationId,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct NewNotification<'a> {
    pub user_id: UserId,
    pub message: &'a str,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub metadata: Option<&'a serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BannerRow {
    pub id: BannerId,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
}
