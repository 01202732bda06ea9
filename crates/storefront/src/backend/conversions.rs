//! Conversions from backend rows to core view records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use naxstore_core::{
    Banner, CartItem, Email, Notification, Order, OrderSummary, Product, ProductId,
    ProductSummary, Review, ShippingAddress, TrackingEvent, User, UserRole,
};

use super::rows::{
    AddressRow, BannerRow, NotificationRow, OrderRow, ProductRow, ProfileRow, ReviewRow,
};

/// Commission rate assumed for sellers without one on file.
pub const DEFAULT_COMMISSION_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);

const ANONYMOUS_AUTHOR: &str = "Anonymous";
const UNKNOWN_LOCATION: &str = "Unknown";
const NO_REFERRAL_CODE: &str = "N/A";

/// Stand-in image for products without any uploaded images.
#[must_use]
pub fn placeholder_image(seed: impl std::fmt::Display) -> String {
    format!("https://picsum.photos/seed/{seed}/600/600")
}

/// Map a product row with its embeds to a catalog [`Product`].
///
/// Stock is summed across variants; reviews are ordered newest first.
#[must_use]
pub fn product_from_row(row: ProductRow) -> Product {
    let stock = row.product_variants.iter().map(|v| v.stock).sum();
    let mut images: Vec<String> = row
        .images
        .unwrap_or_default()
        .into_iter()
        .filter(|url| !url.trim().is_empty())
        .collect();
    let image = images
        .first()
        .cloned()
        .unwrap_or_else(|| placeholder_image(row.id));
    if images.is_empty() {
        images.push(image.clone());
    }

    let mut reviews: Vec<Review> = row.reviews.into_iter().map(review_from_row).collect();
    reviews.sort_by(|a, b| b.date.cmp(&a.date));

    Product {
        id: row.id,
        name: row.title,
        price: row.base_price,
        image,
        images,
        description: row.description.unwrap_or_default(),
        reviews,
        stock,
        seller_id: row.seller_id,
    }
}

#[must_use]
pub fn review_from_row(row: ReviewRow) -> Review {
    let author = row
        .profiles
        .and_then(|p| p.full_name)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());
    Review {
        id: row.id,
        author,
        rating: u8::try_from(row.rating.clamp(1, 5)).unwrap_or(Review::MIN_RATING),
        comment: row.comment.unwrap_or_default(),
        date: row.created_at,
    }
}

/// Map a profile (with reward points and seller row) to the session [`User`].
#[must_use]
pub fn user_from_profile(profile: ProfileRow, email: &str) -> User {
    let rewards = profile.reward_points.into_iter().next();
    let name = profile
        .full_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| name_from_email(email));

    let (store_name, is_verified, commission_rate) = match (profile.role, profile.sellers) {
        (UserRole::Seller, seller) => {
            let store_name = seller
                .as_ref()
                .and_then(|s| s.business_name.clone())
                .unwrap_or_else(|| format!("{name}'s Store"));
            let is_verified = seller.as_ref().and_then(|s| s.is_verified).unwrap_or(false);
            let rate = seller
                .and_then(|s| s.commission_rate)
                .unwrap_or(DEFAULT_COMMISSION_RATE);
            (Some(store_name), Some(is_verified), Some(rate))
        }
        (_, Some(seller)) => (
            seller.business_name,
            Some(seller.is_verified.unwrap_or(false)),
            Some(seller.commission_rate.unwrap_or(DEFAULT_COMMISSION_RATE)),
        ),
        (_, None) => (None, None, None),
    };

    User {
        id: profile.id,
        name,
        email: email.to_string(),
        role: profile.role,
        points: rewards.as_ref().map_or(0, |r| r.points_balance),
        reward_tier: rewards.and_then(|r| r.tier).unwrap_or_default(),
        referral_code: profile
            .referral_code
            .unwrap_or_else(|| NO_REFERRAL_CODE.to_string()),
        profile_picture: profile.avatar_url,
        store_name,
        is_verified,
        commission_rate,
    }
}

/// Name for an account that has none on file: the address's local part,
/// or the raw address if it does not parse.
#[must_use]
pub fn name_from_email(email: &str) -> String {
    Email::parse_normalized(email)
        .map_or_else(|_| email.trim().to_string(), |e| e.local_part().to_string())
}

/// Map an order row with items and tracking to an [`Order`].
///
/// Items whose product no longer exists are skipped. Tracking is oldest first.
#[must_use]
pub fn order_from_row(row: OrderRow) -> Order {
    let items = row
        .order_items
        .into_iter()
        .filter_map(|item| {
            let product = item.products?;
            let quantity = u32::try_from(item.quantity).unwrap_or(0);
            Some(CartItem::new(
                ProductSummary {
                    id: product.id,
                    name: product.title,
                    price: item.price,
                    image: product
                        .images
                        .and_then(|imgs| imgs.into_iter().next())
                        .unwrap_or_default(),
                    stock: 0,
                    seller_id: product.seller_id,
                },
                quantity,
            ))
        })
        .collect();

    let mut tracking_history: Vec<TrackingEvent> = row
        .order_tracking
        .into_iter()
        .map(|t| TrackingEvent {
            status: t.status,
            location: t
                .location
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
            timestamp: t.timestamp,
        })
        .collect();
    tracking_history.sort_by_key(|t| t.timestamp);

    let shipping_address =
        serde_json::from_value::<ShippingAddress>(row.shipping_address_json).unwrap_or_default();

    Order {
        id: row.public_id,
        internal_id: row.id,
        date: row.created_at,
        status: row.status,
        total: row.total_price,
        items,
        tracking_history,
        shipping_address,
    }
}

#[must_use]
pub fn order_summary_from_row(row: &OrderRow) -> OrderSummary {
    OrderSummary {
        id: row.public_id,
        internal_id: row.id,
        user_id: row.user_id,
        date: row.created_at,
        status: row.status,
        total: row.total_price,
    }
}

#[must_use]
pub fn address_from_row(row: AddressRow) -> ShippingAddress {
    ShippingAddress {
        id: Some(row.id),
        full_name: row.full_name,
        address_line1: row.address_line_1,
        city: row.city,
        state: row.state,
        zip_code: row.zip_code,
        country: row.country,
        is_default: row.is_default,
    }
}

#[must_use]
pub fn notification_from_row(row: NotificationRow) -> Notification {
    Notification {
        id: row.id,
        message: row.message,
        kind: row.kind,
        is_read: row.is_read,
        timestamp: row.created_at,
        metadata: row.metadata,
    }
}

#[must_use]
pub fn banner_from_row(row: BannerRow) -> Banner {
    Banner {
        id: row.id,
        title: row.title,
        subtitle: row.subtitle,
        image_url: row.image_url,
        link_url: row.link_url,
    }
}

/// Resolve product ids against the catalog, preserving order and dropping
/// ids that are no longer listed.
#[must_use]
pub fn resolve_products(ids: &[ProductId], catalog: &[Product]) -> Vec<Product> {
    ids.iter()
        .filter_map(|id| catalog.iter().find(|p| p.id == *id).cloned())
        .collect()
}

/// Tracking event for a status change observed at `now`.
#[must_use]
pub fn tracking_event(label: &str, location: &str, now: DateTime<Utc>) -> TrackingEvent {
    TrackingEvent {
        status: label.to_string(),
        location: location.to_string(),
        timestamp: now,
    }
}
