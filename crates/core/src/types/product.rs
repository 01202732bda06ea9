//! Catalog records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ProductId, ReviewId, UserId};

/// A product as shown in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    /// Main image.
    pub image: String,
    /// Gallery images, main image first.
    pub images: Vec<String>,
    pub description: String,
    /// Newest first.
    pub reviews: Vec<Review>,
    /// Sum of stock across all variants.
    pub stock: i64,
    pub seller_id: UserId,
}

impl Product {
    /// The fields a cart line keeps about its product.
    #[must_use]
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            name: self.name.clone(),
            price: self.price,
            image: self.image.clone(),
            stock: self.stock,
            seller_id: self.seller_id,
        }
    }

    /// Average review rating, if there are any reviews.
    #[must_use]
    pub fn average_rating(&self) -> Option<Decimal> {
        if self.reviews.is_empty() {
            return None;
        }
        let sum: u32 = self.reviews.iter().map(|r| u32::from(r.rating)).sum();
        let avg = Decimal::from(sum) / Decimal::from(self.reviews.len());
        Some(avg.round_dp(1))
    }
}

/// Product snapshot carried by cart lines and order items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub image: String,
    pub stock: i64,
    pub seller_id: UserId,
}

/// A customer review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub author: String,
    /// 1 to 5.
    pub rating: u8,
    pub comment: String,
    pub date: DateTime<Utc>,
}

impl Review {
    pub const MIN_RATING: u8 = 1;
    pub const MAX_RATING: u8 = 5;

    /// Whether `rating` is an accepted star rating.
    #[must_use]
    pub const fn is_valid_rating(rating: u8) -> bool {
        rating >= Self::MIN_RATING && rating <= Self::MAX_RATING
    }
}
