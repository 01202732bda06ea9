//! Status and kind enums mirrored from backend enum types.
//!
//! Every enum serializes to the exact string stored by the backend, so the
//! same value can be used in JSON bodies, query filters, and RPC arguments.

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Implements `as_str`, `Display` and `FromStr` from a single variant/string table.
macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// The backend's string form of this value.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    PendingPayment,
}

wire_enum!(OrderStatus, "order status", {
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    PendingPayment => "pending_payment",
});

impl OrderStatus {
    /// The status a simulated shipment moves to next, if any.
    ///
    /// Delivered and cancelled orders are terminal.
    #[must_use]
    pub const fn next_tracking_step(self) -> Option<Self> {
        match self {
            Self::PendingPayment => Some(Self::Processing),
            Self::Processing => Some(Self::Shipped),
            Self::Shipped => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }

    /// Whether the order is neither delivered nor cancelled.
    #[must_use]
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Capitalized label shown in tracking history ("Shipped").
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::PendingPayment => "Pending Payment",
        }
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Seller,
}

wire_enum!(UserRole, "user role", {
    User => "user",
    Admin => "admin",
    Seller => "seller",
});

/// Loyalty tier. Stored capitalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum RewardTier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

wire_enum!(RewardTier, "reward tier", {
    Bronze => "Bronze",
    Silver => "Silver",
    Gold => "Gold",
    Platinum => "Platinum",
});

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Order,
    Promo,
    System,
    Seller,
    Wishlist,
}

wire_enum!(NotificationType, "notification type", {
    Order => "order",
    Promo => "promo",
    System => "system",
    Seller => "seller",
    Wishlist => "wishlist",
});

/// How a coupon's value is applied to the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

wire_enum!(DiscountType, "discount type", {
    Percentage => "percentage",
    Fixed => "fixed",
});

/// Server-side cart lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[default]
    Active,
    CheckedOut,
    Abandoned,
}

wire_enum!(CartStatus, "cart status", {
    Active => "active",
    CheckedOut => "checked_out",
    Abandoned => "abandoned",
});

/// Catalog listing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    #[default]
    Active,
    Archived,
}

wire_enum!(ProductStatus, "product status", {
    Draft => "draft",
    Active => "active",
    Archived => "archived",
});

/// Analytics event kinds accepted by the `log_event` RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventType {
    PageView,
    ProductClick,
    AddToCart,
    Purchase,
}

wire_enum!(AnalyticsEventType, "analytics event type", {
    PageView => "page_view",
    ProductClick => "product_click",
    AddToCart => "add_to_cart",
    Purchase => "purchase",
});
