//! Core types for NaxStore.
//!
//! This module provides type-safe wrappers for common domain concepts and
//! the view records mirrored from backend tables.

pub mod email;
pub mod id;
pub mod marketing;
pub mod order;
pub mod product;
pub mod status;
pub mod user;

pub use email::{Email, EmailError};
pub use id::*;
pub use marketing::{Banner, Commission, Coupon};
pub use order::{Order, OrderSummary, ShippingAddress, TrackingEvent};
pub use product::{Product, ProductSummary, Review};
pub use status::*;
pub use user::{Notification, User};
