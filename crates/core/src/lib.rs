//! NaxStore Core - Shared domain types.
//!
//! This crate provides the records and arithmetic shared by the storefront
//! service and its tests:
//! - `types` - Newtype IDs, status enums, email, and the view-model records
//!   mirrored from backend tables
//! - `cart` - Cart lines, guest/remote merging, and derived totals
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! HTTP clients. Everything that talks to the hosted backend lives in the
//! storefront crate.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod types;

pub use cart::{Cart, CartItem, CartTotals};
pub use types::*;
