//! Domain models for storefront.
//!
//! Catalog and account records live in `naxstore-core`; this module holds
//! the types that only exist inside a visitor's session.

pub mod session;

pub use session::{AuthTokens, CartState, CheckoutState, CheckoutStep, keys as session_keys};
