//! Storefront services.
//!
//! Stateful services (catalog snapshot, user data cache, tracking
//! simulations, shopper client, banner cache, heartbeat) are held in
//! `AppState`. The rest are functions over a [`BackendClient`] and the
//! session-held state they mutate; route handlers persist that state back
//! to the session.
//!
//! [`BackendClient`]: crate::backend::BackendClient

pub mod admin;
pub mod analytics;
pub mod cart;
pub mod catalog;
pub mod checkout;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod marketing;
pub mod newsletter;
pub mod notifications;
pub mod profile;
pub mod refresh;
pub mod rewards;
pub mod seller;
pub mod session_watcher;
pub mod shopper;
pub mod tracking;
pub mod user_data;
pub mod wishlist;

use naxstore_core::UserId;

use crate::backend::Bearer;

/// The signed-in user on whose behalf backend calls are made.
#[derive(Debug, Clone, Copy)]
pub struct Caller<'a> {
    pub user_id: UserId,
    pub token: &'a str,
}

impl<'a> Caller<'a> {
    #[must_use]
    pub const fn new(user_id: UserId, token: &'a str) -> Self {
        Self { user_id, token }
    }

    #[must_use]
    pub const fn bearer(&self) -> Bearer<'a> {
        Bearer::User(self.token)
    }
}

/// Bearer for an optional caller.
#[must_use]
pub const fn bearer_for<'a>(caller: Option<&Caller<'a>>) -> Bearer<'a> {
    match caller {
        Some(c) => Bearer::User(c.token),
        None => Bearer::Anon,
    }
}
