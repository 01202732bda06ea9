//! Session layer over the `PostgreSQL` session store.
//!
//! The session holds everything a visitor carries between requests (cart,
//! tokens, coupon, checkout progress), so it must outlive a server restart.

use sqlx::PgPool;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "nax_session";

/// Sessions idle for this long expire (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Build the session layer.
///
/// The `tower_sessions` table is created by [`crate::db::migrate_session_store`].
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> SessionManagerLayer<PostgresStore> {
    session_layer_for(PostgresStore::new(pool.clone()), config.is_https())
}

/// Session layer over any store, for tests that run without Postgres.
pub fn session_layer_for<S>(store: S, secure: bool) -> SessionManagerLayer<S>
where
    S: tower_sessions::SessionStore,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            SESSION_EXPIRY_SECONDS,
        )))
        .with_secure(secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
