//! HTTP route handlers for storefront.
//!
//! Every handler speaks JSON. Mutations answer with the updated resource
//! and, where the action has one, a `message` for the visitor.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness
//! GET  /health/ready                 - Session store and backend heartbeat
//!
//! # Session
//! GET  /api/session                  - Restore the stored session
//! POST /api/auth/login               - Sign in (rate limited)
//! POST /api/auth/signup              - Sign up (rate limited)
//! POST /api/auth/logout              - Sign out
//!
//! # Catalog
//! GET  /api/products                 - Catalog snapshot
//! GET  /api/products/{id}            - Product detail
//! POST /api/products/{id}/reviews    - Add a review
//!
//! # Cart
//! GET    /api/cart                   - Lines and totals
//! DELETE /api/cart                   - Clear
//! POST   /api/cart/items             - Add a product
//! PATCH  /api/cart/items/{id}        - Set quantity
//! DELETE /api/cart/items/{id}        - Remove (undoable)
//! POST   /api/cart/restore           - Undo the last removal
//! POST   /api/coupon                 - Apply a coupon
//! DELETE /api/coupon                 - Remove the coupon
//!
//! # Checkout
//! GET  /api/checkout                 - Wizard state
//! PUT  /api/checkout/shipping        - Shipping step
//! PUT  /api/checkout/payment         - Payment step
//! POST /api/checkout/back            - Previous step
//! POST /api/checkout/order           - Place the order
//!
//! # Account (requires auth)
//! GET    /api/account                - User, orders, addresses
//! PATCH  /api/account/profile        - Update name
//! POST   /api/account/addresses      - Add address
//! DELETE /api/account/addresses/{id} - Remove address
//! POST   /api/account/addresses/{id}/default
//! POST   /api/account/points         - Add reward points
//! POST   /api/account/become-seller
//! GET    /api/orders                 - Order history
//! GET    /api/orders/{id}/tracking   - Tracking view
//! POST   /api/orders/{id}/tracking   - Start live tracking
//! GET    /api/wishlist
//! POST   /api/wishlist/{product_id}  - Toggle
//! GET    /api/notifications
//! POST   /api/notifications/{id}/read
//! POST   /api/notifications/read-all
//!
//! # Marketing
//! POST /api/shopper                  - Personal shopper (rate limited)
//! GET  /api/banner
//! POST /api/newsletter
//! POST /api/events                   - Analytics
//!
//! # Seller portal
//! GET   /api/seller/dashboard | /orders | /commissions | /products
//! POST  /api/seller/products
//! PATCH /api/seller/settings
//!
//! # Admin panel
//! GET   /api/admin/dashboard | /users | /products | /orders | /sellers
//! PATCH /api/admin/users/{id}
//! POST  /api/admin/sellers/{id}/verify
//! POST  /api/admin/products
//! PUT   /api/admin/products/{id}
//! GET   /api/admin/orders/{id}/items
//! PATCH /api/admin/orders/{id}/status
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod marketing;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod seller;
pub mod shopper;
pub mod wishlist;

use axum::{
    Json, Router,
    routing::{delete, get, patch, post, put},
};
use serde::Serialize;

use crate::middleware::{CurrentUser, auth_rate_limiter, shopper_rate_limiter};
use crate::services::Caller;
use crate::state::AppState;

/// Body for actions whose only result is a message.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

/// JSON `{"message": ..}`.
pub fn message(message: impl Into<String>) -> Json<MessageBody> {
    Json(MessageBody {
        message: message.into(),
    })
}

/// Caller for an optional signed-in user.
fn caller_of(current: Option<&CurrentUser>) -> Option<Caller<'_>> {
    current.map(CurrentUser::caller)
}

/// Create the session and auth routes router.
pub fn auth_routes() -> Router<AppState> {
    let limited = Router::new()
        .route("/login", post(auth::login))
        .route("/signup", post(auth::signup))
        .layer(auth_rate_limiter());

    Router::new()
        .route("/logout", post(auth::logout))
        .merge(limited)
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
        .route("/{id}/reviews", post(products::add_review))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route(
            "/items/{product_id}",
            patch(cart::update).delete(cart::remove),
        )
        .route("/restore", post(cart::restore))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/shipping", put(checkout::shipping))
        .route("/payment", put(checkout::payment))
        .route("/back", post(checkout::back))
        .route("/order", post(checkout::place_order))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::index))
        .route("/profile", patch(account::update_profile))
        .route("/addresses", post(account::add_address))
        .route("/addresses/{id}", delete(account::remove_address))
        .route("/addresses/{id}/default", post(account::set_default_address))
        .route("/points", post(account::add_points))
        .route("/become-seller", post(account::become_seller))
}

/// Create the seller portal routes router.
pub fn seller_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(seller::dashboard))
        .route("/orders", get(seller::orders))
        .route("/commissions", get(seller::commissions))
        .route("/products", get(seller::products).post(seller::add_product))
        .route("/settings", patch(seller::update_settings))
}

/// Create the admin panel routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/users", get(admin::users))
        .route("/users/{id}", patch(admin::update_user))
        .route("/sellers", get(admin::sellers))
        .route("/sellers/{id}/verify", post(admin::verify_seller))
        .route("/products", get(admin::products).post(admin::create_product))
        .route("/products/{id}", put(admin::update_product))
        .route("/orders", get(admin::orders))
        .route("/orders/{id}/items", get(admin::order_items))
        .route("/orders/{id}/status", patch(admin::update_order_status))
}

/// Create all API routes under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(auth::session))
        .nest("/auth", auth_routes())
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .route("/coupon", post(cart::apply_coupon).delete(cart::remove_coupon))
        .nest("/checkout", checkout_routes())
        .nest("/account", account_routes())
        .route("/orders", get(orders::index))
        .route(
            "/orders/{id}/tracking",
            get(orders::tracking).post(orders::start_tracking),
        )
        .route("/wishlist", get(wishlist::show))
        .route("/wishlist/{product_id}", post(wishlist::toggle))
        .route("/notifications", get(notifications::index))
        .route("/notifications/read-all", post(notifications::read_all))
        .route("/notifications/{id}/read", post(notifications::read))
        .route(
            "/shopper",
            post(shopper::suggest).layer(shopper_rate_limiter()),
        )
        .route("/banner", get(marketing::banner))
        .route("/newsletter", post(marketing::subscribe))
        .route("/events", post(marketing::track_event))
        .nest("/seller", seller_routes())
        .nest("/admin", admin_routes())
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    //! In-process router harness over an in-memory session store.

    use axum::{
        Router,
        body::Body,
        http::{Request, Response, header},
    };
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    use naxstore_core::Product;

    use crate::config::{BackendConfig, StorefrontConfig, TimersConfig};
    use crate::middleware::session::session_layer_for;
    use crate::state::AppState;

    pub(crate) fn test_config() -> StorefrontConfig {
        StorefrontConfig {
            database_url: SecretString::from("postgres://localhost:9/naxstore_test"),
            host: std::net::IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            backend: BackendConfig {
                url: url::Url::parse("http://127.0.0.1:9").unwrap(),
                anon_key: SecretString::from("test-anon-key"),
            },
            gemini: None,
            timers: TimersConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    /// Router with `products` as the catalog. No network is touched unless
    /// a handler calls the backend.
    pub(crate) async fn app(products: Vec<Product>) -> (Router, AppState) {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost:9/naxstore_test")
            .unwrap();
        let state = AppState::new(test_config(), pool);
        state.catalog().replace(products).await;
        let router = super::routes()
            .layer(session_layer_for(MemoryStore::default(), false))
            .with_state(state.clone());
        (router, state)
    }

    /// A tiny cookie-carrying client for one router, always calling from
    /// the same address.
    pub(crate) struct Client {
        router: Router,
        cookie: Option<String>,
    }

    impl Client {
        pub(crate) const fn new(router: Router) -> Self {
            Self {
                router,
                cookie: None,
            }
        }

        pub(crate) async fn send(
            &mut self,
            method: &str,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> (u16, serde_json::Value) {
            let mut builder = Request::builder()
                .method(method)
                .uri(uri)
                .header("x-forwarded-for", "203.0.113.7");
            if let Some(cookie) = &self.cookie {
                builder = builder.header(header::COOKIE, cookie);
            }
            let request = match body {
                Some(json) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            self.remember_cookie(&response);
            let status = response.status().as_u16();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                    serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
                })
            };
            (status, json)
        }

        fn remember_cookie(&mut self, response: &Response<Body>) {
            if let Some(set_cookie) = response
                .headers()
                .get(header::SET_COOKIE)
                .and_then(|v| v.to_str().ok())
                && let Some(pair) = set_cookie.split(';').next()
            {
                self.cookie = Some(pair.to_string());
            }
        }
    }
}
