//! Shared test data, and an in-process stand-in for the hosted backend.
//!
//! [`FakeBackend`] speaks just enough of the REST layer for service tests:
//! `eq`, `neq` and `in` filters, `limit`, upserts on a conflict target,
//! and canned RPC results. Projections and ordering are ignored; rows are
//! returned as seeded.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde_json::{Map, Value, json};

use naxstore_core::{Product, ProductId, RewardTier, User, UserId, UserRole};

use crate::backend::BackendClient;
use crate::config::BackendConfig;

/// Client pointed at a closed local port; every request fails fast.
pub(crate) fn offline_backend() -> BackendClient {
    client_for("http://127.0.0.1:9")
}

fn client_for(url: &str) -> BackendClient {
    BackendClient::new(&BackendConfig {
        url: url::Url::parse(url).unwrap(),
        anon_key: secrecy::SecretString::from("test-anon-key"),
    })
}

pub(crate) fn product(id: i64, name: &str, price: i64) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        price: Decimal::from(price),
        image: format!("https://img.naxstore.test/{id}.png"),
        images: vec![],
        description: format!("{name} description"),
        reviews: vec![],
        stock: 10,
        seller_id: UserId::new(uuid::Uuid::nil()),
    }
}

pub(crate) fn user(role: UserRole) -> User {
    User {
        id: UserId::new(uuid::Uuid::from_u128(7)),
        name: "Ana".to_string(),
        email: "ana@naxstore.test".to_string(),
        role,
        points: 0,
        reward_tier: RewardTier::Bronze,
        referral_code: "N/A".to_string(),
        profile_picture: None,
        store_name: None,
        is_verified: None,
        commission_rate: None,
    }
}

/// A `products` row as the REST layer returns it, with one variant.
pub(crate) fn product_row(id: i64, title: &str, price: i64, stock: i64) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": format!("{title} description"),
        "base_price": price,
        "images": [format!("https://img.naxstore.test/{id}.png")],
        "seller_id": uuid::Uuid::nil(),
        "status": "active",
        "product_variants": [{ "id": id * 10, "product_id": id, "stock": stock }],
        "reviews": [],
    })
}

#[derive(Default)]
struct FakeState {
    tables: HashMap<String, Vec<Value>>,
    rpc: HashMap<String, Value>,
    rpc_calls: Vec<(String, Value)>,
    next_id: u64,
}

/// Tables and RPC results served over HTTP on a local ephemeral port.
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    /// Bind to `127.0.0.1:0` and return the fake with a client pointed at it.
    pub(crate) async fn start() -> (Self, BackendClient) {
        let fake = Self::default();
        let app = Router::new()
            .route("/rest/v1/rpc/{function}", post(call_rpc))
            .route(
                "/rest/v1/{table}",
                get(select_rows)
                    .post(insert_rows)
                    .patch(update_rows)
                    .delete(delete_rows),
            )
            .with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        (fake, client_for(&format!("http://{addr}")))
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn seed(&self, table: &str, rows: Vec<Value>) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub(crate) fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Answer calls to `function` with `result`. Unknown functions get a 404.
    pub(crate) fn on_rpc(&self, function: &str, result: Value) {
        self.lock().rpc.insert(function.to_string(), result);
    }

    /// Arguments of every call made to `function`, oldest first.
    pub(crate) fn rpc_args(&self, function: &str) -> Vec<Value> {
        self.lock()
            .rpc_calls
            .iter()
            .filter(|(name, _)| name == function)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[derive(Default)]
struct Params {
    filters: Vec<(String, String)>,
    limit: Option<usize>,
    on_conflict: Option<Vec<String>>,
}

impl Params {
    fn parse(raw: Option<&str>) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
            match &*key {
                "select" | "order" => {}
                "limit" => params.limit = value.parse().ok(),
                "on_conflict" => {
                    params.on_conflict =
                        Some(value.split(',').map(str::to_string).collect());
                }
                _ => params.filters.push((key.into_owned(), value.into_owned())),
            }
        }
        params
    }

    fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|(column, expr)| {
            let actual = render(row.get(column));
            if let Some(expected) = expr.strip_prefix("eq.") {
                actual == expected
            } else if let Some(expected) = expr.strip_prefix("neq.") {
                actual != expected
            } else if let Some(list) = expr.strip_prefix("in.") {
                list.trim_start_matches('(')
                    .trim_end_matches(')')
                    .split(',')
                    .any(|item| item.trim_matches('"') == actual)
            } else {
                true
            }
        })
    }
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn wants_rows(headers: &HeaderMap) -> bool {
    headers
        .get("Prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("return=representation"))
}

fn written(status: StatusCode, headers: &HeaderMap, rows: Vec<Value>) -> Response {
    if wants_rows(headers) {
        (status, Json(Value::Array(rows))).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

fn merge_into(target: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(fields) = target {
        for (key, value) in patch {
            fields.insert(key.clone(), value.clone());
        }
    }
}

/// Server-side column defaults for a freshly inserted row.
fn fill_defaults(state: &mut FakeState, table: &str, row: &mut Map<String, Value>) {
    if !row.contains_key("id") {
        state.next_id += 1;
        let id = match table {
            "carts" | "wishlists" => json!(uuid::Uuid::from_u128(u128::from(state.next_id))),
            _ => json!(1000 + state.next_id),
        };
        row.insert("id".to_string(), id);
    }
    row.entry("created_at")
        .or_insert_with(|| json!("2026-10-01T12:00:00Z"));
    match table {
        "carts" => {
            row.entry("status").or_insert_with(|| json!("active"));
        }
        "notifications" => {
            row.entry("is_read").or_insert(Value::Bool(false));
        }
        _ => {}
    }
}

async fn select_rows(
    State(fake): State<FakeBackend>,
    Path(table): Path<String>,
    RawQuery(raw): RawQuery,
) -> Json<Value> {
    let params = Params::parse(raw.as_deref());
    let state = fake.lock();
    let rows = state.tables.get(&table).map(Vec::as_slice).unwrap_or_default();
    let matched = rows
        .iter()
        .filter(|row| params.matches(row))
        .take(params.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();
    Json(Value::Array(matched))
}

async fn insert_rows(
    State(fake): State<FakeBackend>,
    Path(table): Path<String>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = Params::parse(raw.as_deref());
    let incoming = match serde_json::from_slice(&body).unwrap_or(Value::Null) {
        Value::Array(rows) => rows,
        row => vec![row],
    };

    let mut state = fake.lock();
    let mut out = Vec::new();
    for row in incoming {
        let Value::Object(mut fields) = row else {
            continue;
        };
        let existing = params.on_conflict.as_ref().and_then(|columns| {
            state.tables.get(&table).and_then(|rows| {
                rows.iter().position(|current| {
                    columns.iter().all(|c| {
                        current.get(c).unwrap_or(&Value::Null)
                            == fields.get(c).unwrap_or(&Value::Null)
                    })
                })
            })
        });

        if let Some(index) = existing {
            let rows = state.tables.entry(table.clone()).or_default();
            merge_into(&mut rows[index], &fields);
            out.push(rows[index].clone());
        } else {
            fill_defaults(&mut state, &table, &mut fields);
            let row = Value::Object(fields);
            out.push(row.clone());
            state.tables.entry(table.clone()).or_default().push(row);
        }
    }
    written(StatusCode::CREATED, &headers, out)
}

async fn update_rows(
    State(fake): State<FakeBackend>,
    Path(table): Path<String>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = Params::parse(raw.as_deref());
    let patch = match serde_json::from_slice(&body).unwrap_or(Value::Null) {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };

    let mut state = fake.lock();
    let mut out = Vec::new();
    for row in state.tables.entry(table).or_default() {
        if params.matches(row) {
            merge_into(row, &patch);
            out.push(row.clone());
        }
    }
    written(StatusCode::OK, &headers, out)
}

async fn delete_rows(
    State(fake): State<FakeBackend>,
    Path(table): Path<String>,
    RawQuery(raw): RawQuery,
) -> StatusCode {
    let params = Params::parse(raw.as_deref());
    if let Some(rows) = fake.lock().tables.get_mut(&table) {
        rows.retain(|row| !params.matches(row));
    }
    StatusCode::NO_CONTENT
}

async fn call_rpc(
    State(fake): State<FakeBackend>,
    Path(function): Path<String>,
    body: Bytes,
) -> Response {
    let args = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let mut state = fake.lock();
    state.rpc_calls.push((function.clone(), args));
    match state.rpc.get(&function) {
        Some(result) => Json(result.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "PGRST202", "message": "function not found" })),
        )
            .into_response(),
    }
}
