//! Fixtures shared by the unit tests: an in-process stand-in for the hosted
//! backend and an `AppState` wired to it.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tower_sessions::{MemoryStore, Session};
use verdant_core::UserId;

use crate::config::StorefrontConfig;
use crate::models::CurrentCustomer;
use crate::state::AppState;

/// Id of the signed-in customer used across tests.
pub(crate) const CUSTOMER_ID: uuid::Uuid = uuid::Uuid::from_u128(0x7e57);

/// Order id returned by `place_order`.
pub(crate) const ORDER_ID: i64 = 42;

/// What the fake backend holds.
#[derive(Debug, Default)]
pub(crate) struct BackendData {
    /// Product rows as the REST API returns them.
    pub products: Vec<Value>,
    /// The customer's saved cart: `(product_id, quantity)`, oldest first.
    pub saved_cart: Vec<(i64, u32)>,
    /// `DELETE cart_items` answers 503.
    pub fail_cart_delete: bool,
    /// Status for `POST /auth/v1/token`; success when `None`.
    pub token_status: Option<StatusCode>,
    /// Bodies received by `rpc/place_order`.
    pub orders: Vec<Value>,
}

/// A running fake backend.
#[derive(Clone)]
pub(crate) struct FakeBackend {
    pub url: String,
    data: Arc<Mutex<BackendData>>,
}

impl FakeBackend {
    /// Serve `data` on a random local port.
    pub(crate) async fn start(data: BackendData) -> Self {
        let data = Arc::new(Mutex::new(data));
        let app = Router::new()
            .route("/rest/v1/products", get(products))
            .route(
                "/rest/v1/cart_items",
                get(cart_items).post(save_cart_items).delete(delete_cart_items),
            )
            .route("/rest/v1/rpc/place_order", post(place_order))
            .route("/auth/v1/token", post(token))
            .with_state(data.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Self {
            url: format!("http://{addr}"),
            data,
        }
    }

    pub(crate) fn data(&self) -> MutexGuard<'_, BackendData> {
        self.data.lock().unwrap()
    }

    /// Application state whose backend client talks to this fake.
    pub(crate) fn state(&self) -> AppState {
        let mut config = StorefrontConfig::for_tests();
        config.backend.url.clone_from(&self.url);
        // Never connects: nothing under test touches the session database.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/verdant_storefront_test")
            .unwrap();
        AppState::new(config, pool).unwrap()
    }
}

/// A product row.
pub(crate) fn product(id: i64, name: &str, cents: u32, stock: i32) -> Value {
    json!({
        "id": id,
        "name": name,
        "slug": name.to_lowercase().replace(' ', "-"),
        "description": null,
        "category": "Pantry",
        "price": format!("{}.{:02}", cents / 100, cents % 100),
        "compare_at_price": null,
        "stock": stock,
        "unit": null,
        "image_url": null,
        "active": true,
        "featured": false,
        "created_at": "2026-03-01T10:00:00Z",
        "updated_at": null
    })
}

/// An empty session backed by memory.
pub(crate) fn session() -> Session {
    Session::new(None, Arc::new(MemoryStore::default()), None)
}

/// A signed-in customer whose token is good for another hour.
pub(crate) fn customer() -> CurrentCustomer {
    CurrentCustomer {
        id: UserId::new(CUSTOMER_ID),
        email: "ada@example.org".to_string(),
        name: Some("Ada".to_string()),
        access_token: "customer-jwt".to_string(),
        refresh_token: "customer-refresh".to_string(),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

/// Ids from a PostgREST `in.(1,2,3)` filter.
fn id_filter(params: &HashMap<String, String>, column: &str) -> Option<Vec<i64>> {
    let list = params.get(column)?.strip_prefix("in.(")?.strip_suffix(')')?;
    Some(list.split(',').filter_map(|id| id.parse().ok()).collect())
}

fn eq_filter(params: &HashMap<String, String>, column: &str) -> Option<i64> {
    params.get(column)?.strip_prefix("eq.")?.parse().ok()
}

async fn products(
    State(data): State<Arc<Mutex<BackendData>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<Value>> {
    let data = data.lock().unwrap();
    let ids = id_filter(&params, "id");
    let rows = data
        .products
        .iter()
        .filter(|row| {
            ids.as_ref()
                .is_none_or(|ids| ids.contains(&row["id"].as_i64().unwrap_or_default()))
        })
        .map(|row| match params.get("select").map(String::as_str) {
            Some("id,stock,active") => {
                json!({ "id": row["id"], "stock": row["stock"], "active": row["active"] })
            }
            _ => row.clone(),
        })
        .collect();
    Json(rows)
}

fn cart_row(position: usize, product_id: i64, quantity: u32) -> Value {
    json!({
        "id": position + 1,
        "user_id": CUSTOMER_ID,
        "product_id": product_id,
        "quantity": quantity,
        "created_at": "2026-03-01T10:00:00Z"
    })
}

fn cart_rows(data: &BackendData) -> Vec<Value> {
    data.saved_cart
        .iter()
        .enumerate()
        .map(|(i, (id, qty))| cart_row(i, *id, *qty))
        .collect()
}

async fn cart_items(State(data): State<Arc<Mutex<BackendData>>>) -> Json<Vec<Value>> {
    Json(cart_rows(&data.lock().unwrap()))
}

/// Both `upsert_cart_item` (one object) and `replace_cart` (an array).
async fn save_cart_items(
    State(data): State<Arc<Mutex<BackendData>>>,
    Json(body): Json<Value>,
) -> Json<Vec<Value>> {
    let mut data = data.lock().unwrap();
    let rows = match body {
        Value::Array(rows) => rows,
        row => vec![row],
    };
    for row in &rows {
        let product_id = row["product_id"].as_i64().unwrap();
        let quantity = u32::try_from(row["quantity"].as_u64().unwrap()).unwrap();
        match data.saved_cart.iter_mut().find(|(id, _)| *id == product_id) {
            Some(line) => line.1 = quantity,
            None => data.saved_cart.push((product_id, quantity)),
        }
    }
    Json(cart_rows(&data))
}

async fn delete_cart_items(
    State(data): State<Arc<Mutex<BackendData>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut data = data.lock().unwrap();
    if data.fail_cart_delete {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "upstream unavailable" })),
        )
            .into_response();
    }
    match eq_filter(&params, "product_id") {
        Some(product_id) => data.saved_cart.retain(|(id, _)| *id != product_id),
        None => data.saved_cart.clear(),
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn place_order(
    State(data): State<Arc<Mutex<BackendData>>>,
    Json(body): Json<Value>,
) -> Json<i64> {
    data.lock().unwrap().orders.push(body);
    Json(ORDER_ID)
}

async fn token(State(data): State<Arc<Mutex<BackendData>>>) -> Response {
    match data.lock().unwrap().token_status {
        Some(status) if status == StatusCode::BAD_REQUEST => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid Refresh Token: Already Used"
            })),
        )
            .into_response(),
        Some(status) => (status, Json(json!({ "message": "auth unavailable" }))).into_response(),
        None => Json(json!({
            "access_token": "fresh-jwt",
            "refresh_token": "fresh-refresh",
            "expires_in": 3600,
            "user": { "id": CUSTOMER_ID, "email": "ada@example.org", "user_metadata": {} }
        }))
        .into_response(),
    }
}
