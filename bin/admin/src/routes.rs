use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use satshop_core::AppError;
use satshop_shop::{Catalog, ShopContext};
use satshop_storage::Ledger;
use satshop_storage::models::NewProduct;
use serde::{Deserialize, Serialize};

pub const TOKEN_HEADER: &str = "x-admin-token";

/// Shared application state.
pub struct AppState {
    ledger: Arc<dyn Ledger>,
    catalog: Catalog,
    token: String,
}

impl AppState {
    pub fn new(shop: &ShopContext, token: String) -> Self {
        Self {
            ledger: shop.ledger().clone(),
            catalog: shop.catalog(),
            token,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id/stock", get(product_stock))
        .route("/api/v1/products/:id/codes", post(add_codes))
        .route("/api/v1/users/:id", get(get_user))
        .route("/api/v1/users/:id/purchases", get(get_purchases))
        .route("/api/v1/deposits/pending", get(pending_deposits))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(api)
        .route("/health", get(health))
        .with_state(state)
}

// ─── Auth ───────────────────────────────────────────────────────────────────

async fn require_token(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| token == state.token);

    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return json_err(StatusCode::UNAUTHORIZED, "Missing or invalid admin token").into_response();
    }
    next.run(request).await
}

// ─── Query Params ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PaginationParams {
    limit: Option<i64>,
}

// ─── Request / Response Types ───────────────────────────────────────────────

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
struct AddCodesRequest {
    codes: Vec<String>,
}

#[derive(Serialize)]
struct AddCodesResponse {
    product_id: i64,
    added: u64,
}

#[derive(Serialize)]
struct StockResponse {
    product_id: i64,
    name: String,
    available: usize,
}

type ApiError = (StatusCode, Json<ApiResponse<String>>);

fn json_ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

fn json_err(status: StatusCode, msg: &str) -> ApiError {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: msg.to_string(),
        }),
    )
}

fn app_err(e: AppError) -> ApiError {
    let status = match &e {
        AppError::UnknownProduct(_) | AppError::UnknownUser(_) => StatusCode::NOT_FOUND,
        AppError::InvalidInput(_) | AppError::InvalidUserId(_) => StatusCode::BAD_REQUEST,
        e if e.is_domain() => StatusCode::CONFLICT,
        _ => {
            tracing::error!(error = %e, "Admin request failed");
            return json_err(StatusCode::INTERNAL_SERVER_ERROR, &e.user_message());
        }
    };
    json_err(status, &e.user_message())
}

fn limit(params: &PaginationParams) -> i64 {
    params.limit.unwrap_or(50).clamp(1, 500)
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

/// GET /api/v1/products
async fn list_products(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let products = state.catalog.products().await.map_err(app_err)?;
    Ok(json_ok(products))
}

/// POST /api/v1/products
async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(product): Json<NewProduct>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.catalog.add_product(product).await.map_err(app_err)?;
    Ok((StatusCode::CREATED, json_ok(created)))
}

/// GET /api/v1/products/:id/stock
async fn product_stock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let stock = state.catalog.stock(id).await.map_err(app_err)?;
    Ok(json_ok(StockResponse {
        product_id: stock.product.id,
        name: stock.product.name,
        available: stock.available,
    }))
}

/// POST /api/v1/products/:id/codes
async fn add_codes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<AddCodesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let added = state.catalog.add_codes(id, body.codes).await.map_err(app_err)?;
    Ok(json_ok(AddCodesResponse {
        product_id: id,
        added,
    }))
}

/// GET /api/v1/users/:id
async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.ledger.get_user(id).await.map_err(app_err)?;
    match user {
        Some(u) => Ok(json_ok(u)),
        None => Err(app_err(AppError::UnknownUser(id))),
    }
}

/// GET /api/v1/users/:id/purchases
async fn get_purchases(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let purchases = state
        .ledger
        .purchases(id, limit(&params))
        .await
        .map_err(app_err)?;
    Ok(json_ok(purchases))
}

/// GET /api/v1/deposits/pending
async fn pending_deposits(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let deposits = state.ledger.pending_deposits().await.map_err(app_err)?;
    Ok(json_ok(deposits))
}
