//! HTTP surface of the reservation engine.
//!
//! Thin request/response plumbing: validation happens here, every business
//! decision happens in the reservation service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::entities::inventory_item;
use crate::errors::ServiceError;
use crate::services::reservation::{
    AdjustInventoryInput, LowStockItem, ReservationLine, UpsertInventoryInput,
};
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReserveStockRequest {
    #[validate(length(min = 1))]
    pub order_ref: String,
    #[validate(length(min = 1))]
    pub items: Vec<ReservationLine>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReserveParams {
    /// Hold lifetime in minutes; defaults to the configured order hold.
    pub hold_minutes: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReserveStockResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CartReservationRequest {
    #[validate(length(min = 1))]
    pub user_email: String,
    #[validate(length(min = 1))]
    pub sku: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustInventoryRequest {
    #[validate(length(min = 1))]
    pub sku: String,
    pub quantity_delta: i32,
    #[validate(length(min = 1))]
    pub reason: String,
    pub reorder_threshold: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpsertInventoryRequest {
    #[validate(length(min = 1))]
    pub sku: String,
    #[validate(length(min = 1))]
    pub product_name: String,
    pub quantity_delta: i32,
    pub reorder_threshold: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AvailabilityParams {
    /// Comma-separated list of SKUs.
    pub skus: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryItemResponse {
    pub sku: String,
    pub product_name: String,
    pub total_quantity: i32,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
    pub reorder_threshold: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<inventory_item::Model> for InventoryItemResponse {
    fn from(model: inventory_item::Model) -> Self {
        Self {
            available_quantity: model.available_quantity(),
            sku: model.sku,
            product_name: model.product_name,
            total_quantity: model.total_quantity,
            reserved_quantity: model.reserved_quantity,
            reorder_threshold: model.reorder_threshold,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemListResponse {
    pub items: Vec<InventoryItemResponse>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

/// Create the inventory router
pub fn inventory_router() -> Router<AppState> {
    Router::new()
        .route("/reserve", post(reserve))
        .route("/commit/:order_ref", post(commit))
        .route("/release/:order_ref", post(release))
        .route("/items", get(list_items))
        .route("/availability", get(availability))
        .route("/cart/reserve", post(reserve_for_cart))
        .route("/cart/release", post(release_for_cart))
        .route("/admin/low-stock", get(low_stock))
        .route("/admin/adjust", post(adjust_inventory))
        .route("/admin/upsert", post(upsert_inventory))
}

/// Place short-lived holds for an order, all-or-nothing across the batch
#[utoipa::path(
    post,
    path = "/inventory/reserve",
    params(ReserveParams),
    request_body = ReserveStockRequest,
    responses(
        (status = 200, description = "Batch reserved", body = ReserveStockResponse),
        (status = 404, description = "Unknown SKU", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn reserve(
    State(state): State<AppState>,
    Query(params): Query<ReserveParams>,
    Json(payload): Json<ReserveStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    state
        .reservation_service
        .reserve(&payload.order_ref, &payload.items, params.hold_minutes)
        .await?;

    Ok(Json(ReserveStockResponse {
        status: "reserved".to_string(),
    }))
}

/// Turn an order's holds into permanent stock deductions (idempotent)
#[utoipa::path(
    post,
    path = "/inventory/commit/{order_ref}",
    responses((status = 204, description = "Holds committed")),
    tag = "inventory"
)]
pub async fn commit(
    State(state): State<AppState>,
    Path(order_ref): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    state.reservation_service.commit(&order_ref).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Return an order's holds to the available pool (idempotent)
#[utoipa::path(
    post,
    path = "/inventory/release/{order_ref}",
    responses((status = 204, description = "Holds released")),
    tag = "inventory"
)]
pub async fn release(
    State(state): State<AppState>,
    Path(order_ref): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    state.reservation_service.release(&order_ref).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List ledger entries with pagination
#[utoipa::path(
    get,
    path = "/inventory/items",
    params(ListParams),
    responses((status = 200, description = "Ledger page", body = ItemListResponse)),
    tag = "inventory"
)]
pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .reservation_service
        .list_items(params.page, params.limit)
        .await?;

    Ok(Json(ItemListResponse {
        items: items.into_iter().map(InventoryItemResponse::from).collect(),
        total,
        page: params.page,
        limit: params.limit,
    }))
}

/// Available quantity per SKU; unknown SKUs report zero
#[utoipa::path(
    get,
    path = "/inventory/availability",
    params(AvailabilityParams),
    responses((status = 200, description = "Availability map")),
    tag = "inventory"
)]
pub async fn availability(
    State(state): State<AppState>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<HashMap<String, i32>>, ServiceError> {
    let skus: Vec<String> = params
        .skus
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if skus.is_empty() {
        return Err(ServiceError::ValidationError(
            "skus must contain at least one SKU".to_string(),
        ));
    }

    let result = state.reservation_service.availability(&skus).await?;
    Ok(Json(result))
}

/// Add to the caller's cumulative cart hold for a SKU
#[utoipa::path(
    post,
    path = "/inventory/cart/reserve",
    request_body = CartReservationRequest,
    responses(
        (status = 204, description = "Cart hold updated"),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn reserve_for_cart(
    State(state): State<AppState>,
    Json(payload): Json<CartReservationRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    state
        .reservation_service
        .reserve_for_cart(&payload.user_email, &payload.sku, payload.quantity)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Shrink the caller's cart hold for a SKU (clamped to what is held)
#[utoipa::path(
    post,
    path = "/inventory/cart/release",
    request_body = CartReservationRequest,
    responses((status = 204, description = "Cart hold released")),
    tag = "inventory"
)]
pub async fn release_for_cart(
    State(state): State<AppState>,
    Json(payload): Json<CartReservationRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    state
        .reservation_service
        .release_for_cart(&payload.user_email, &payload.sku, payload.quantity)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// SKUs whose available quantity has fallen to the reorder threshold
#[utoipa::path(
    get,
    path = "/inventory/admin/low-stock",
    responses((status = 200, description = "Low-stock report", body = [LowStockItem])),
    tag = "inventory"
)]
pub async fn low_stock(
    State(state): State<AppState>,
) -> Result<Json<Vec<LowStockItem>>, ServiceError> {
    let report = state.reservation_service.low_stock().await?;
    Ok(Json(report))
}

/// Administrative correction to an existing SKU's total quantity
#[utoipa::path(
    post,
    path = "/inventory/admin/adjust",
    request_body = AdjustInventoryRequest,
    responses(
        (status = 200, description = "Ledger entry updated", body = InventoryItemResponse),
        (status = 422, description = "Adjustment would drop total below reserved", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn adjust_inventory(
    State(state): State<AppState>,
    Json(payload): Json<AdjustInventoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    let updated = state
        .reservation_service
        .adjust_inventory(AdjustInventoryInput {
            sku: payload.sku,
            quantity_delta: payload.quantity_delta,
            reason: payload.reason,
            reorder_threshold: payload.reorder_threshold,
        })
        .await?;

    Ok(Json(InventoryItemResponse::from(updated)))
}

/// Create or top up a ledger entry for a SKU
#[utoipa::path(
    post,
    path = "/inventory/admin/upsert",
    request_body = UpsertInventoryRequest,
    responses(
        (status = 200, description = "Ledger entry upserted", body = InventoryItemResponse),
        (status = 422, description = "Adjustment would drop total below reserved", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn upsert_inventory(
    State(state): State<AppState>,
    Json(payload): Json<UpsertInventoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    let updated = state
        .reservation_service
        .upsert_inventory(UpsertInventoryInput {
            sku: payload.sku,
            product_name: payload.product_name,
            quantity_delta: payload.quantity_delta,
            reorder_threshold: payload.reorder_threshold,
        })
        .await?;

    Ok(Json(InventoryItemResponse::from(updated)))
}
