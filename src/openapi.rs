use utoipa::OpenApi;

use crate::errors::ErrorResponse;
use crate::handlers::inventory::{
    AdjustInventoryRequest, CartReservationRequest, InventoryItemResponse, ItemListResponse,
    ReserveStockRequest, ReserveStockResponse, UpsertInventoryRequest,
};
use crate::services::reservation::{LowStockItem, ReservationLine};

/// OpenAPI document for the reservation engine's HTTP surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockhold API",
        version = "0.1.0",
        description = "Inventory reservation engine: per-SKU stock ledger with concurrent-safe holds, commits, releases, and expiry sweeps."
    ),
    paths(
        crate::handlers::inventory::reserve,
        crate::handlers::inventory::commit,
        crate::handlers::inventory::release,
        crate::handlers::inventory::list_items,
        crate::handlers::inventory::availability,
        crate::handlers::inventory::reserve_for_cart,
        crate::handlers::inventory::release_for_cart,
        crate::handlers::inventory::low_stock,
        crate::handlers::inventory::adjust_inventory,
        crate::handlers::inventory::upsert_inventory,
    ),
    components(schemas(
        ReserveStockRequest,
        ReserveStockResponse,
        ReservationLine,
        CartReservationRequest,
        AdjustInventoryRequest,
        UpsertInventoryRequest,
        InventoryItemResponse,
        ItemListResponse,
        LowStockItem,
        ErrorResponse,
    )),
    tags((name = "inventory", description = "Stock ledger and reservation operations"))
)]
pub struct ApiDoc;
