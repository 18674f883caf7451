//! Stockhold: an inventory reservation engine.
//!
//! Tracks how many units of each SKU exist, how many are provisionally held
//! by in-flight carts and orders, and enforces that the sum of holds never
//! exceeds physical stock under concurrent access. Surrounding concerns
//! (users, catalog, orders, payments) live in other services that call into
//! this one.

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use sea_orm::DatabaseConnection;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub reservation_service: services::reservation::ReservationService,
}

/// Assembles the HTTP router over the shared state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_spec))
        .nest("/inventory", handlers::inventory::inventory_router())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Machine-readable API description.
async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    Json(openapi::ApiDoc::openapi())
}

/// Liveness probe with a database ping.
async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, errors::ServiceError> {
    state.db.ping().await?;
    Ok(Json(json!({ "status": "ok", "database": "up" })))
}
