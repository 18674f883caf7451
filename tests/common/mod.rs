use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use stockhold_api::{
    clock::ManualClock,
    config::AppConfig,
    db,
    events::{self, EventSender},
    services::reservation::{ReservationService, ReservationSettings, UpsertInventoryInput},
    AppState,
};

/// Test harness backed by a file-based SQLite database with a single
/// pooled connection, so transactions from concurrent tasks serialize the
/// same way the per-SKU locks expect.
pub struct TestApp {
    pub state: AppState,
    pub service: ReservationService,
    pub clock: Arc<ManualClock>,
    _tmp: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let tmp = TempDir::new().expect("failed to create tempdir");
        let db_url = format!(
            "sqlite://{}?mode=rwc",
            tmp.path().join("stockhold_test.db").display()
        );

        let db_cfg = db::DbConfig {
            url: db_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("failed to connect to test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = ReservationService::with_clock(
            db.clone(),
            event_sender.clone(),
            ReservationSettings::default(),
            clock.clone(),
        );

        let state = AppState {
            db,
            config: test_config(&db_url),
            event_sender,
            reservation_service: service.clone(),
        };

        Self {
            state,
            service,
            clock,
            _tmp: tmp,
            _event_task: event_task,
        }
    }

    /// Full HTTP router over this app's state.
    #[allow(dead_code)]
    pub fn router(&self) -> axum::Router {
        stockhold_api::app(self.state.clone())
    }

    /// Seeds a ledger row through the service's own upsert path.
    #[allow(dead_code)]
    pub async fn seed_item(&self, sku: &str, product_name: &str, quantity: i32, threshold: i32) {
        self.service
            .upsert_inventory(UpsertInventoryInput {
                sku: sku.to_string(),
                product_name: product_name.to_string(),
                quantity_delta: quantity,
                reorder_threshold: Some(threshold),
            })
            .await
            .expect("failed to seed inventory item");
    }
}

fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".to_string(),
        port: 18_080,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        auto_migrate: true,
        db_max_connections: 1,
        db_min_connections: 1,
        order_hold_minutes: 15,
        cart_hold_hours: 24,
        sweep_enabled: false,
        sweep_interval_secs: 60,
        lock_wait_timeout_ms: 5_000,
    }
}
