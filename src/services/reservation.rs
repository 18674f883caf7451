//! Reservation Service
//!
//! The per-SKU state machine at the heart of the engine: reserve, commit,
//! release, expire, and adjust operations against the stock ledger and the
//! reservation journal, each executed as one atomic unit of work per SKU.
//!
//! Every mutating operation competing for the same SKU serializes through
//! the same per-SKU lock, acquired at the start of the unit of work and
//! held for its full duration. Read-only queries (`availability`,
//! `low_stock`, `list_items`) take no locks and may observe slightly stale
//! but never invalid state, because writers always leave the row satisfying
//! `0 <= reserved <= total` before releasing the lock.

use chrono::Duration;
use dashmap::DashMap;
use metrics::counter;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::entities::inventory_item::Model as InventoryItemModel;
use crate::entities::stock_reservation::ReservationStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{inventory_repository as ledger, reservation_repository as journal};

/// One line of a reservation batch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationLine {
    pub sku: String,
    pub quantity: i32,
}

/// Administrative stock correction for an existing SKU.
#[derive(Debug, Clone)]
pub struct AdjustInventoryInput {
    pub sku: String,
    pub quantity_delta: i32,
    pub reason: String,
    pub reorder_threshold: Option<i32>,
}

/// Stock upsert; creates the ledger row on first use for a SKU.
#[derive(Debug, Clone)]
pub struct UpsertInventoryInput {
    pub sku: String,
    pub product_name: String,
    pub quantity_delta: i32,
    pub reorder_threshold: Option<i32>,
}

/// Row of the low-stock report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LowStockItem {
    pub sku: String,
    pub product_name: String,
    pub available_quantity: i32,
    pub reorder_threshold: i32,
}

/// Tunables for hold lifetimes and lock waits, sourced from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ReservationSettings {
    /// Order-hold lifetime used when a reserve call supplies none.
    pub default_hold_minutes: i64,
    /// Cart-hold lifetime, refreshed on every cart touch.
    pub cart_hold_hours: i64,
    /// Bound on waiting for a per-SKU lock; exceeding it surfaces as a
    /// retryable failure.
    pub lock_wait_timeout: std::time::Duration,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            default_hold_minutes: 15,
            cart_hold_hours: 24,
            lock_wait_timeout: std::time::Duration::from_secs(5),
        }
    }
}

impl From<&AppConfig> for ReservationSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            default_hold_minutes: cfg.order_hold_minutes,
            cart_hold_hours: cfg.cart_hold_hours,
            lock_wait_timeout: std::time::Duration::from_millis(cfg.lock_wait_timeout_ms),
        }
    }
}

/// In-process mutex table keyed by SKU.
///
/// The ledger row is the single point of mutual exclusion per SKU. On
/// Postgres the row lock inside the transaction already serializes
/// cross-process competitors; this table extends the same guarantee to
/// backends without row locks and keeps lock waits bounded.
#[derive(Clone, Default)]
struct SkuLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SkuLocks {
    async fn acquire(
        &self,
        sku: &str,
        timeout: std::time::Duration,
    ) -> Result<tokio::sync::OwnedMutexGuard<()>, ServiceError> {
        let lock = self
            .locks
            .entry(sku.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                ServiceError::ServiceUnavailable(format!(
                    "timed out waiting for lock on SKU {}",
                    sku
                ))
            })
    }

    /// Acquires locks for several SKUs. Callers must pass the SKUs in
    /// sorted order so concurrent batches cannot deadlock.
    async fn acquire_many(
        &self,
        sorted_skus: &[&str],
        timeout: std::time::Duration,
    ) -> Result<Vec<tokio::sync::OwnedMutexGuard<()>>, ServiceError> {
        debug_assert!(sorted_skus.windows(2).all(|w| w[0] < w[1]));

        let mut guards = Vec::with_capacity(sorted_skus.len());
        for sku in sorted_skus {
            guards.push(self.acquire(sku, timeout).await?);
        }
        Ok(guards)
    }
}

/// Service orchestrating all reservation operations.
#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    clock: Arc<dyn Clock>,
    locks: SkuLocks,
    settings: ReservationSettings,
}

impl ReservationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        settings: ReservationSettings,
    ) -> Self {
        Self::with_clock(db, event_sender, settings, Arc::new(SystemClock))
    }

    /// Constructor taking an explicit clock, used by tests to simulate
    /// expiry deterministically.
    pub fn with_clock(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        settings: ReservationSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            event_sender,
            clock,
            locks: SkuLocks::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &ReservationSettings {
        &self.settings
    }

    /// Deterministic holder reference for a user's cart holds.
    pub fn cart_ref(user_email: &str) -> String {
        format!("CART:{}", user_email)
    }

    /// Places short-lived holds for every line of an order, all-or-nothing
    /// across the batch: every row is locked and validated before any is
    /// mutated, so a mid-batch shortfall leaves no partial holds behind.
    ///
    /// Expired holds are reclaimed first, as their own unit of work, so
    /// staleness stays bounded even without the background sweeper.
    #[instrument(skip(self, items))]
    pub async fn reserve(
        &self,
        order_ref: &str,
        items: &[ReservationLine],
        hold_minutes: Option<i64>,
    ) -> Result<(), ServiceError> {
        if order_ref.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "order_ref must not be blank".to_string(),
            ));
        }
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "reservation batch must contain at least one item".to_string(),
            ));
        }
        for line in items {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for {} must be at least 1",
                    line.sku
                )));
            }
        }

        let reclaimed = self.release_expired().await?;
        if reclaimed > 0 {
            info!(reclaimed, "Opportunistic sweep reclaimed expired holds");
        }

        // Coalesce duplicate SKUs so each row is locked exactly once per
        // batch; BTreeMap also yields the sorted lock-acquisition order.
        let mut wanted: BTreeMap<String, i32> = BTreeMap::new();
        for line in items {
            let entry = wanted.entry(line.sku.clone()).or_insert(0);
            *entry = entry.checked_add(line.quantity).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "combined quantity for {} overflows",
                    line.sku
                ))
            })?;
        }
        let skus: Vec<&str> = wanted.keys().map(String::as_str).collect();

        let hold = hold_minutes.unwrap_or(self.settings.default_hold_minutes);
        let _guards = self
            .locks
            .acquire_many(&skus, self.settings.lock_wait_timeout)
            .await?;

        let txn = self.db.begin().await?;
        let expires_at = self.clock.now() + Duration::minutes(hold);

        // Phase 1: lock and validate every line before mutating any.
        let mut locked = Vec::with_capacity(wanted.len());
        for (sku, quantity) in &wanted {
            let item = ledger::lock_by_sku(&txn, sku)
                .await?
                .ok_or_else(|| ServiceError::sku_not_found(sku))?;
            if item.available_quantity() < *quantity {
                // Dropping the transaction rolls the whole batch back.
                return Err(ServiceError::InsufficientStock(format!(
                    "Not enough stock for {}",
                    sku
                )));
            }
            locked.push((item, *quantity));
        }

        // Phase 2: apply the increments and journal the holds.
        let mut events = Vec::with_capacity(locked.len());
        for (item, quantity) in locked {
            let sku = item.sku.clone();
            let total = item.total_quantity;
            let reserved = item.reserved_quantity + quantity;
            ledger::save_quantities(&txn, item, total, reserved).await?;
            journal::insert(
                &txn,
                order_ref,
                &sku,
                quantity,
                ReservationStatus::Reserved,
                Some(expires_at),
            )
            .await?;
            events.push(Event::StockReserved {
                order_ref: order_ref.to_string(),
                sku,
                quantity,
                expires_at,
            });
        }

        txn.commit().await?;
        counter!("stockhold.holds_reserved", events.len() as u64);

        for event in events {
            self.event_sender.send_or_log(event).await;
        }
        info!(order_ref, lines = wanted.len(), "Reserved stock for order");

        Ok(())
    }

    /// Converts every open hold of the order into a permanent deduction
    /// from total stock. Idempotent: holds not in the reserved state are
    /// untouched, so repeated calls are safe no-ops.
    #[instrument(skip(self))]
    pub async fn commit(&self, order_ref: &str) -> Result<(), ServiceError> {
        let settled = self.settle_order(order_ref, true).await?;
        if settled > 0 {
            counter!("stockhold.holds_committed", settled);
            info!(order_ref, settled, "Committed order reservations");
        }
        Ok(())
    }

    /// Returns every open hold of the order to the available pool without
    /// touching total stock. Idempotent like [`Self::commit`].
    #[instrument(skip(self))]
    pub async fn release(&self, order_ref: &str) -> Result<(), ServiceError> {
        let settled = self.settle_order(order_ref, false).await?;
        if settled > 0 {
            counter!("stockhold.holds_released", settled);
            info!(order_ref, settled, "Released order reservations");
        }
        Ok(())
    }

    async fn settle_order(
        &self,
        order_ref: &str,
        consume_stock: bool,
    ) -> Result<u64, ServiceError> {
        let reservations =
            journal::find_active_by_holder(&*self.db, order_ref, ReservationStatus::Reserved)
                .await?;

        let mut settled = 0u64;
        for reservation in reservations {
            let _guard = self
                .locks
                .acquire(&reservation.sku, self.settings.lock_wait_timeout)
                .await?;
            let txn = self.db.begin().await?;

            // The record may have expired or been settled by a competitor
            // while we waited for the lock.
            let Some(current) = journal::find_by_id(&txn, reservation.id).await? else {
                continue;
            };
            if current.status != ReservationStatus::Reserved.as_str() {
                continue;
            }

            let item = ledger::lock_by_sku(&txn, &current.sku)
                .await?
                .ok_or_else(|| ServiceError::sku_not_found(&current.sku))?;

            let quantity = current.quantity;
            let new_reserved = item.reserved_quantity - quantity;
            if new_reserved < 0 {
                warn!(
                    sku = %current.sku,
                    holder_ref = %current.holder_ref,
                    reserved = item.reserved_quantity,
                    quantity,
                    "Reserved quantity would drop below zero; flooring"
                );
            }
            let new_reserved = new_reserved.max(0);
            let new_total = if consume_stock {
                (item.total_quantity - quantity).max(new_reserved)
            } else {
                item.total_quantity
            };

            let sku = current.sku.clone();
            ledger::save_quantities(&txn, item, new_total, new_reserved).await?;
            let terminal = if consume_stock {
                ReservationStatus::Committed
            } else {
                ReservationStatus::Released
            };
            journal::set_status(&txn, current, terminal).await?;
            txn.commit().await?;
            settled += 1;

            let event = if consume_stock {
                Event::ReservationCommitted {
                    order_ref: order_ref.to_string(),
                    sku,
                    quantity,
                }
            } else {
                Event::ReservationReleased {
                    order_ref: order_ref.to_string(),
                    sku,
                    quantity,
                }
            };
            self.event_sender.send_or_log(event).await;
        }

        Ok(settled)
    }

    /// Reclaims every order hold whose expiry has passed: ledger reserved
    /// quantity is decremented (floored at zero to tolerate drift) and the
    /// journal record flips to expired. Safe to run concurrently with
    /// reserve/commit/release on the same SKUs.
    #[instrument(skip(self))]
    pub async fn release_expired(&self) -> Result<u64, ServiceError> {
        let now = self.clock.now();
        let expired =
            journal::find_expired(&*self.db, ReservationStatus::Reserved, now).await?;

        let mut reclaimed = 0u64;
        for reservation in expired {
            let _guard = self
                .locks
                .acquire(&reservation.sku, self.settings.lock_wait_timeout)
                .await?;
            let txn = self.db.begin().await?;

            let Some(current) = journal::find_by_id(&txn, reservation.id).await? else {
                continue;
            };
            if current.status != ReservationStatus::Reserved.as_str() {
                continue;
            }

            // A missing ledger row is tolerated: the journal record still
            // flips so the hold cannot be reclaimed twice.
            match ledger::lock_by_sku(&txn, &current.sku).await? {
                Some(item) => {
                    let new_reserved = (item.reserved_quantity - current.quantity).max(0);
                    let total = item.total_quantity;
                    ledger::save_quantities(&txn, item, total, new_reserved).await?;
                }
                None => {
                    warn!(sku = %current.sku, "Expired hold references unknown SKU");
                }
            }

            let holder_ref = current.holder_ref.clone();
            let sku = current.sku.clone();
            let quantity = current.quantity;
            journal::set_status(&txn, current, ReservationStatus::Expired).await?;
            txn.commit().await?;
            reclaimed += 1;

            self.event_sender
                .send_or_log(Event::ReservationExpired {
                    holder_ref,
                    sku,
                    quantity,
                })
                .await;
        }

        if reclaimed > 0 {
            counter!("stockhold.holds_expired", reclaimed);
        }
        Ok(reclaimed)
    }

    /// Adds to the user's cumulative cart hold for a SKU and refreshes its
    /// expiry. Repeated increases grow the one existing record instead of
    /// creating new rows.
    #[instrument(skip(self))]
    pub async fn reserve_for_cart(
        &self,
        user_email: &str,
        sku: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let cart_ref = Self::cart_ref(user_email);
        let _guard = self
            .locks
            .acquire(sku, self.settings.lock_wait_timeout)
            .await?;
        let txn = self.db.begin().await?;

        let item = ledger::lock_by_sku(&txn, sku)
            .await?
            .ok_or_else(|| ServiceError::sku_not_found(sku))?;
        if item.available_quantity() < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Not enough stock for {}",
                sku
            )));
        }

        let total = item.total_quantity;
        let reserved = item.reserved_quantity + quantity;
        ledger::save_quantities(&txn, item, total, reserved).await?;

        let expires_at = self.clock.now() + Duration::hours(self.settings.cart_hold_hours);
        match journal::find_by_holder_and_sku_and_status(
            &txn,
            &cart_ref,
            sku,
            ReservationStatus::CartReserved,
        )
        .await?
        {
            Some(record) => {
                let new_quantity = record.quantity + quantity;
                journal::update_quantity(
                    &txn,
                    record,
                    new_quantity,
                    ReservationStatus::CartReserved,
                    Some(expires_at),
                )
                .await?;
            }
            None => {
                journal::insert(
                    &txn,
                    &cart_ref,
                    sku,
                    quantity,
                    ReservationStatus::CartReserved,
                    Some(expires_at),
                )
                .await?;
            }
        }

        txn.commit().await?;
        counter!("stockhold.cart_holds_reserved", 1);

        self.event_sender
            .send_or_log(Event::CartStockReserved {
                cart_ref,
                sku: sku.to_string(),
                quantity,
            })
            .await;

        Ok(())
    }

    /// Shrinks the user's cart hold for a SKU. The released amount is
    /// clamped to the record's current quantity so a caller's delta can
    /// never drive reserved stock below zero; the record flips to released
    /// when it drains.
    #[instrument(skip(self))]
    pub async fn release_for_cart(
        &self,
        user_email: &str,
        sku: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let cart_ref = Self::cart_ref(user_email);
        let _guard = self
            .locks
            .acquire(sku, self.settings.lock_wait_timeout)
            .await?;
        let txn = self.db.begin().await?;

        let item = ledger::lock_by_sku(&txn, sku)
            .await?
            .ok_or_else(|| ServiceError::sku_not_found(sku))?;

        let Some(record) = journal::find_by_holder_and_sku_and_status(
            &txn,
            &cart_ref,
            sku,
            ReservationStatus::CartReserved,
        )
        .await?
        else {
            // Nothing held for this (user, SKU); releasing is a no-op.
            return Ok(());
        };

        let release_quantity = quantity.min(record.quantity);
        if release_quantity <= 0 {
            return Ok(());
        }

        let total = item.total_quantity;
        let new_reserved = (item.reserved_quantity - release_quantity).max(0);
        ledger::save_quantities(&txn, item, total, new_reserved).await?;

        let remaining = record.quantity - release_quantity;
        let status = if remaining <= 0 {
            ReservationStatus::CartReleased
        } else {
            ReservationStatus::CartReserved
        };
        journal::update_quantity(&txn, record, remaining, status, None).await?;

        txn.commit().await?;
        counter!("stockhold.cart_holds_released", 1);

        self.event_sender
            .send_or_log(Event::CartStockReleased {
                cart_ref,
                sku: sku.to_string(),
                quantity: release_quantity,
            })
            .await;

        Ok(())
    }

    /// Available quantity per SKU. Read-only, takes no locks; unknown SKUs
    /// report zero rather than failing.
    #[instrument(skip(self))]
    pub async fn availability(
        &self,
        skus: &[String],
    ) -> Result<HashMap<String, i32>, ServiceError> {
        let mut result = HashMap::with_capacity(skus.len());
        for sku in skus {
            let available = ledger::find_by_sku(&*self.db, sku)
                .await?
                .map(|item| item.available_quantity())
                .unwrap_or(0);
            result.insert(sku.clone(), available.max(0));
        }
        Ok(result)
    }

    /// Administrative correction to an existing SKU's total quantity.
    #[instrument(skip(self))]
    pub async fn adjust_inventory(
        &self,
        input: AdjustInventoryInput,
    ) -> Result<InventoryItemModel, ServiceError> {
        let _guard = self
            .locks
            .acquire(&input.sku, self.settings.lock_wait_timeout)
            .await?;
        let txn = self.db.begin().await?;

        let item = ledger::lock_by_sku(&txn, &input.sku)
            .await?
            .ok_or_else(|| ServiceError::sku_not_found(&input.sku))?;
        let old_total = item.total_quantity;

        let updated = ledger::apply_total_delta(
            &txn,
            item,
            input.quantity_delta,
            input.reorder_threshold,
            None,
        )
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::InventoryAdjusted {
                sku: input.sku.clone(),
                old_total,
                new_total: updated.total_quantity,
                reason: input.reason.clone(),
            })
            .await;

        Ok(updated)
    }

    /// Creates the ledger row for a SKU on first use, or applies the delta
    /// and refreshes the product name for an existing one.
    #[instrument(skip(self))]
    pub async fn upsert_inventory(
        &self,
        input: UpsertInventoryInput,
    ) -> Result<InventoryItemModel, ServiceError> {
        let _guard = self
            .locks
            .acquire(&input.sku, self.settings.lock_wait_timeout)
            .await?;
        let txn = self.db.begin().await?;

        let (old_total, updated) = match ledger::lock_by_sku(&txn, &input.sku).await? {
            Some(item) => {
                let old_total = item.total_quantity;
                let updated = ledger::apply_total_delta(
                    &txn,
                    item,
                    input.quantity_delta,
                    input.reorder_threshold,
                    Some(&input.product_name),
                )
                .await?;
                (old_total, updated)
            }
            None => {
                let created = ledger::create(
                    &txn,
                    &input.sku,
                    &input.product_name,
                    input.quantity_delta,
                    input.reorder_threshold,
                )
                .await?;
                (0, created)
            }
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::InventoryAdjusted {
                sku: input.sku.clone(),
                old_total,
                new_total: updated.total_quantity,
                reason: "stock upsert".to_string(),
            })
            .await;

        Ok(updated)
    }

    /// Every SKU whose available quantity has fallen to its reorder
    /// threshold. Read-only scan.
    #[instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<LowStockItem>, ServiceError> {
        let items = ledger::find_all(&*self.db).await?;
        Ok(items
            .into_iter()
            .filter(InventoryItemModel::is_low_stock)
            .map(|item| LowStockItem {
                available_quantity: item.available_quantity(),
                sku: item.sku,
                product_name: item.product_name,
                reorder_threshold: item.reorder_threshold,
            })
            .collect())
    }

    /// Paginated ledger listing.
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<InventoryItemModel>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }
        if limit == 0 || limit > 1000 {
            return Err(ServiceError::ValidationError(
                "Limit must be between 1 and 1000".to_string(),
            ));
        }

        ledger::find_page(&*self.db, page, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_ref_is_deterministic_per_user() {
        assert_eq!(ReservationService::cart_ref("u@x.com"), "CART:u@x.com");
        assert_eq!(
            ReservationService::cart_ref("u@x.com"),
            ReservationService::cart_ref("u@x.com")
        );
    }

    #[test]
    fn settings_come_from_config() {
        let settings = ReservationSettings::default();
        assert_eq!(settings.default_hold_minutes, 15);
        assert_eq!(settings.cart_hold_hours, 24);
    }
}
