use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::entities::inventory_item::{self, Entity as InventoryItem, Model as InventoryItemModel};
use crate::errors::ServiceError;

/// Fetches the ledger row for a SKU with an exclusive row lock.
///
/// On Postgres this issues `SELECT ... FOR UPDATE`, blocking competing
/// locking readers and writers of the same SKU until the surrounding
/// transaction completes. SQLite has no row locks; there the per-SKU mutex
/// held by the service provides the same serialization, so the lock clause
/// is skipped (it is not valid SQLite syntax).
pub async fn lock_by_sku<C: ConnectionTrait>(
    conn: &C,
    sku: &str,
) -> Result<Option<InventoryItemModel>, ServiceError> {
    let mut query = InventoryItem::find().filter(inventory_item::Column::Sku.eq(sku));
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }

    Ok(query.one(conn).await?)
}

/// Fetches the ledger row for a SKU without any lock. Used by the
/// read-only availability path, which must not block writers.
pub async fn find_by_sku<C: ConnectionTrait>(
    conn: &C,
    sku: &str,
) -> Result<Option<InventoryItemModel>, ServiceError> {
    Ok(InventoryItem::find()
        .filter(inventory_item::Column::Sku.eq(sku))
        .one(conn)
        .await?)
}

/// Full ledger scan ordered by SKU. Read-only.
pub async fn find_all<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<InventoryItemModel>, ServiceError> {
    Ok(InventoryItem::find()
        .order_by_asc(inventory_item::Column::Sku)
        .all(conn)
        .await?)
}

/// Paginated ledger listing.
pub async fn find_page<C: ConnectionTrait>(
    conn: &C,
    page: u64,
    limit: u64,
) -> Result<(Vec<InventoryItemModel>, u64), ServiceError> {
    let paginator = InventoryItem::find()
        .order_by_asc(inventory_item::Column::Sku)
        .paginate(conn, limit);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page.saturating_sub(1)).await?;

    Ok((items, total))
}

/// Applies a delta to a locked ledger row's total quantity, optionally
/// updating the reorder threshold. Fails with `InvalidAdjustment` if the
/// resulting total would fall below the currently reserved quantity.
pub async fn apply_total_delta<C: ConnectionTrait>(
    conn: &C,
    item: InventoryItemModel,
    quantity_delta: i32,
    reorder_threshold: Option<i32>,
    product_name: Option<&str>,
) -> Result<InventoryItemModel, ServiceError> {
    let new_total = item
        .total_quantity
        .checked_add(quantity_delta)
        .ok_or_else(|| {
            ServiceError::InvalidAdjustment(format!(
                "total quantity for {} overflows",
                item.sku
            ))
        })?;
    if new_total < item.reserved_quantity {
        return Err(ServiceError::InvalidAdjustment(format!(
            "total quantity for {} cannot go below reserved quantity ({} < {})",
            item.sku, new_total, item.reserved_quantity
        )));
    }

    let mut active: inventory_item::ActiveModel = item.into();
    active.total_quantity = Set(new_total);
    if let Some(threshold) = reorder_threshold.filter(|t| *t >= 0) {
        active.reorder_threshold = Set(threshold);
    }
    if let Some(name) = product_name {
        active.product_name = Set(name.to_string());
    }

    Ok(active.update(conn).await?)
}

/// Creates the ledger row for a SKU on first stock upsert, applying the
/// delta to a zero base. The invariant check still applies: a negative
/// first delta is rejected.
pub async fn create<C: ConnectionTrait>(
    conn: &C,
    sku: &str,
    product_name: &str,
    quantity_delta: i32,
    reorder_threshold: Option<i32>,
) -> Result<InventoryItemModel, ServiceError> {
    if quantity_delta < 0 {
        return Err(ServiceError::InvalidAdjustment(format!(
            "total quantity for {} cannot go below reserved quantity ({} < 0)",
            sku, quantity_delta
        )));
    }

    let active = inventory_item::ActiveModel {
        id: NotSet,
        sku: Set(sku.to_string()),
        product_name: Set(product_name.to_string()),
        total_quantity: Set(quantity_delta),
        reserved_quantity: Set(0),
        reorder_threshold: Set(reorder_threshold.filter(|t| *t >= 0).unwrap_or(20)),
        created_at: NotSet,
        updated_at: NotSet,
    };

    Ok(active.insert(conn).await?)
}

/// Writes new reserved/total quantities for a locked ledger row.
pub async fn save_quantities<C: ConnectionTrait>(
    conn: &C,
    item: InventoryItemModel,
    total_quantity: i32,
    reserved_quantity: i32,
) -> Result<InventoryItemModel, ServiceError> {
    debug_assert!(reserved_quantity >= 0 && reserved_quantity <= total_quantity);

    let mut active: inventory_item::ActiveModel = item.into();
    active.total_quantity = Set(total_quantity);
    active.reserved_quantity = Set(reserved_quantity);

    Ok(active.update(conn).await?)
}
