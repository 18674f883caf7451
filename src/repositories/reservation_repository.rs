use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, NotSet, QueryFilter, QueryOrder,
    Set,
};

use crate::entities::stock_reservation::{
    self, Entity as StockReservation, Model as StockReservationModel, ReservationStatus,
};
use crate::errors::ServiceError;

/// All journal records for a holder in the given status, oldest first.
/// Served by the `(holder_ref, status)` index.
pub async fn find_active_by_holder<C: ConnectionTrait>(
    conn: &C,
    holder_ref: &str,
    status: ReservationStatus,
) -> Result<Vec<StockReservationModel>, ServiceError> {
    Ok(StockReservation::find()
        .filter(stock_reservation::Column::HolderRef.eq(holder_ref))
        .filter(stock_reservation::Column::Status.eq(status.as_str()))
        .order_by_asc(stock_reservation::Column::Id)
        .all(conn)
        .await?)
}

/// Journal records in the given status whose expiry has passed.
/// Served by the `(status, expires_at)` index.
pub async fn find_expired<C: ConnectionTrait>(
    conn: &C,
    status: ReservationStatus,
    as_of: DateTime<Utc>,
) -> Result<Vec<StockReservationModel>, ServiceError> {
    Ok(StockReservation::find()
        .filter(stock_reservation::Column::Status.eq(status.as_str()))
        .filter(stock_reservation::Column::ExpiresAt.lt(as_of))
        .order_by_asc(stock_reservation::Column::Id)
        .all(conn)
        .await?)
}

/// The single journal record for a (holder, SKU, status) triple, if any.
pub async fn find_by_holder_and_sku_and_status<C: ConnectionTrait>(
    conn: &C,
    holder_ref: &str,
    sku: &str,
    status: ReservationStatus,
) -> Result<Option<StockReservationModel>, ServiceError> {
    Ok(StockReservation::find()
        .filter(stock_reservation::Column::HolderRef.eq(holder_ref))
        .filter(stock_reservation::Column::Sku.eq(sku))
        .filter(stock_reservation::Column::Status.eq(status.as_str()))
        .one(conn)
        .await?)
}

/// Re-reads a journal record by id. Used to confirm a record is still in
/// the expected status once the row lock for its SKU is held.
pub async fn find_by_id<C: ConnectionTrait>(
    conn: &C,
    id: i64,
) -> Result<Option<StockReservationModel>, ServiceError> {
    Ok(StockReservation::find_by_id(id).one(conn).await?)
}

/// Appends a new journal record.
pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    holder_ref: &str,
    sku: &str,
    quantity: i32,
    status: ReservationStatus,
    expires_at: Option<DateTime<Utc>>,
) -> Result<StockReservationModel, ServiceError> {
    let active = stock_reservation::ActiveModel {
        id: NotSet,
        holder_ref: Set(holder_ref.to_string()),
        sku: Set(sku.to_string()),
        quantity: Set(quantity),
        status: Set(status.as_str().to_string()),
        expires_at: Set(expires_at),
        created_at: NotSet,
        updated_at: NotSet,
    };

    Ok(active.insert(conn).await?)
}

/// Transitions a journal record to a new status.
pub async fn set_status<C: ConnectionTrait>(
    conn: &C,
    record: StockReservationModel,
    status: ReservationStatus,
) -> Result<StockReservationModel, ServiceError> {
    let mut active: stock_reservation::ActiveModel = record.into();
    active.status = Set(status.as_str().to_string());

    Ok(active.update(conn).await?)
}

/// Updates a cart record's running quantity and refreshes its expiry.
/// Flips the record to the given terminal status when quantity reaches zero.
pub async fn update_quantity<C: ConnectionTrait>(
    conn: &C,
    record: StockReservationModel,
    quantity: i32,
    status: ReservationStatus,
    expires_at: Option<DateTime<Utc>>,
) -> Result<StockReservationModel, ServiceError> {
    let mut active: stock_reservation::ActiveModel = record.into();
    active.quantity = Set(quantity);
    active.status = Set(status.as_str().to_string());
    if let Some(expiry) = expires_at {
        active.expires_at = Set(Some(expiry));
    }

    Ok(active.update(conn).await?)
}
