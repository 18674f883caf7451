//! Reservation journal record: one row per (holder, SKU) hold.
//!
//! Order holds are created in batches per checkout attempt and carry a short
//! expiry; cart holds are cumulative per user and carry a long expiry that is
//! refreshed on every touch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Short-lived order hold awaiting commit or release.
    Reserved,
    /// Hold converted into a permanent deduction from total stock.
    Committed,
    /// Hold returned to the available pool.
    Released,
    /// Hold reclaimed by the expiry sweep.
    Expired,
    /// Long-lived cumulative per-user cart hold.
    CartReserved,
    /// Cart hold whose quantity has drained to zero.
    CartReleased,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "reserved",
            ReservationStatus::Committed => "committed",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
            ReservationStatus::CartReserved => "cart_reserved",
            ReservationStatus::CartReleased => "cart_released",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reserved" => Some(ReservationStatus::Reserved),
            "committed" => Some(ReservationStatus::Committed),
            "released" => Some(ReservationStatus::Released),
            "expired" => Some(ReservationStatus::Expired),
            "cart_reserved" => Some(ReservationStatus::CartReserved),
            "cart_released" => Some(ReservationStatus::CartReleased),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_reservations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Order reference, or `CART:<user_email>` for cart holds.
    pub holder_ref: String,
    pub sku: String,
    pub quantity: i32,
    pub status: String, // stored as string, converted through ReservationStatus
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(Some(now));

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ReservationStatus::Reserved,
            ReservationStatus::Committed,
            ReservationStatus::Released,
            ReservationStatus::Expired,
            ReservationStatus::CartReserved,
            ReservationStatus::CartReleased,
        ] {
            assert_eq!(ReservationStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::from_str("pending"), None);
    }
}
