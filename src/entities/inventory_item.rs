//! Stock ledger entry: the durable record of total and reserved quantity
//! per SKU. Owns the arithmetic invariant `0 <= reserved <= total`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub sku: String,
    pub product_name: String,
    pub total_quantity: i32,
    pub reserved_quantity: i32,
    pub reorder_threshold: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Units not currently held by any reservation.
    pub fn available_quantity(&self) -> i32 {
        self.total_quantity - self.reserved_quantity
    }

    /// True when available stock has fallen to the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.available_quantity() <= self.reorder_threshold
    }
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
