//! Data-access contracts for the stock ledger and the reservation journal.
//!
//! Functions here are generic over [`sea_orm::ConnectionTrait`] so the same
//! queries run against the pool for read-only paths and inside a transaction
//! for mutating paths. The journal never autonomously mutates the ledger;
//! reconciliation is the reservation service's job.

pub mod inventory_repository;
pub mod reservation_repository;
