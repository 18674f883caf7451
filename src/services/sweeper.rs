//! Background expiry sweeper.
//!
//! The reservation service already sweeps opportunistically on every
//! reserve call; this worker bounds staleness for idle periods by running
//! the same reclamation on a fixed interval. Both paths serialize through
//! the per-SKU locks, so they are safe to run concurrently.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use super::reservation::ReservationService;

/// Spawns the periodic expiry sweep. The handle is returned so callers can
/// abort the worker on shutdown.
pub fn start_worker(
    service: ReservationService,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    info!(interval_secs, "Starting reservation expiry sweeper");

    tokio::spawn(async move {
        loop {
            match service.release_expired().await {
                Ok(0) => {}
                Ok(reclaimed) => info!(reclaimed, "Expiry sweep reclaimed holds"),
                Err(e) => error!("Expiry sweep error: {}", e),
            }
            sleep(Duration::from_secs(interval_secs)).await;
        }
    })
}
