//! Optional background expiry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::NegotiationService;
use crate::services::{CheckoutHandoff, ListingCatalog, NotificationStore};
use offer_store::OfferStore;

/// Periodically expires overdue offers so reads show them as expired.
///
/// Runs until the handle is aborted. A failed pass is logged and retried
/// on the next tick.
pub fn spawn_expiry_sweeper<S, L, N, C>(
    service: Arc<NegotiationService<S, L, N, C>>,
    interval: Duration,
) -> JoinHandle<()>
where
    S: OfferStore + 'static,
    L: ListingCatalog + 'static,
    N: NotificationStore + 'static,
    C: CheckoutHandoff + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "expiry sweeper started");

        loop {
            ticker.tick().await;
            match service.expire_overdue().await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "expired overdue offers"),
                Err(err) => tracing::error!(error = %err, "expiry sweep failed"),
            }
        }
    })
}
