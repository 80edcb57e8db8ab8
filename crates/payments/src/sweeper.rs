//! Background expiry of stale payment intents.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use event_store::EventStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::coordinator::PaymentCoordinator;

/// Spawns a task that calls `expire_stale_intents` every `every`.
///
/// Aborting the returned handle stops the sweeper; nothing depends on it
/// for correctness.
pub fn spawn_expiry_sweeper<S>(
    coordinator: Arc<PaymentCoordinator<S>>,
    every: Duration,
) -> JoinHandle<()>
where
    S: EventStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match coordinator.expire_stale_intents(Utc::now()).await {
                Ok(expired) if !expired.is_empty() => {
                    tracing::info!(count = expired.len(), "expired stale payment intents");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "payment intent sweep failed"),
            }
        }
    })
}
