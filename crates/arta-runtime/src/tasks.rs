use std::{sync::Arc, time::Duration};

use arta_admission::AdmissionController;
use arta_cache::{CacheTier, ResponseCache};
use arta_store::InteractionStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Periodically removes idle rate-limit window records. Never blocks the
/// dispatch path; the controller itself keeps sweeps single-flight.
pub fn spawn_sweep_task(
    admission: Arc<AdmissionController>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(100)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown_rx.wait_for(|requested| *requested) => return,
                _ = ticker.tick() => {
                    if let Err(error) = admission.sweep() {
                        tracing::error!(error = %error, "rate limit sweep failed");
                    }
                }
            }
        }
    })
}

/// Periodically logs aggregate limiter, cache, and store counters.
pub fn spawn_stats_task(
    admission: Arc<AdmissionController>,
    cache: Arc<ResponseCache>,
    store: Arc<InteractionStore>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(100)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown_rx.wait_for(|requested| *requested) => return,
                _ = ticker.tick() => log_periodic_stats(&admission, &cache, &store),
            }
        }
    })
}

fn log_periodic_stats(
    admission: &AdmissionController,
    cache: &ResponseCache,
    store: &InteractionStore,
) {
    match admission.global_stats() {
        Ok(stats) => tracing::info!(
            active_users = stats.active_users,
            total_requests = stats.total_requests,
            limited_users = stats.limited_users,
            "rate limiter stats"
        ),
        Err(error) => tracing::error!(error = %error, "rate limiter stats failed"),
    }
    for tier in CacheTier::ALL {
        match cache.stats(tier) {
            Ok(stats) => tracing::info!(
                tier = tier.as_str(),
                keys = stats.key_count,
                hits = stats.hits,
                misses = stats.misses,
                hit_rate = stats.hit_rate,
                "cache stats"
            ),
            Err(error) => {
                tracing::error!(tier = tier.as_str(), error = %error, "cache stats failed");
            }
        }
    }
    match store.stats() {
        Ok(stats) => tracing::info!(
            total = stats.total_requests,
            today = stats.today_requests,
            unique_users = stats.unique_users,
            "interaction store stats"
        ),
        Err(error) => tracing::error!(error = %error, "interaction store stats failed"),
    }
}

/// Daily-style purge of old interaction rows.
pub fn spawn_purge_task(
    store: Arc<InteractionStore>,
    retention_days: u64,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(100)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = async { let _ = shutdown_rx.wait_for(|requested| *requested).await; } => return,
                _ = ticker.tick() => {
                    let store = store.clone();
                    let joined = tokio::task::spawn_blocking(move || {
                        store.purge_older_than(retention_days)
                    })
                    .await;
                    match joined {
                        Ok(Ok(_removed)) => {}
                        Ok(Err(error)) => {
                            tracing::error!(error = %error, "interaction purge failed");
                        }
                        Err(error) => {
                            tracing::error!(error = %error, "interaction purge task panicked");
                        }
                    }
                }
            }
        }
    })
}
