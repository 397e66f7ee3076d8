use crate::application::registry::JobRegistry;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically removes terminal jobs that finished more than `retention` ago.
pub fn spawn(
    registry: JobRegistry,
    retention: Duration,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        info!(
            retention_secs = retention.as_secs(),
            every_secs = every.as_secs(),
            "Job pruner started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = prune_once(&registry, retention);
                    if removed > 0 {
                        info!(removed, remaining = registry.len(), "Pruned finished jobs");
                    } else {
                        debug!("Nothing to prune");
                    }
                }
            }
        }
        info!("Job pruner stopped");
    })
}

pub fn prune_once(registry: &JobRegistry, retention: Duration) -> usize {
    let Ok(retention) = chrono::Duration::from_std(retention) else {
        return 0;
    };
    match Utc::now().checked_sub_signed(retention) {
        Some(cutoff) => registry.prune_finished_before(cutoff),
        None => 0,
    }
}
