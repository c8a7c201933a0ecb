//! Periodic sweep closing expired doppelganger windows

use dg_detection::DoppelgangerApi;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Run `sweep()` every `interval` until `shutdown` flips.
///
/// A failed pass is logged and retried on the next tick.
pub async fn run_sweeper(
    api: Arc<dyn DoppelgangerApi>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match api.sweep().await {
                    Ok(report) => debug!(
                        epoch = report.epoch,
                        cleared = report.cleared.len(),
                        still_active = report.still_active,
                        "sweep pass finished"
                    ),
                    Err(e) => warn!(error = %e, "sweep pass failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("[sweeper] Shutdown signal received");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dg_detection::{CheckDecision, DetectionResult, SweepReport, ValidatorGroup};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingApi {
        sweeps: AtomicUsize,
    }

    #[async_trait]
    impl DoppelgangerApi for CountingApi {
        async fn evaluate_group(&self, _group: &ValidatorGroup) -> DetectionResult<CheckDecision> {
            unreachable!("sweeper never evaluates")
        }

        async fn sweep(&self) -> DetectionResult<SweepReport> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Ok(SweepReport::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_on_every_tick_until_shutdown() {
        let api = Arc::new(CountingApi::default());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_sweeper(
            api.clone() as Arc<dyn DoppelgangerApi>,
            Duration::from_secs(60),
            rx,
        ));

        // first tick fires immediately, then one per interval
        tokio::time::sleep(Duration::from_secs(125)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(api.sweeps.load(Ordering::SeqCst), 3);
    }
}
