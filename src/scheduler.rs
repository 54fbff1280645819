//! Timer-driven background jobs.
//!
//! Each job runs on its own task. Ticks of one job never overlap: the loop
//! awaits a tick before waiting for the next timer, and missed timer ticks are
//! skipped. Stopping waits for the tick in progress to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::{ErrorCode, Result};
use crate::ledger::Ledger;
use crate::util::deadline;
use crate::version_manager::VersionManager;

#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    async fn tick(&self) -> Result<()>;
}

pub struct PeriodicTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn(job: Arc<dyn PeriodicJob>, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let name = job.name();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(job = name, ?period, "periodic job started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = job.tick().await {
                            warn!(job = name, error = %e, "tick failed");
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
            info!(job = name, "periodic job stopped");
        });
        Self { name, shutdown, handle }
    }

    /// Signals the job to stop and waits for its current tick to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(job = self.name, error = %e, "periodic job ended abnormally");
        }
    }
}

/// Periodically hands the queue to the batch writer of the current protocol version.
pub struct BatchScheduler {
    versions: Arc<VersionManager>,
    ledger: Arc<dyn Ledger>,
    ledger_timeout: Duration,
    tick_lock: Mutex<()>,
}

impl BatchScheduler {
    pub fn new(versions: Arc<VersionManager>, ledger: Arc<dyn Ledger>, ledger_timeout: Duration) -> Self {
        Self { versions, ledger, ledger_timeout, tick_lock: Mutex::new(()) }
    }

    /// Writes one batch; returns the number of operations anchored.
    pub async fn write_batch(&self) -> Result<usize> {
        let _guard = self.tick_lock.lock().await;
        let time =
            deadline::within(self.ledger_timeout, ErrorCode::LedgerTimeout, self.ledger.approximate_time()).await?;
        let components = self.versions.components_for(time)?;
        components.batch_writer.write().await
    }
}

#[async_trait]
impl PeriodicJob for BatchScheduler {
    fn name(&self) -> &'static str {
        "batch_scheduler"
    }

    async fn tick(&self) -> Result<()> {
        self.write_batch().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowJob {
        running: AtomicUsize,
        max_running: AtomicUsize,
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl PeriodicJob for SlowJob {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn tick(&self) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn ticks_never_overlap_and_stop_waits() {
        let job = Arc::new(SlowJob {
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            ticks: AtomicUsize::new(0),
        });
        let task = PeriodicTask::spawn(job.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(120)).await;
        task.stop().await;

        assert_eq!(job.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(job.running.load(Ordering::SeqCst), 0);
        assert!(job.ticks.load(Ordering::SeqCst) >= 2);
    }
}
