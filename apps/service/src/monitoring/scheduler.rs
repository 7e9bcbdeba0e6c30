use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use super::batch::{BatchExecutor, CycleReport};
use crate::database::{Database, StorageError};

/// Clears the in-flight flag when a cycle ends, even by panic
struct CycleGuard(Arc<AtomicBool>);

impl CycleGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) { None } else { Some(Self(Arc::clone(flag))) }
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Monitoring scheduler - runs a check cycle over all active monitors once on
/// start and then every `period`
pub struct MonitoringScheduler {
    database: Arc<dyn Database>,
    batches: Arc<BatchExecutor>,
    period: Duration,
    in_flight: Arc<AtomicBool>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl MonitoringScheduler {
    pub fn new(database: Arc<dyn Database>, batches: Arc<BatchExecutor>, period: Duration) -> Self {
        Self {
            database,
            batches,
            period,
            in_flight: Arc::new(AtomicBool::new(false)),
            shutdown: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the timer loop. Calling `start` twice is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            warn!("Monitoring scheduler already started");
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let database = Arc::clone(&self.database);
        let batches = Arc::clone(&self.batches);
        let in_flight = Arc::clone(&self.in_flight);
        let period = self.period;

        info!("Monitoring scheduler started, check interval: {:?}", period);

        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let Some(guard) = CycleGuard::acquire(&in_flight) else {
                            warn!("Previous check cycle still running, skipping this tick");
                            continue;
                        };

                        let database = Arc::clone(&database);
                        let batches = Arc::clone(&batches);
                        tokio::spawn(async move {
                            let _guard = guard;
                            if let Err(e) = run_cycle(database.as_ref(), &batches).await {
                                error!("Check cycle failed: {}", e);
                            }
                        });
                    }
                    _ = rx.changed() => break,
                }
            }

            info!("Monitoring scheduler stopped");
        });

        self.shutdown = Some(tx);
        self.handle = Some(handle);
    }

    /// Stop the timer loop. A cycle already in flight finishes on its own.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }
    }

    /// Run one cycle inline unless another one is in flight
    pub async fn run_once(&self) -> Result<Option<CycleReport>, StorageError> {
        let Some(_guard) = CycleGuard::acquire(&self.in_flight) else {
            return Ok(None);
        };
        run_cycle(self.database.as_ref(), &self.batches).await.map(Some)
    }
}

/// One full pass over the active monitors
pub async fn run_cycle(database: &dyn Database, batches: &BatchExecutor) -> Result<CycleReport, StorageError> {
    let monitors = database.list_active_monitors().await?;

    if monitors.is_empty() {
        info!("No active monitors to check");
        return Ok(CycleReport::default());
    }

    info!("Checking {} monitors in batches of {}", monitors.len(), batches.batch_size());
    let report = batches.run(monitors).await;
    info!(
        "Check cycle completed: {} checked, {} failed, {} batches in {}ms",
        report.checked,
        report.failed,
        report.batches.len(),
        report.duration_ms
    );
    Ok(report)
}
