use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, error};

use super::executor::MonitoringExecutor;
use crate::database::models::Monitor;

pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Totals of one check cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Size of each batch in execution order
    pub batches: Vec<usize>,
    pub checked: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Runs checks in consecutive groups of at most `batch_size`.
///
/// Every check of a group runs as its own task and the next group starts only
/// once the whole group has finished. An error or panic in one task is logged
/// and counted; it never stops its siblings or later groups.
pub struct BatchExecutor {
    executor: Arc<MonitoringExecutor>,
    batch_size: usize,
}

impl BatchExecutor {
    pub fn new(executor: Arc<MonitoringExecutor>, batch_size: usize) -> Self {
        Self { executor, batch_size: batch_size.max(1) }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn run(&self, monitors: Vec<Monitor>) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::default();

        for (index, chunk) in monitors.chunks(self.batch_size).enumerate() {
            debug!("Starting batch {} with {} monitors", index + 1, chunk.len());
            let mut tasks = JoinSet::new();

            for monitor in chunk.iter().cloned() {
                let executor = Arc::clone(&self.executor);
                tasks.spawn(async move {
                    let id = monitor.id;
                    let name = monitor.name.clone();
                    (id, name, executor.execute_check(monitor).await)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, _, Ok(_))) => report.checked += 1,
                    Ok((id, name, Err(e))) => {
                        report.failed += 1;
                        error!(monitor = %id, "Failed to check {}: {}", name, e);
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!("Check task aborted: {}", e);
                    }
                }
            }

            report.batches.push(chunk.len());
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }
}
