/// Monitoring engine module - handles execution of monitoring checks
///
/// This module is responsible for:
/// - Probing HTTP endpoints
/// - Scheduling check cycles and running them in bounded batches
/// - Evaluating outcomes against the downtime and latency thresholds
/// - Handing incident work to the tracker
pub mod batch;
pub mod checker;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod scheduler;
pub mod types;
pub mod validation;


pub use batch::{BatchExecutor, CycleReport};
pub use checker::{Checker, HttpChecker};
pub use evaluator::Thresholds;
pub use executor::MonitoringExecutor;
pub use scheduler::MonitoringScheduler;
