use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::checker::Checker;
use super::error::EngineError;
use super::evaluator::{IncidentAction, Thresholds, evaluate};
use super::types::{MonitorStatus, ProbeOutcome};
use crate::database::models::{Incident, Monitor};
use crate::database::{Database, StorageError};
use crate::incidents::{IncidentTracker, OpenOutcome};

/// What one check did
#[derive(Debug, Clone)]
pub struct CheckSummary {
    pub monitor_id: Uuid,
    pub outcome: ProbeOutcome,
    pub is_up: bool,
    pub status: MonitorStatus,
    pub opened: Vec<Incident>,
    pub resolved: Vec<Incident>,
    pub suppressed: usize,
    /// False when a concurrent edit won and the monitor write was dropped
    pub persisted: bool,
}

/// Monitoring executor - runs probe, evaluation and incident tracking for
/// one monitor
pub struct MonitoringExecutor {
    checker: Arc<dyn Checker>,
    database: Arc<dyn Database>,
    tracker: Arc<IncidentTracker>,
    thresholds: Thresholds,
}

impl MonitoringExecutor {
    pub fn new(
        checker: Arc<dyn Checker>,
        database: Arc<dyn Database>,
        tracker: Arc<IncidentTracker>,
        thresholds: Thresholds,
    ) -> Self {
        Self { checker, database, tracker, thresholds }
    }

    /// Check a monitor right away, outside the scheduled cadence
    pub async fn check_monitor_now(&self, monitor_id: Uuid) -> Result<CheckSummary, EngineError> {
        let monitor =
            self.database.get_monitor(monitor_id).await?.ok_or(EngineError::MonitorNotFound(monitor_id))?;

        if !monitor.is_active {
            return Err(EngineError::MonitorPaused(monitor_id));
        }
        self.execute_check(monitor).await
    }

    /// Probe, evaluate, apply incident actions, persist
    pub async fn execute_check(&self, mut monitor: Monitor) -> Result<CheckSummary, EngineError> {
        let outcome = self.checker.check(&monitor.target).await;
        let evaluation = evaluate(&mut monitor, &outcome, &self.thresholds, Utc::now());

        if let ProbeOutcome::Failed { error, .. } = &outcome {
            warn!(
                monitor = %monitor.id,
                "{} - Consecutive failures: {}/{} - Error: {}",
                monitor.name,
                monitor.consecutive_failures,
                self.thresholds.downtime_threshold,
                error
            );
        }
        if evaluation.is_up && evaluation.previous_status == MonitorStatus::Down {
            info!(monitor = %monitor.id, "{} is back up", monitor.name);
        }
        if let Some(pending) = evaluation.pending {
            info!(
                monitor = %monitor.id,
                "{} - Waiting for {} more failure(s) before creating incident",
                monitor.name,
                pending.remaining()
            );
        }

        let mut summary = CheckSummary {
            monitor_id: monitor.id,
            outcome: outcome.clone(),
            is_up: evaluation.is_up,
            status: monitor.status,
            opened: Vec::new(),
            resolved: Vec::new(),
            suppressed: 0,
            persisted: false,
        };

        for action in evaluation.actions {
            match action {
                IncidentAction::ResolveAll => {
                    summary.resolved.extend(self.tracker.resolve_all_open(&monitor).await?);
                }
                IncidentAction::ResolveSlowResponse => {
                    summary.resolved.extend(self.tracker.resolve_slow_response(&monitor).await?);
                }
                IncidentAction::Open { kind, details } => {
                    match self.tracker.open(&monitor, kind, details).await? {
                        OpenOutcome::Opened(incident) => summary.opened.push(incident),
                        OpenOutcome::Suppressed { .. } => summary.suppressed += 1,
                    }
                }
            }
        }

        match self.database.save_monitor(&mut monitor).await {
            Ok(()) => summary.persisted = true,
            Err(StorageError::Conflict { expected, .. }) => {
                warn!(
                    monitor = %monitor.id,
                    "{} was modified while being checked (version {}), discarding check result",
                    monitor.name,
                    expected
                );
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            monitor = %monitor.id,
            "Checked {} - Status: {}, Response: {}ms, Uptime: {}",
            monitor.name,
            monitor.status,
            outcome.elapsed_ms(),
            monitor.uptime
        );
        Ok(summary)
    }
}
