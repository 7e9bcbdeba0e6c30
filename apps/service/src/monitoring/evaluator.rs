//! Turns a probe outcome into monitor state changes and incident actions.
//!
//! Evaluation is synchronous and side-effect free apart from the monitor it is
//! handed; the executor applies the returned actions in order.

use chrono::{DateTime, Utc};

use super::types::{MonitorStatus, ProbeOutcome};
use crate::database::models::{IncidentDetails, IncidentKind, Monitor};

/// Policy knobs shared by every monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Consecutive failed checks before a monitor is declared down
    pub downtime_threshold: u32,
    /// Responses slower than this open a `slow_response` incident
    pub response_time_threshold_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { downtime_threshold: 3, response_time_threshold_ms: 5000 }
    }
}

/// Incident work requested by an evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentAction {
    /// The monitor came back up: resolve everything still open
    ResolveAll,
    /// Latency is back under the threshold: resolve an open `slow_response`
    ResolveSlowResponse,
    Open { kind: IncidentKind, details: IncidentDetails },
}

/// Failure seen but the debounce threshold is not reached yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdNotReached {
    pub failures: u32,
    pub threshold: u32,
}

impl ThresholdNotReached {
    pub fn remaining(&self) -> u32 {
        self.threshold.saturating_sub(self.failures)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub is_up: bool,
    pub previous_status: MonitorStatus,
    pub actions: Vec<IncidentAction>,
    pub pending: Option<ThresholdNotReached>,
}

/// Apply one probe outcome to `monitor`.
///
/// Counters, status and timestamps are updated in place; incident work is
/// returned in the order it has to run.
pub fn evaluate(
    monitor: &mut Monitor,
    outcome: &ProbeOutcome,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Evaluation {
    let previous_status = monitor.status;
    let mut actions = Vec::new();
    let mut pending = None;

    monitor.last_checked = Some(now);
    if let ProbeOutcome::Completed { elapsed_ms, .. } = outcome {
        monitor.last_response_time_ms = Some(*elapsed_ms);
    }

    let is_up = outcome.status_code() == Some(monitor.target.expected_status_code);

    if is_up {
        monitor.uptime.record_success();
        monitor.consecutive_failures = 0;

        if previous_status == MonitorStatus::Down {
            actions.push(IncidentAction::ResolveAll);
        }
        monitor.status = MonitorStatus::Up;

        let elapsed_ms = outcome.elapsed_ms();
        if elapsed_ms > thresholds.response_time_threshold_ms {
            actions.push(IncidentAction::Open {
                kind: IncidentKind::SlowResponse,
                details: IncidentDetails {
                    status_code: outcome.status_code(),
                    response_time_ms: Some(elapsed_ms),
                    ..Default::default()
                },
            });
        } else if previous_status != MonitorStatus::Down {
            actions.push(IncidentAction::ResolveSlowResponse);
        }
    } else {
        monitor.uptime.record_failure();
        monitor.consecutive_failures += 1;

        if monitor.consecutive_failures >= thresholds.downtime_threshold {
            monitor.status = MonitorStatus::Down;
            actions.push(IncidentAction::Open {
                kind: failure_kind(outcome),
                details: failure_details(outcome, monitor.target.expected_status_code),
            });
        } else {
            pending = Some(ThresholdNotReached {
                failures: monitor.consecutive_failures,
                threshold: thresholds.downtime_threshold,
            });
        }
    }

    Evaluation { is_up, previous_status, actions, pending }
}

fn failure_kind(outcome: &ProbeOutcome) -> IncidentKind {
    match outcome {
        ProbeOutcome::Completed { .. } => IncidentKind::StatusCodeMismatch,
        ProbeOutcome::Failed { .. } => IncidentKind::Timeout,
    }
}

fn failure_details(outcome: &ProbeOutcome, expected_status_code: u16) -> IncidentDetails {
    match outcome {
        ProbeOutcome::Completed { elapsed_ms, status_code } => IncidentDetails {
            status_code: Some(*status_code),
            response_time_ms: Some(*elapsed_ms),
            expected_status_code: Some(expected_status_code),
            error_message: None,
        },
        ProbeOutcome::Failed { error, .. } => IncidentDetails {
            error_message: Some(error.clone()),
            ..Default::default()
        },
    }
}
