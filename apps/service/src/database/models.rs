use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::monitoring::types::{MonitorStatus, ProbeTarget};

/// Lifetime check counters of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UptimeStats {
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub percentage: f64,
}

impl Default for UptimeStats {
    fn default() -> Self {
        Self { total_checks: 0, successful_checks: 0, failed_checks: 0, percentage: 100.0 }
    }
}

impl UptimeStats {
    pub fn record_success(&mut self) {
        self.total_checks += 1;
        self.successful_checks += 1;
        self.recalculate();
    }

    pub fn record_failure(&mut self) {
        self.total_checks += 1;
        self.failed_checks += 1;
        self.recalculate();
    }

    /// Percentage of successful checks rounded to two decimals, 100 before the
    /// first check
    pub fn recalculate(&mut self) {
        self.percentage = if self.total_checks == 0 {
            100.0
        } else {
            let ratio = self.successful_checks as f64 / self.total_checks as f64 * 100.0;
            (ratio * 100.0).round() / 100.0
        };
    }
}

impl fmt::Display for UptimeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% ({}/{})", self.percentage, self.successful_checks, self.total_checks)
    }
}

/// Per-monitor alert channel switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertChannels {
    pub email: bool,
    pub slack: bool,
}

impl Default for AlertChannels {
    fn default() -> Self {
        Self { email: true, slack: false }
    }
}

/// Monitor model - a configured HTTP health-check target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub target: ProbeTarget,
    pub interval_minutes: u32,
    pub is_active: bool,
    pub status: MonitorStatus,
    pub consecutive_failures: u32,
    pub uptime: UptimeStats,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_response_time_ms: Option<u64>,
    pub alert_channels: AlertChannels,
    /// Bumped on every write; check-cycle writes only land on the version
    /// they read
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Create a new active monitor with default policy
    pub fn new(owner: Uuid, name: impl Into<String>, target: ProbeTarget) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            name: name.into(),
            target,
            interval_minutes: 5,
            is_active: true,
            status: MonitorStatus::Unknown,
            consecutive_failures: 0,
            uptime: UptimeStats::default(),
            last_checked: None,
            last_response_time_ms: None,
            alert_channels: AlertChannels::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Cause of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Downtime,
    SlowResponse,
    StatusCodeMismatch,
    Timeout,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::Downtime => "downtime",
            IncidentKind::SlowResponse => "slow_response",
            IncidentKind::StatusCodeMismatch => "status_code_mismatch",
            IncidentKind::Timeout => "timeout",
        }
    }

    /// Whether the incident means the target is unreachable or failing
    pub fn is_outage(&self) -> bool {
        !matches!(self, IncidentKind::SlowResponse)
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downtime" => Ok(IncidentKind::Downtime),
            "slow_response" => Ok(IncidentKind::SlowResponse),
            "status_code_mismatch" => Ok(IncidentKind::StatusCodeMismatch),
            "timeout" => Ok(IncidentKind::Timeout),
            other => Err(format!("unknown incident type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(IncidentStatus::Open),
            "acknowledged" => Ok(IncidentStatus::Acknowledged),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(format!("unknown incident status: {other}")),
        }
    }
}

/// Snapshot of the check that triggered an incident
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_status_code: Option<u16>,
}

/// Delivery channel of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Slack,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Slack => write!(f, "slack"),
        }
    }
}

/// One entry of an incident's notification audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub channel: Channel,
    pub sent_at: DateTime<Utc>,
    pub success: bool,
}

/// Incident model - an anomaly window of a monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub monitor_id: Uuid,
    pub kind: IncidentKind,
    pub status: IncidentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Whole minutes, set on resolution
    pub duration_minutes: Option<i64>,
    pub details: IncidentDetails,
    pub notifications: Vec<NotificationRecord>,
    pub resolved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create an incident
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub monitor_id: Uuid,
    pub kind: IncidentKind,
    pub details: IncidentDetails,
    pub start_time: DateTime<Utc>,
}

/// Statuses an incident can still be resolved from
pub const UNRESOLVED: [IncidentStatus; 2] = [IncidentStatus::Open, IncidentStatus::Acknowledged];

/// Filter for incident listings, newest first
#[derive(Debug, Clone)]
pub struct IncidentQuery {
    pub monitor_id: Option<Uuid>,
    pub status: Option<IncidentStatus>,
    /// Only incidents that started at or after this instant
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// Convert a timestamp to unix milliseconds for storage
pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored unix milliseconds back to a timestamp
pub fn i64_to_timestamp(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}
