use async_trait::async_trait;
use chrono::Utc;
use libsql::{Row, params};
use uuid::Uuid;

use super::StorageError;
use super::models::{
    AlertChannels, Incident, IncidentQuery, IncidentStatus, Monitor, NewIncident, NotificationRecord,
    UptimeStats, i64_to_timestamp, timestamp_to_i64,
};
use crate::monitoring::types::ProbeTarget;
use crate::pool::LibsqlPool;

/// Database trait for abstracting storage operations used by the engine
#[async_trait]
pub trait Database: Send + Sync {
    /// Get every monitor, oldest first
    async fn list_monitors(&self) -> Result<Vec<Monitor>, StorageError>;

    /// Get all monitors with the active flag set
    async fn list_active_monitors(&self) -> Result<Vec<Monitor>, StorageError>;

    /// Get a monitor by id
    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>, StorageError>;

    /// Insert a new monitor
    async fn insert_monitor(&self, monitor: &Monitor) -> Result<(), StorageError>;

    /// Persist the check-owned state of a monitor (status, counters,
    /// timestamps).
    ///
    /// The write only lands if the stored version still equals
    /// `monitor.version`; on success the version is bumped in place.
    async fn save_monitor(&self, monitor: &mut Monitor) -> Result<(), StorageError>;

    /// Overwrite the user-owned configuration of a monitor (name, target,
    /// interval, alert channels) and bump its version, so a check that read
    /// the old version loses its write.
    async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor, StorageError>;

    /// Delete a monitor together with its incidents
    async fn delete_monitor(&self, id: Uuid) -> Result<(), StorageError>;

    /// Pause or resume a monitor
    async fn set_monitor_active(&self, id: Uuid, active: bool) -> Result<Monitor, StorageError>;

    /// Get the open or acknowledged incident of a monitor, if any
    async fn find_open_incident(&self, monitor_id: Uuid) -> Result<Option<Incident>, StorageError>;

    /// Get every open or acknowledged incident of a monitor
    async fn find_open_incidents(&self, monitor_id: Uuid) -> Result<Vec<Incident>, StorageError>;

    /// Create an incident in the `open` state
    async fn create_incident(&self, incident: NewIncident) -> Result<Incident, StorageError>;

    /// Write the status and resolution fields of `incident`, but only while
    /// the stored status is one of `from`.
    ///
    /// Losing to a concurrent transition gives `StaleIncident` with the
    /// status found instead.
    async fn transition_incident(&self, incident: &Incident, from: &[IncidentStatus]) -> Result<(), StorageError>;

    /// Append delivery attempts to the audit trail and return the stored
    /// incident. Status fields are left alone.
    async fn append_notifications(&self, id: Uuid, records: &[NotificationRecord]) -> Result<Incident, StorageError>;

    /// Get an incident by id
    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, StorageError>;

    /// Incidents matching `query`, newest first
    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Vec<Incident>, StorageError>;
}

const MONITOR_COLUMNS: &str = "id, owner, name, url, method, headers, timeout_seconds, \
    expected_status_code, interval_minutes, is_active, status, consecutive_failures, \
    total_checks, successful_checks, failed_checks, uptime_percentage, last_checked, \
    last_response_time_ms, alert_email, alert_slack, version, created_at, updated_at";

const INCIDENT_COLUMNS: &str = "id, monitor_id, kind, status, start_time, end_time, \
    duration_minutes, details, notifications, resolved_by, created_at";

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>, StorageError> {
        Ok(self.pool.get().await?)
    }

    async fn query_monitors(&self, sql: &str, params: Vec<libsql::Value>) -> Result<Vec<Monitor>, StorageError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn query_incidents(&self, sql: &str, params: Vec<libsql::Value>) -> Result<Vec<Incident>, StorageError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut incidents = Vec::new();
        while let Some(row) = rows.next().await? {
            incidents.push(incident_from_row(&row)?);
        }
        Ok(incidents)
    }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn list_monitors(&self) -> Result<Vec<Monitor>, StorageError> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY created_at");
        self.query_monitors(&sql, Vec::new()).await
    }

    async fn list_active_monitors(&self) -> Result<Vec<Monitor>, StorageError> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE is_active = 1 ORDER BY created_at");
        self.query_monitors(&sql, Vec::new()).await
    }

    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>, StorageError> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?");
        Ok(self.query_monitors(&sql, vec![id.to_string().into()]).await?.into_iter().next())
    }

    async fn insert_monitor(&self, monitor: &Monitor) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        let headers = serde_json::to_string(&monitor.target.headers)?;

        conn.execute(
            &format!(
                "INSERT INTO monitors ({MONITOR_COLUMNS}) VALUES \
                 (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                monitor.id.to_string(),
                monitor.owner.to_string(),
                monitor.name.clone(),
                monitor.target.url.clone(),
                monitor.target.method.to_string(),
                headers,
                monitor.target.timeout_seconds as i64,
                monitor.target.expected_status_code as i64,
                monitor.interval_minutes as i64,
                if monitor.is_active { 1 } else { 0 },
                monitor.status.to_string(),
                monitor.consecutive_failures as i64,
                monitor.uptime.total_checks as i64,
                monitor.uptime.successful_checks as i64,
                monitor.uptime.failed_checks as i64,
                monitor.uptime.percentage,
                monitor.last_checked.map(timestamp_to_i64),
                monitor.last_response_time_ms.map(|v| v as i64),
                if monitor.alert_channels.email { 1 } else { 0 },
                if monitor.alert_channels.slack { 1 } else { 0 },
                monitor.version,
                timestamp_to_i64(monitor.created_at),
                timestamp_to_i64(monitor.updated_at)
            ],
        )
        .await?;

        Ok(())
    }

    async fn save_monitor(&self, monitor: &mut Monitor) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        let now = Utc::now();

        let affected = conn
            .execute(
                "UPDATE monitors SET status = ?, consecutive_failures = ?, total_checks = ?, \
                 successful_checks = ?, failed_checks = ?, uptime_percentage = ?, last_checked = ?, \
                 last_response_time_ms = ?, version = version + 1, updated_at = ? \
                 WHERE id = ? AND version = ?",
                params![
                    monitor.status.to_string(),
                    monitor.consecutive_failures as i64,
                    monitor.uptime.total_checks as i64,
                    monitor.uptime.successful_checks as i64,
                    monitor.uptime.failed_checks as i64,
                    monitor.uptime.percentage,
                    monitor.last_checked.map(timestamp_to_i64),
                    monitor.last_response_time_ms.map(|v| v as i64),
                    timestamp_to_i64(now),
                    monitor.id.to_string(),
                    monitor.version
                ],
            )
            .await?;

        if affected == 0 {
            drop(conn);
            return match self.get_monitor(monitor.id).await? {
                Some(_) => Err(StorageError::Conflict { monitor: monitor.id, expected: monitor.version }),
                None => Err(StorageError::NotFound(monitor.id)),
            };
        }

        monitor.version += 1;
        monitor.updated_at = now;
        Ok(())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor, StorageError> {
        let conn = self.get_conn().await?;
        let headers = serde_json::to_string(&monitor.target.headers)?;

        let affected = conn
            .execute(
                "UPDATE monitors SET name = ?, url = ?, method = ?, headers = ?, timeout_seconds = ?, \
                 expected_status_code = ?, interval_minutes = ?, alert_email = ?, alert_slack = ?, \
                 version = version + 1, updated_at = ? WHERE id = ?",
                params![
                    monitor.name.clone(),
                    monitor.target.url.clone(),
                    monitor.target.method.to_string(),
                    headers,
                    monitor.target.timeout_seconds as i64,
                    monitor.target.expected_status_code as i64,
                    monitor.interval_minutes as i64,
                    if monitor.alert_channels.email { 1 } else { 0 },
                    if monitor.alert_channels.slack { 1 } else { 0 },
                    timestamp_to_i64(Utc::now()),
                    monitor.id.to_string()
                ],
            )
            .await?;
        drop(conn);

        if affected == 0 {
            return Err(StorageError::NotFound(monitor.id));
        }
        self.get_monitor(monitor.id).await?.ok_or(StorageError::NotFound(monitor.id))
    }

    async fn delete_monitor(&self, id: Uuid) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;

        // Incidents go with it through ON DELETE CASCADE
        let affected = conn.execute("DELETE FROM monitors WHERE id = ?", params![id.to_string()]).await?;
        if affected == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    async fn set_monitor_active(&self, id: Uuid, active: bool) -> Result<Monitor, StorageError> {
        let conn = self.get_conn().await?;
        let status = if active { "unknown" } else { "paused" };

        let affected = conn
            .execute(
                "UPDATE monitors SET is_active = ?, status = ?, version = version + 1, updated_at = ? WHERE id = ?",
                params![
                    if active { 1 } else { 0 },
                    status,
                    timestamp_to_i64(Utc::now()),
                    id.to_string()
                ],
            )
            .await?;
        drop(conn);

        if affected == 0 {
            return Err(StorageError::NotFound(id));
        }
        self.get_monitor(id).await?.ok_or(StorageError::NotFound(id))
    }

    async fn find_open_incident(&self, monitor_id: Uuid) -> Result<Option<Incident>, StorageError> {
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE monitor_id = ? \
             AND status IN ('open', 'acknowledged') ORDER BY start_time LIMIT 1"
        );
        Ok(self.query_incidents(&sql, vec![monitor_id.to_string().into()]).await?.into_iter().next())
    }

    async fn find_open_incidents(&self, monitor_id: Uuid) -> Result<Vec<Incident>, StorageError> {
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE monitor_id = ? \
             AND status IN ('open', 'acknowledged') ORDER BY start_time"
        );
        self.query_incidents(&sql, vec![monitor_id.to_string().into()]).await
    }

    async fn create_incident(&self, incident: NewIncident) -> Result<Incident, StorageError> {
        let conn = self.get_conn().await?;
        let now = Utc::now();
        let created = Incident {
            id: Uuid::new_v4(),
            monitor_id: incident.monitor_id,
            kind: incident.kind,
            status: IncidentStatus::Open,
            start_time: incident.start_time,
            end_time: None,
            duration_minutes: None,
            details: incident.details,
            notifications: Vec::new(),
            resolved_by: None,
            created_at: now,
        };

        conn.execute(
            &format!("INSERT INTO incidents ({INCIDENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                created.id.to_string(),
                created.monitor_id.to_string(),
                created.kind.as_str(),
                created.status.as_str(),
                timestamp_to_i64(created.start_time),
                None::<i64>,
                None::<i64>,
                serde_json::to_string(&created.details)?,
                "[]",
                None::<String>,
                timestamp_to_i64(now)
            ],
        )
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint failed") {
                StorageError::Duplicate(format!("monitor {} already has an open incident", created.monitor_id))
            } else {
                StorageError::QueryFailure(e)
            }
        })?;

        Ok(created)
    }

    async fn transition_incident(&self, incident: &Incident, from: &[IncidentStatus]) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE incidents SET status = ?, end_time = ?, duration_minutes = ?, resolved_by = ? \
             WHERE id = ? AND status IN ({placeholders})"
        );

        let mut values: Vec<libsql::Value> = vec![
            incident.status.as_str().into(),
            incident.end_time.map(timestamp_to_i64).into(),
            incident.duration_minutes.into(),
            incident.resolved_by.map(|id| id.to_string()).into(),
            incident.id.to_string().into(),
        ];
        values.extend(from.iter().map(|status| libsql::Value::from(status.as_str())));

        let affected = conn.execute(&sql, values).await?;
        if affected == 0 {
            drop(conn);
            return match self.get_incident(incident.id).await? {
                Some(current) => Err(StorageError::StaleIncident { incident: incident.id, found: current.status }),
                None => Err(StorageError::NotFound(incident.id)),
            };
        }
        Ok(())
    }

    async fn append_notifications(&self, id: Uuid, records: &[NotificationRecord]) -> Result<Incident, StorageError> {
        let conn = self.get_conn().await?;

        for record in records {
            let affected = conn
                .execute(
                    "UPDATE incidents SET notifications = json_insert(notifications, '$[#]', json(?)) WHERE id = ?",
                    params![serde_json::to_string(record)?, id.to_string()],
                )
                .await?;
            if affected == 0 {
                return Err(StorageError::NotFound(id));
            }
        }
        drop(conn);

        self.get_incident(id).await?.ok_or(StorageError::NotFound(id))
    }

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, StorageError> {
        let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?");
        Ok(self.query_incidents(&sql, vec![id.to_string().into()]).await?.into_iter().next())
    }

    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Vec<Incident>, StorageError> {
        let mut filters = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();

        if let Some(monitor_id) = query.monitor_id {
            filters.push("monitor_id = ?");
            values.push(monitor_id.to_string().into());
        }
        if let Some(status) = query.status {
            filters.push("status = ?");
            values.push(status.as_str().into());
        }
        if let Some(since) = query.since {
            filters.push("start_time >= ?");
            values.push(timestamp_to_i64(since).into());
        }
        values.push((query.limit as i64).into());

        let where_clause =
            if filters.is_empty() { String::new() } else { format!("WHERE {}", filters.join(" AND ")) };
        let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents {where_clause} ORDER BY start_time DESC LIMIT ?");
        self.query_incidents(&sql, values).await
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(raw: String) -> Result<T, StorageError> {
    raw.parse().map_err(StorageError::Decode)
}

fn monitor_from_row(row: &Row) -> Result<Monitor, StorageError> {
    let mut target = ProbeTarget::new(row.get::<String>(3)?);
    target.method = parse_column(row.get::<String>(4)?)?;
    target.headers = serde_json::from_str(&row.get::<String>(5)?)?;
    target.timeout_seconds = row.get::<i64>(6)? as u64;
    target.expected_status_code = row.get::<i64>(7)? as u16;

    Ok(Monitor {
        id: Uuid::parse_str(&row.get::<String>(0)?)?,
        owner: Uuid::parse_str(&row.get::<String>(1)?)?,
        name: row.get(2)?,
        target,
        interval_minutes: row.get::<i64>(8)? as u32,
        is_active: row.get::<i64>(9)? != 0,
        status: parse_column(row.get::<String>(10)?)?,
        consecutive_failures: row.get::<i64>(11)? as u32,
        uptime: UptimeStats {
            total_checks: row.get::<i64>(12)? as u64,
            successful_checks: row.get::<i64>(13)? as u64,
            failed_checks: row.get::<i64>(14)? as u64,
            percentage: row.get::<f64>(15)?,
        },
        last_checked: row.get::<Option<i64>>(16)?.map(i64_to_timestamp),
        last_response_time_ms: row.get::<Option<i64>>(17)?.map(|v| v as u64),
        alert_channels: AlertChannels {
            email: row.get::<i64>(18)? != 0,
            slack: row.get::<i64>(19)? != 0,
        },
        version: row.get(20)?,
        created_at: i64_to_timestamp(row.get(21)?),
        updated_at: i64_to_timestamp(row.get(22)?),
    })
}

fn incident_from_row(row: &Row) -> Result<Incident, StorageError> {
    let resolved_by = match row.get::<Option<String>>(9)? {
        Some(raw) => Some(Uuid::parse_str(&raw)?),
        None => None,
    };

    Ok(Incident {
        id: Uuid::parse_str(&row.get::<String>(0)?)?,
        monitor_id: Uuid::parse_str(&row.get::<String>(1)?)?,
        kind: parse_column(row.get::<String>(2)?)?,
        status: parse_column(row.get::<String>(3)?)?,
        start_time: i64_to_timestamp(row.get(4)?),
        end_time: row.get::<Option<i64>>(5)?.map(i64_to_timestamp),
        duration_minutes: row.get(6)?,
        details: serde_json::from_str(&row.get::<String>(7)?)?,
        notifications: serde_json::from_str(&row.get::<String>(8)?)?,
        resolved_by,
        created_at: i64_to_timestamp(row.get(10)?),
    })
}
