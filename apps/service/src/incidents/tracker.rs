use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::IncidentError;
use crate::database::models::{
    Incident, IncidentDetails, IncidentKind, IncidentStatus, Monitor, NewIncident, NotificationRecord, UNRESOLVED,
};
use crate::database::{Database, StorageError};
use crate::notifier::{AlertEvent, Notifier};

/// Result of asking the tracker to open an incident
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    Opened(Incident),
    /// The monitor already had an open or acknowledged incident
    Suppressed { existing: Incident },
}

/// Owns incident creation and transitions and records alert deliveries
pub struct IncidentTracker {
    database: Arc<dyn Database>,
    notifier: Arc<dyn Notifier>,
    /// Serialises the find-then-create step of `open`
    open_guard: Mutex<()>,
}

impl IncidentTracker {
    pub fn new(database: Arc<dyn Database>, notifier: Arc<dyn Notifier>) -> Self {
        Self { database, notifier, open_guard: Mutex::new(()) }
    }

    /// Open an incident unless the monitor already has one.
    ///
    /// An open `slow_response` incident does not block an outage: it is
    /// resolved without a recovery alert and the outage incident replaces it.
    pub async fn open(
        &self,
        monitor: &Monitor,
        kind: IncidentKind,
        details: IncidentDetails,
    ) -> Result<OpenOutcome, IncidentError> {
        let guard = self.open_guard.lock().await;

        if let Some(mut existing) = self.database.find_open_incident(monitor.id).await? {
            if kind.is_outage() && !existing.kind.is_outage() {
                existing.resolve(Utc::now(), None)?;
                match self.database.transition_incident(&existing, &UNRESOLVED).await {
                    // Resolved meanwhile, nothing left to supersede
                    Ok(()) | Err(StorageError::StaleIncident { found: IncidentStatus::Resolved, .. }) => {}
                    Err(e) => return Err(e.into()),
                }
                info!(
                    monitor = %monitor.id,
                    incident = %existing.id,
                    "Slow response incident superseded by {} for {}",
                    kind,
                    monitor.name
                );
            } else {
                info!(
                    monitor = %monitor.id,
                    incident = %existing.id,
                    "Incident already exists for {}",
                    monitor.name
                );
                return Ok(OpenOutcome::Suppressed { existing });
            }
        }

        let created = self
            .database
            .create_incident(NewIncident { monitor_id: monitor.id, kind, details, start_time: Utc::now() })
            .await;
        drop(guard);

        let incident = match created {
            Ok(incident) => incident,
            Err(StorageError::Duplicate(reason)) => {
                // Another writer got there first
                debug!(monitor = %monitor.id, "Incident creation raced: {}", reason);
                return match self.database.find_open_incident(monitor.id).await? {
                    Some(existing) => Ok(OpenOutcome::Suppressed { existing }),
                    None => Err(StorageError::Duplicate(reason).into()),
                };
            }
            Err(e) => return Err(e.into()),
        };

        info!(monitor = %monitor.id, incident = %incident.id, "Incident created for {} - Type: {}", monitor.name, kind);
        let incident = self.notify(monitor, incident, AlertEvent::Opened).await?;
        Ok(OpenOutcome::Opened(incident))
    }

    /// Mark an incident as acknowledged
    pub async fn acknowledge(&self, incident_id: Uuid) -> Result<Incident, IncidentError> {
        let mut incident = self.load(incident_id).await?;
        if !incident.acknowledge()? {
            return Ok(incident);
        }

        match self.database.transition_incident(&incident, &[IncidentStatus::Open]).await {
            Ok(()) => {
                info!(incident = %incident.id, "Incident acknowledged");
                Ok(incident)
            }
            // Someone else acknowledged it first
            Err(StorageError::StaleIncident { found: IncidentStatus::Acknowledged, .. }) => self.load(incident_id).await,
            Err(e) => Err(transition_error(e)),
        }
    }

    /// Resolve an incident on behalf of an actor
    pub async fn resolve(&self, incident_id: Uuid, resolved_by: Option<Uuid>) -> Result<Incident, IncidentError> {
        let mut incident = self.load(incident_id).await?;
        incident.resolve(Utc::now(), resolved_by)?;
        self.database.transition_incident(&incident, &UNRESOLVED).await.map_err(transition_error)?;
        info!(incident = %incident.id, "Incident resolved manually after {}", incident.duration_string());

        match self.database.get_monitor(incident.monitor_id).await? {
            Some(monitor) => self.notify(&monitor, incident, AlertEvent::Recovered).await,
            None => {
                warn!(incident = %incident.id, "Monitor {} no longer exists, skipping alerts", incident.monitor_id);
                Ok(incident)
            }
        }
    }

    /// Resolve every open or acknowledged incident of a recovered monitor
    pub async fn resolve_all_open(&self, monitor: &Monitor) -> Result<Vec<Incident>, IncidentError> {
        let mut resolved = Vec::new();
        for incident in self.database.find_open_incidents(monitor.id).await? {
            resolved.extend(self.auto_resolve(monitor, incident).await?);
        }
        Ok(resolved)
    }

    /// Resolve an open `slow_response` incident once latency is back to normal
    pub async fn resolve_slow_response(&self, monitor: &Monitor) -> Result<Option<Incident>, IncidentError> {
        match self.database.find_open_incident(monitor.id).await? {
            Some(incident) if incident.kind == IncidentKind::SlowResponse => self.auto_resolve(monitor, incident).await,
            _ => Ok(None),
        }
    }

    /// Resolve on recovery. `None` when a concurrent resolve got there first;
    /// the recovery alert is then left to the winner.
    async fn auto_resolve(&self, monitor: &Monitor, mut incident: Incident) -> Result<Option<Incident>, IncidentError> {
        incident.resolve(Utc::now(), None)?;
        match self.database.transition_incident(&incident, &UNRESOLVED).await {
            Ok(()) => {}
            Err(StorageError::StaleIncident { found: IncidentStatus::Resolved, .. }) => {
                debug!(monitor = %monitor.id, incident = %incident.id, "Incident already resolved elsewhere");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            monitor = %monitor.id,
            incident = %incident.id,
            "Incident resolved for {} after {}",
            monitor.name,
            incident.duration_string()
        );
        Ok(Some(self.notify(monitor, incident, AlertEvent::Recovered).await?))
    }

    async fn load(&self, incident_id: Uuid) -> Result<Incident, IncidentError> {
        self.database.get_incident(incident_id).await?.ok_or(IncidentError::NotFound(incident_id))
    }

    /// Deliver an alert and append every attempt to the audit trail.
    ///
    /// Returns the incident as stored afterwards, which may already carry a
    /// transition made while the alert was in flight.
    async fn notify(&self, monitor: &Monitor, incident: Incident, event: AlertEvent) -> Result<Incident, IncidentError> {
        let deliveries = self.notifier.deliver(monitor, &incident, event).await;
        if deliveries.is_empty() {
            warn!(monitor = %monitor.id, "No alert channels enabled for {}", monitor.name);
            return Ok(incident);
        }

        let failed = deliveries.iter().filter(|d| !d.is_success()).count();
        debug!(
            incident = %incident.id,
            "{} alert: {} of {} deliveries succeeded",
            event,
            deliveries.len() - failed,
            deliveries.len()
        );

        let records: Vec<NotificationRecord> = deliveries.iter().map(NotificationRecord::from).collect();
        Ok(self.database.append_notifications(incident.id, &records).await?)
    }
}

/// A transition that lost to a resolve surfaces as `AlreadyResolved`
fn transition_error(error: StorageError) -> IncidentError {
    match error {
        StorageError::StaleIncident { incident, found: IncidentStatus::Resolved } => {
            IncidentError::AlreadyResolved(incident)
        }
        StorageError::NotFound(id) => IncidentError::NotFound(id),
        other => other.into(),
    }
}
