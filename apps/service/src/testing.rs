//! In-memory stand-ins for storage, probing and alert delivery.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::database::models::{
    Channel, Incident, IncidentQuery, IncidentStatus, Monitor, NewIncident, NotificationRecord,
};
use crate::database::{Database, StorageError};
use crate::monitoring::checker::Checker;
use crate::monitoring::types::{MonitorStatus, ProbeOutcome, ProbeTarget};
use crate::notifier::{AlertEvent, ChannelDelivery, Notifier};

pub fn monitor(name: &str) -> Monitor {
    Monitor::new(Uuid::new_v4(), name, ProbeTarget::new(format!("https://{name}.example.com/health")))
}

pub fn ok(elapsed_ms: u64) -> ProbeOutcome {
    ProbeOutcome::Completed { elapsed_ms, status_code: 200 }
}

pub fn status(status_code: u16) -> ProbeOutcome {
    ProbeOutcome::Completed { elapsed_ms: 25, status_code }
}

pub fn refused() -> ProbeOutcome {
    ProbeOutcome::Failed { elapsed_ms: 1, error: "connection failed: refused".to_string() }
}

/// `Database` backed by two maps, enforcing the same version check and
/// single-open-incident rule as the SQL schema
#[derive(Default)]
pub struct MemoryDatabase {
    monitors: Mutex<HashMap<Uuid, Monitor>>,
    incidents: Mutex<Vec<Incident>>,
    broken: Mutex<HashSet<Uuid>>,
    read_delay: Option<Duration>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out incident reads only after `delay`, so concurrent callers
    /// act on the same snapshot
    pub fn with_read_delay(delay: Duration) -> Self {
        Self { read_delay: Some(delay), ..Self::default() }
    }

    async fn after_read_delay<T>(&self, snapshot: T) -> T {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        snapshot
    }

    /// Make every `save_monitor` for `id` fail
    pub fn break_monitor(&self, id: Uuid) {
        self.broken.lock().unwrap().insert(id);
    }

    pub fn backdate_incident(&self, id: Uuid, minutes: i64) {
        let mut incidents = self.incidents.lock().unwrap();
        if let Some(incident) = incidents.iter_mut().find(|i| i.id == id) {
            incident.start_time -= chrono::Duration::minutes(minutes);
        }
    }

    pub fn incidents_of(&self, monitor_id: Uuid) -> Vec<Incident> {
        self.incidents.lock().unwrap().iter().filter(|i| i.monitor_id == monitor_id).cloned().collect()
    }

    pub fn stored_monitor(&self, id: Uuid) -> Option<Monitor> {
        self.monitors.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn list_monitors(&self) -> Result<Vec<Monitor>, StorageError> {
        let mut all: Vec<Monitor> = self.monitors.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|m| m.created_at);
        Ok(all)
    }

    async fn list_active_monitors(&self) -> Result<Vec<Monitor>, StorageError> {
        let mut active: Vec<Monitor> = self.monitors.lock().unwrap().values().filter(|m| m.is_active).cloned().collect();
        active.sort_by_key(|m| m.created_at);
        Ok(active)
    }

    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>, StorageError> {
        Ok(self.monitors.lock().unwrap().get(&id).cloned())
    }

    async fn insert_monitor(&self, monitor: &Monitor) -> Result<(), StorageError> {
        self.monitors.lock().unwrap().insert(monitor.id, monitor.clone());
        Ok(())
    }

    async fn save_monitor(&self, monitor: &mut Monitor) -> Result<(), StorageError> {
        if self.broken.lock().unwrap().contains(&monitor.id) {
            return Err(StorageError::Pool("connection reset".to_string()));
        }

        let mut monitors = self.monitors.lock().unwrap();
        let stored = monitors.get_mut(&monitor.id).ok_or(StorageError::NotFound(monitor.id))?;
        if stored.version != monitor.version {
            return Err(StorageError::Conflict { monitor: monitor.id, expected: monitor.version });
        }

        monitor.version += 1;
        monitor.updated_at = Utc::now();
        stored.status = monitor.status;
        stored.consecutive_failures = monitor.consecutive_failures;
        stored.uptime = monitor.uptime;
        stored.last_checked = monitor.last_checked;
        stored.last_response_time_ms = monitor.last_response_time_ms;
        stored.version = monitor.version;
        stored.updated_at = monitor.updated_at;
        Ok(())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor, StorageError> {
        let mut monitors = self.monitors.lock().unwrap();
        let stored = monitors.get_mut(&monitor.id).ok_or(StorageError::NotFound(monitor.id))?;
        stored.name = monitor.name.clone();
        stored.target = monitor.target.clone();
        stored.interval_minutes = monitor.interval_minutes;
        stored.alert_channels = monitor.alert_channels;
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_monitor(&self, id: Uuid) -> Result<(), StorageError> {
        self.monitors.lock().unwrap().remove(&id).ok_or(StorageError::NotFound(id))?;
        self.incidents.lock().unwrap().retain(|i| i.monitor_id != id);
        Ok(())
    }

    async fn set_monitor_active(&self, id: Uuid, active: bool) -> Result<Monitor, StorageError> {
        let mut monitors = self.monitors.lock().unwrap();
        let stored = monitors.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        stored.is_active = active;
        stored.status = if active { MonitorStatus::Unknown } else { MonitorStatus::Paused };
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn find_open_incident(&self, monitor_id: Uuid) -> Result<Option<Incident>, StorageError> {
        Ok(self.find_open_incidents(monitor_id).await?.into_iter().next())
    }

    async fn find_open_incidents(&self, monitor_id: Uuid) -> Result<Vec<Incident>, StorageError> {
        let open = self.incidents_of(monitor_id).into_iter().filter(|i| i.is_open()).collect();
        Ok(self.after_read_delay(open).await)
    }

    async fn create_incident(&self, incident: NewIncident) -> Result<Incident, StorageError> {
        let mut incidents = self.incidents.lock().unwrap();
        if incidents.iter().any(|i| i.monitor_id == incident.monitor_id && i.is_open()) {
            return Err(StorageError::Duplicate(format!("monitor {} already has an open incident", incident.monitor_id)));
        }

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
            created_at: Utc::now(),
        };
        incidents.push(created.clone());
        Ok(created)
    }

    async fn transition_incident(&self, incident: &Incident, from: &[IncidentStatus]) -> Result<(), StorageError> {
        let mut incidents = self.incidents.lock().unwrap();
        let stored = incidents.iter_mut().find(|i| i.id == incident.id).ok_or(StorageError::NotFound(incident.id))?;
        if !from.contains(&stored.status) {
            return Err(StorageError::StaleIncident { incident: incident.id, found: stored.status });
        }

        stored.status = incident.status;
        stored.end_time = incident.end_time;
        stored.duration_minutes = incident.duration_minutes;
        stored.resolved_by = incident.resolved_by;
        Ok(())
    }

    async fn append_notifications(&self, id: Uuid, records: &[NotificationRecord]) -> Result<Incident, StorageError> {
        let mut incidents = self.incidents.lock().unwrap();
        let stored = incidents.iter_mut().find(|i| i.id == id).ok_or(StorageError::NotFound(id))?;
        stored.notifications.extend_from_slice(records);
        Ok(stored.clone())
    }

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, StorageError> {
        let found = self.incidents.lock().unwrap().iter().find(|i| i.id == id).cloned();
        Ok(self.after_read_delay(found).await)
    }

    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Vec<Incident>, StorageError> {
        let mut incidents: Vec<Incident> =
            self.incidents.lock().unwrap().iter().filter(|i| matches_query(query, i)).cloned().collect();
        incidents.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        incidents.truncate(query.limit);
        Ok(incidents)
    }
}

fn matches_query(query: &IncidentQuery, incident: &Incident) -> bool {
    query.monitor_id.is_none_or(|id| incident.monitor_id == id)
        && query.status.is_none_or(|status| incident.status == status)
        && query.since.is_none_or(|since| incident.start_time >= since)
}

/// `Checker` that replays queued outcomes per URL and answers `ok(10)` once
/// a queue runs dry
#[derive(Default)]
pub struct ScriptedChecker {
    scripts: Mutex<HashMap<String, VecDeque<ProbeOutcome>>>,
    panics: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every probe for `delay` so overlapping probes are observable
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn script(&self, monitor: &Monitor, outcomes: impl IntoIterator<Item = ProbeOutcome>) {
        self.scripts.lock().unwrap().entry(monitor.target.url.clone()).or_default().extend(outcomes);
    }

    pub fn panic_for(&self, monitor: &Monitor) {
        self.panics.lock().unwrap().insert(monitor.target.url.clone());
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, target: &ProbeTarget) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.lock().unwrap().contains(&target.url) {
            panic!("probe blew up for {}", target.url);
        }

        self.scripts
            .lock()
            .unwrap()
            .get_mut(&target.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ok(10))
    }
}

/// `Notifier` that remembers every event and reports one delivery per
/// enabled channel
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(Uuid, AlertEvent)>>,
    fail_email: bool,
    slow_event: Option<(AlertEvent, Duration)>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_email() -> Self {
        Self { fail_email: true, ..Self::default() }
    }

    /// Hold every delivery of `event` for `delay`
    pub fn slow_on(event: AlertEvent, delay: Duration) -> Self {
        Self { slow_event: Some((event, delay)), ..Self::default() }
    }

    pub fn events(&self) -> Vec<(Uuid, AlertEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: AlertEvent) -> usize {
        self.events.lock().unwrap().iter().filter(|(_, e)| *e == event).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, monitor: &Monitor, incident: &Incident, event: AlertEvent) -> Vec<ChannelDelivery> {
        self.events.lock().unwrap().push((incident.id, event));
        if let Some((slow, delay)) = self.slow_event {
            if slow == event {
                tokio::time::sleep(delay).await;
            }
        }

        let mut deliveries = Vec::new();
        if monitor.alert_channels.email {
            deliveries.push(if self.fail_email {
                ChannelDelivery::failed(Channel::Email, "smtp unavailable")
            } else {
                ChannelDelivery::succeeded(Channel::Email)
            });
        }
        if monitor.alert_channels.slack {
            deliveries.push(ChannelDelivery::succeeded(Channel::Slack));
        }
        deliveries
    }
}
