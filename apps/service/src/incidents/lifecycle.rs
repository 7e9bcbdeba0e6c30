use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::IncidentError;
use crate::database::models::{Incident, IncidentStatus, NotificationRecord};
use crate::notifier::ChannelDelivery;

impl Incident {
    /// Open or acknowledged
    pub fn is_open(&self) -> bool {
        matches!(self.status, IncidentStatus::Open | IncidentStatus::Acknowledged)
    }

    /// Move an open incident to `acknowledged`.
    ///
    /// Returns `false` when it already was acknowledged.
    pub fn acknowledge(&mut self) -> Result<bool, IncidentError> {
        match self.status {
            IncidentStatus::Resolved => Err(IncidentError::AlreadyResolved(self.id)),
            IncidentStatus::Acknowledged => Ok(false),
            IncidentStatus::Open => {
                self.status = IncidentStatus::Acknowledged;
                Ok(true)
            }
        }
    }

    /// Close the incident at `now`, recording the duration in whole minutes
    pub fn resolve(&mut self, now: DateTime<Utc>, resolved_by: Option<Uuid>) -> Result<(), IncidentError> {
        if self.status == IncidentStatus::Resolved {
            return Err(IncidentError::AlreadyResolved(self.id));
        }

        let elapsed_ms = (now - self.start_time).num_milliseconds();
        self.status = IncidentStatus::Resolved;
        self.end_time = Some(now);
        self.duration_minutes = Some((elapsed_ms as f64 / 60_000.0).round() as i64);
        self.resolved_by = resolved_by;
        Ok(())
    }

    /// Human readable duration, e.g. `1h 5m`
    pub fn duration_string(&self) -> String {
        match self.duration_minutes {
            None | Some(0) => "N/A".to_string(),
            Some(minutes) if minutes >= 60 => format!("{}h {}m", minutes / 60, minutes % 60),
            Some(minutes) => format!("{minutes}m"),
        }
    }

}

/// Audit trail entry of one delivery attempt
impl From<&ChannelDelivery> for NotificationRecord {
    fn from(delivery: &ChannelDelivery) -> Self {
        Self { channel: delivery.channel, sent_at: delivery.sent_at, success: delivery.is_success() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{IncidentDetails, IncidentKind};
    use crate::database::models::Channel;
    use chrono::Duration;

    fn incident(start_time: DateTime<Utc>) -> Incident {
        Incident {
            id: Uuid::new_v4(),
            monitor_id: Uuid::new_v4(),
            kind: IncidentKind::Timeout,
            status: IncidentStatus::Open,
            start_time,
            end_time: None,
            duration_minutes: None,
            details: IncidentDetails::default(),
            notifications: Vec::new(),
            resolved_by: None,
            created_at: start_time,
        }
    }

    #[test]
    fn test_acknowledge_then_resolve() {
        let start = Utc::now() - Duration::minutes(90);
        let mut inc = incident(start);
        let actor = Uuid::new_v4();

        assert!(inc.acknowledge().unwrap());
        assert_eq!(inc.status, IncidentStatus::Acknowledged);
        assert!(inc.end_time.is_none());
        assert!(!inc.acknowledge().unwrap());

        let now = start + Duration::minutes(65) + Duration::seconds(20);
        inc.resolve(now, Some(actor)).unwrap();
        assert_eq!(inc.status, IncidentStatus::Resolved);
        assert_eq!(inc.end_time, Some(now));
        assert_eq!(inc.duration_minutes, Some(65));
        assert_eq!(inc.resolved_by, Some(actor));
        assert_eq!(inc.duration_string(), "1h 5m");
    }

    #[test]
    fn test_duration_rounds_to_nearest_minute() {
        let start = Utc::now();
        let mut inc = incident(start);
        inc.resolve(start + Duration::seconds(150), None).unwrap();
        assert_eq!(inc.duration_minutes, Some(3));
        assert_eq!(inc.duration_string(), "3m");
    }

    #[test]
    fn test_resolved_is_terminal() {
        let start = Utc::now();
        let mut inc = incident(start);
        inc.resolve(start + Duration::minutes(2), None).unwrap();
        let snapshot = inc.clone();

        assert!(matches!(inc.acknowledge(), Err(IncidentError::AlreadyResolved(_))));
        assert!(matches!(
            inc.resolve(start + Duration::minutes(9), Some(Uuid::new_v4())),
            Err(IncidentError::AlreadyResolved(_))
        ));
        assert_eq!(inc, snapshot);
    }

    #[test]
    fn test_delivery_becomes_audit_record() {
        let failed = ChannelDelivery::failed(Channel::Slack, "webhook returned 500");
        let record = NotificationRecord::from(&failed);
        assert_eq!(record.channel, Channel::Slack);
        assert_eq!(record.sent_at, failed.sent_at);
        assert!(!record.success);

        assert!(NotificationRecord::from(&ChannelDelivery::succeeded(Channel::Email)).success);
    }
}
