use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, join_all};
use tracing::{debug, warn};

use super::senders::{ChannelSender, SenderError};
use super::{AlertEvent, AlertMessage, ChannelDelivery, Notifier};
use crate::database::models::{Channel, Incident, Monitor};

/// Notifier that fans out to the configured channel senders
#[derive(Default)]
pub struct AlertDispatcher {
    email: Option<Arc<dyn ChannelSender>>,
    slack: Option<Arc<dyn ChannelSender>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sender under the channel it reports
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        match sender.channel() {
            Channel::Email => self.email = Some(sender),
            Channel::Slack => self.slack = Some(sender),
        }
        self
    }
}

async fn attempt(channel: Channel, sender: Option<Arc<dyn ChannelSender>>, message: &AlertMessage) -> ChannelDelivery {
    let result = match sender {
        Some(sender) => sender.send(message).await,
        None => Err(SenderError::NotConfigured(channel)),
    };

    match result {
        Ok(()) => ChannelDelivery::succeeded(channel),
        Err(e) => ChannelDelivery::failed(channel, e.to_string()),
    }
}

#[async_trait]
impl Notifier for AlertDispatcher {
    async fn deliver(&self, monitor: &Monitor, incident: &Incident, event: AlertEvent) -> Vec<ChannelDelivery> {
        let message = AlertMessage::new(monitor, incident, event);
        let mut attempts: Vec<BoxFuture<'_, ChannelDelivery>> = Vec::new();

        // Email is attempted whenever the monitor asks for it, so a missing
        // SMTP setup shows up as a failed entry in the audit trail.
        if monitor.alert_channels.email {
            attempts.push(attempt(Channel::Email, self.email.clone(), &message).boxed());
        } else {
            debug!(monitor = %monitor.id, "Email alerts are disabled for {}", monitor.name);
        }

        if monitor.alert_channels.slack {
            match &self.slack {
                Some(sender) => attempts.push(attempt(Channel::Slack, Some(sender.clone()), &message).boxed()),
                None => debug!(monitor = %monitor.id, "Slack alerts requested but no webhook is configured"),
            }
        }

        let deliveries = join_all(attempts).await;
        for delivery in &deliveries {
            if let Some(error) = &delivery.error {
                warn!(
                    monitor = %monitor.id,
                    incident = %incident.id,
                    channel = %delivery.channel,
                    "Failed to deliver {} alert: {}",
                    event,
                    error
                );
            }
        }
        deliveries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{IncidentDetails, IncidentKind, IncidentStatus};
    use crate::monitoring::types::ProbeTarget;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct StubSender {
        channel: Channel,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubSender {
        fn new(channel: Channel, fail: bool) -> Arc<Self> {
            Arc::new(Self { channel, fail, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl ChannelSender for StubSender {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, _message: &AlertMessage) -> Result<(), SenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail { Err(SenderError::HttpStatus(500)) } else { Ok(()) }
        }
    }

    fn fixture(email: bool, slack: bool) -> (Monitor, Incident) {
        let mut monitor = Monitor::new(Uuid::new_v4(), "api", ProbeTarget::new("https://api.example.com"));
        monitor.alert_channels.email = email;
        monitor.alert_channels.slack = slack;
        let incident = Incident {
            id: Uuid::new_v4(),
            monitor_id: monitor.id,
            kind: IncidentKind::Timeout,
            status: IncidentStatus::Open,
            start_time: Utc::now(),
            end_time: None,
            duration_minutes: None,
            details: IncidentDetails::default(),
            notifications: Vec::new(),
            resolved_by: None,
            created_at: Utc::now(),
        };
        (monitor, incident)
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_suppress_others() {
        let email = StubSender::new(Channel::Email, true);
        let slack = StubSender::new(Channel::Slack, false);
        let dispatcher = AlertDispatcher::new().with_sender(email.clone()).with_sender(slack.clone());
        let (monitor, incident) = fixture(true, true);

        let deliveries = dispatcher.deliver(&monitor, &incident, AlertEvent::Opened).await;

        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].channel, Channel::Email);
        assert!(!deliveries[0].is_success());
        assert_eq!(deliveries[1].channel, Channel::Slack);
        assert!(deliveries[1].is_success());
        assert_eq!(email.calls.load(Ordering::SeqCst), 1);
        assert_eq!(slack.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_email_is_recorded_as_failure() {
        let dispatcher = AlertDispatcher::new();
        let (monitor, incident) = fixture(true, true);

        let deliveries = dispatcher.deliver(&monitor, &incident, AlertEvent::Recovered).await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].channel, Channel::Email);
        assert_eq!(deliveries[0].error.as_deref(), Some("email service not configured"));
    }

    #[tokio::test]
    async fn test_disabled_channels_are_skipped() {
        let email = StubSender::new(Channel::Email, false);
        let dispatcher = AlertDispatcher::new().with_sender(email.clone());
        let (monitor, incident) = fixture(false, false);

        let deliveries = dispatcher.deliver(&monitor, &incident, AlertEvent::Opened).await;

        assert!(deliveries.is_empty());
        assert_eq!(email.calls.load(Ordering::SeqCst), 0);
    }
}
