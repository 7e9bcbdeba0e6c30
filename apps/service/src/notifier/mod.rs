//! Alert delivery boundary.
//!
//! The [`Notifier`] fans an incident event out to every channel enabled on the
//! monitor and returns one [`ChannelDelivery`] per attempt. Delivery never
//! fails as a whole; callers inspect the results and record them.

pub mod dispatcher;
pub mod message;
pub mod senders;

pub use dispatcher::AlertDispatcher;
pub use message::AlertMessage;

use chrono::{DateTime, Utc};
use std::fmt;

use crate::database::models::{Channel, Incident, Monitor};

/// Incident transition an alert is sent for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEvent {
    Opened,
    Recovered,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertEvent::Opened => write!(f, "opened"),
            AlertEvent::Recovered => write!(f, "recovered"),
        }
    }
}

/// Outcome of one delivery attempt on one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDelivery {
    pub channel: Channel,
    pub sent_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl ChannelDelivery {
    pub fn succeeded(channel: Channel) -> Self {
        Self { channel, sent_at: Utc::now(), error: None }
    }

    pub fn failed(channel: Channel, error: impl Into<String>) -> Self {
        Self { channel, sent_at: Utc::now(), error: Some(error.into()) }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt delivery on every channel enabled for `monitor`
    async fn deliver(&self, monitor: &Monitor, incident: &Incident, event: AlertEvent) -> Vec<ChannelDelivery>;
}
