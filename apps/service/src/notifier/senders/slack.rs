//! Slack incoming-webhook alerts.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ChannelSender, SenderError};
use crate::database::models::Channel;
use crate::notifier::{AlertEvent, AlertMessage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fields shown in the Slack section block
const SECTION_FIELDS: [&str; 5] = ["Monitor", "Status", "URL", "Incident Type", "Downtime Duration"];

pub struct SlackSender {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackSender {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, SenderError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, webhook_url: webhook_url.into() })
    }

    fn payload(message: &AlertMessage) -> Value {
        let icon = match message.event {
            AlertEvent::Opened => ":rotating_light:",
            AlertEvent::Recovered => ":white_check_mark:",
        };

        let fields: Vec<Value> = SECTION_FIELDS
            .iter()
            .filter_map(|label| message.field(label).map(|value| (label, value)))
            .map(|(label, value)| json!({ "type": "mrkdwn", "text": format!("*{label}:*\n{value}") }))
            .collect();

        json!({
            "text": format!("{icon} {}", message.subject),
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": format!("{icon} {}", message.headline) }
                },
                { "type": "section", "fields": fields }
            ]
        })
    }
}

#[async_trait]
impl ChannelSender for SlackSender {
    fn channel(&self) -> Channel {
        Channel::Slack
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), SenderError> {
        let response = self.client.post(&self.webhook_url).json(&Self::payload(message)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}
