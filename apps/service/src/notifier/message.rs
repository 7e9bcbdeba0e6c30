use crate::database::models::{Incident, Monitor};

use super::AlertEvent;

/// Channel-neutral rendering of an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub event: AlertEvent,
    pub subject: String,
    pub headline: String,
    /// Label/value pairs in display order
    pub fields: Vec<(String, String)>,
}

impl AlertMessage {
    pub fn new(monitor: &Monitor, incident: &Incident, event: AlertEvent) -> Self {
        match event {
            AlertEvent::Opened => Self::opened(monitor, incident),
            AlertEvent::Recovered => Self::recovered(monitor, incident),
        }
    }

    fn opened(monitor: &Monitor, incident: &Incident) -> Self {
        let mut fields = vec![
            ("Monitor".to_string(), monitor.name.clone()),
            ("URL".to_string(), monitor.target.url.clone()),
            ("Status".to_string(), monitor.status.to_string()),
            ("Incident Type".to_string(), incident.kind.as_str().replace('_', " ").to_uppercase()),
            ("Time".to_string(), incident.start_time.to_rfc2822()),
        ];

        let details = &incident.details;
        if let Some(error) = &details.error_message {
            fields.push(("Error".to_string(), error.clone()));
        }
        if let Some(code) = details.status_code {
            fields.push(("Status Code".to_string(), code.to_string()));
        }
        if let Some(expected) = details.expected_status_code {
            fields.push(("Expected Status Code".to_string(), expected.to_string()));
        }
        if let Some(ms) = details.response_time_ms {
            fields.push(("Response Time".to_string(), format!("{ms}ms")));
        }

        Self {
            event: AlertEvent::Opened,
            subject: format!("Monitor Down: {}", monitor.name),
            headline: "Monitor Alert".to_string(),
            fields,
        }
    }

    fn recovered(monitor: &Monitor, incident: &Incident) -> Self {
        let recovered_at = incident.end_time.map(|t| t.to_rfc2822()).unwrap_or_else(|| "N/A".to_string());

        Self {
            event: AlertEvent::Recovered,
            subject: format!("Monitor Recovered: {}", monitor.name),
            headline: "Monitor Recovered".to_string(),
            fields: vec![
                ("Monitor".to_string(), monitor.name.clone()),
                ("URL".to_string(), monitor.target.url.clone()),
                ("Status".to_string(), "UP".to_string()),
                ("Downtime Duration".to_string(), incident.duration_string()),
                ("Recovered At".to_string(), recovered_at),
            ],
        }
    }

    /// Plain text body, one `Label: value` line per field
    pub fn text(&self) -> String {
        let mut body = format!("{}\n\n", self.headline);
        for (label, value) in &self.fields {
            body.push_str(&format!("{label}: {value}\n"));
        }
        body
    }

    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields.iter().find(|(l, _)| l == label).map(|(_, v)| v.as_str())
    }
}
