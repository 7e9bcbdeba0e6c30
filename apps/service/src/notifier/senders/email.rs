//! Email alerts over SMTP.

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::{ChannelSender, SenderError};
use crate::config::SmtpConfig;
use crate::database::models::Channel;
use crate::notifier::AlertMessage;

/// Port on which SMTP speaks TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSender {
    pub fn new(config: &SmtpConfig, recipient: &str) -> Result<Self, SenderError> {
        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let mut builder = builder.port(config.port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from: Mailbox = match &config.from {
            Some(from) => from.parse()?,
            None => format!("API Monitor <{}>", config.username.as_deref().unwrap_or("apimon@localhost")).parse()?,
        };

        Ok(Self { mailer: builder.build(), from, to: recipient.parse()? })
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), SenderError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.text())
            .map_err(|e| SenderError::Build(e.to_string()))?;

        self.mailer.send(email).await?;
        info!(to = %self.to, subject = %message.subject, "Alert email sent");
        Ok(())
    }
}
