use async_trait::async_trait;
use thiserror::Error;

use super::AlertMessage;
use crate::database::models::Channel;

pub mod email;
pub mod slack;

pub use email::EmailSender;
pub use slack::SlackSender;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("{0} service not configured")]
    NotConfigured(Channel),
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Email build error: {0}")]
    Build(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

/// A sender for one channel type.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, message: &AlertMessage) -> Result<(), SenderError>;
}
