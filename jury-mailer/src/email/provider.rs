//! Transport trait and delivery error types

use crate::domain::{Recipient, RenderedMessage, Sender, TransportKind};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Steps of an SMTP session, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpStage {
    Connect,
    ClientInit,
    StartTls,
    Auth,
    Sender,
    Recipient,
    DataOpen,
    DataWrite,
    DataClose,
}

impl SmtpStage {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Connect => "failed to connect to email server",
            Self::ClientInit => "failed to create SMTP client",
            Self::StartTls => "failed to start email TLS client",
            Self::Auth => "failed to authenticate SMTP client",
            Self::Sender => "failed to set email sender",
            Self::Recipient => "failed to set email recipient",
            Self::DataOpen => "failed to get email writer",
            Self::DataWrite => "failed to write email body",
            Self::DataClose => "failed to close email writer",
        }
    }

    /// Stages that establish the session rather than carry the message
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::Connect | Self::ClientInit | Self::StartTls | Self::Auth
        )
    }
}

/// Delivery error types
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Connection could not be established (dial, greeting/EHLO, STARTTLS)
    #[error("{}: {message}", .stage.description())]
    Connect { stage: SmtpStage, message: String },

    #[error("failed to authenticate SMTP client: {0}")]
    Auth(String),

    /// An SMTP command was rejected or the session broke mid-message
    #[error("{}: {message}", .stage.description())]
    Protocol {
        stage: SmtpStage,
        code: Option<u16>,
        message: String,
    },

    /// HTTP-level failure from SendGrid or Mailgun
    #[error("{provider} API error: {message}")]
    ProviderApi {
        provider: TransportKind,
        status: Option<u16>,
        message: String,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl DeliveryError {
    /// SMTP stage the failure happened in, if any
    pub fn stage(&self) -> Option<SmtpStage> {
        match self {
            Self::Connect { stage, .. } | Self::Protocol { stage, .. } => Some(*stage),
            Self::Auth(_) => Some(SmtpStage::Auth),
            _ => None,
        }
    }

    /// The transport could not be set up; no recipient was ever addressed
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Auth(_))
    }

    /// Failures worth retrying later: timeouts, SMTP 4xx, HTTP 429/5xx and
    /// network errors without a status
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Protocol { code, .. } => matches!(code, Some(400..=499)),
            Self::ProviderApi { status, .. } => match status {
                Some(status) => *status == 429 || *status >= 500,
                None => true,
            },
            _ => false,
        }
    }
}

/// Error for an HTTP request that got no usable response
pub(crate) fn request_error(provider: TransportKind, e: reqwest::Error) -> DeliveryError {
    DeliveryError::ProviderApi {
        provider,
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

/// Error for a non-2xx response, carrying the body when it can be read
pub(crate) async fn api_error(provider: TransportKind, response: reqwest::Response) -> DeliveryError {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("<body unavailable: {}>", e),
    };
    DeliveryError::ProviderApi {
        provider,
        status: Some(status),
        message: format!("request failed (status {}): {}", status, body),
    }
}

/// A backend that delivers a rendered message to one recipient
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Deliver once. Every call is independent; no state survives it.
    async fn deliver(
        &self,
        message: &RenderedMessage,
        recipient: &Recipient,
        sender: &Sender,
    ) -> Result<(), DeliveryError>;

    fn kind(&self) -> TransportKind;
}
