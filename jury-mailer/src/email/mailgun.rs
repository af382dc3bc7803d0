//! Mailgun messages API delivery

use super::provider::{api_error, request_error, DeliveryError, EmailTransport};
use crate::domain::{MailgunCredentials, Recipient, RenderedMessage, Sender, TransportKind};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const MAILGUN_API_BASE: &str = "https://api.mailgun.net/v3";
pub const MAILGUN_EU_API_BASE: &str = "https://api.eu.mailgun.net/v3";

/// Whole-request bound for one send
pub const MAILGUN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport backed by the Mailgun HTTP API
pub struct MailgunTransport {
    client: reqwest::Client,
    api_key: String,
    domain: String,
    api_base: String,
    timeout: Duration,
}

impl MailgunTransport {
    /// An explicit API base wins over the EU region flag
    pub fn from_credentials(credentials: &MailgunCredentials) -> Self {
        let api_base = match &credentials.api_base {
            Some(base) => base.clone(),
            None if credentials.is_eu => MAILGUN_EU_API_BASE.to_string(),
            None => MAILGUN_API_BASE.to_string(),
        };

        Self {
            client: reqwest::Client::new(),
            api_key: credentials.api_key.clone(),
            domain: credentials.domain.clone(),
            api_base,
            timeout: MAILGUN_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/messages",
            self.api_base.trim_end_matches('/'),
            self.domain
        )
    }
}

#[async_trait]
impl EmailTransport for MailgunTransport {
    async fn deliver(
        &self,
        message: &RenderedMessage,
        recipient: &Recipient,
        sender: &Sender,
    ) -> Result<(), DeliveryError> {
        let form = [
            ("from", sender.mailbox()),
            ("to", recipient.mailbox()),
            ("subject", message.subject.clone()),
            ("html", message.html_body.clone()),
        ];

        let request = self
            .client
            .post(self.endpoint())
            .basic_auth("api", Some(&self.api_key))
            .form(&form);

        // The bound covers the whole exchange, including reading an error body
        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| request_error(TransportKind::Mailgun, e))?;

            if !response.status().is_success() {
                return Err(api_error(TransportKind::Mailgun, response).await);
            }
            Ok::<(), DeliveryError>(())
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DeliveryError::Timeout(self.timeout))??;

        debug!(domain = %self.domain, "Mailgun accepted message");
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Mailgun
    }
}
