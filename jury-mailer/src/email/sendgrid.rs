//! SendGrid v3 mail-send delivery

use super::provider::{api_error, request_error, DeliveryError, EmailTransport};
use crate::domain::{Recipient, RenderedMessage, SendGridCredentials, Sender, TransportKind};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

pub const SENDGRID_API_BASE: &str = "https://api.sendgrid.com";

#[derive(Debug, Serialize)]
struct MailSendRequest<'a> {
    personalizations: [Personalization<'a>; 1],
    from: EmailAddress<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: [EmailAddress<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

/// Transport backed by the SendGrid HTTP API.
///
/// No request timeout is applied here; bound it from the caller.
pub struct SendGridTransport {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl SendGridTransport {
    pub fn from_credentials(credentials: &SendGridCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: credentials.api_key.clone(),
            api_base: credentials
                .api_base
                .clone()
                .unwrap_or_else(|| SENDGRID_API_BASE.to_string()),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self) -> String {
        format!("{}/v3/mail/send", self.api_base.trim_end_matches('/'))
    }
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s).filter(|s| !s.is_empty())
}

#[async_trait]
impl EmailTransport for SendGridTransport {
    async fn deliver(
        &self,
        message: &RenderedMessage,
        recipient: &Recipient,
        sender: &Sender,
    ) -> Result<(), DeliveryError> {
        let request = MailSendRequest {
            personalizations: [Personalization {
                to: [EmailAddress {
                    email: &recipient.email,
                    name: non_empty(&recipient.name),
                }],
            }],
            from: EmailAddress {
                email: &sender.address,
                name: sender.name.as_deref().and_then(non_empty),
            },
            subject: &message.subject,
            content: [Content {
                content_type: "text/html",
                value: &message.html_body,
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(TransportKind::SendGrid, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(TransportKind::SendGrid, response).await);
        }

        debug!(status = status.as_u16(), "SendGrid accepted message");
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::SendGrid
    }
}
