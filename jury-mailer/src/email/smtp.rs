//! Direct SMTP delivery using lettre's connection-level client
//!
//! Each delivery opens a fresh session and walks it step by step so that a
//! failure can be attributed to the exact stage that broke:
//! connect, greeting/EHLO, STARTTLS, AUTH PLAIN, MAIL, RCPT, DATA, body.

use super::provider::{DeliveryError, EmailTransport, SmtpStage};
use crate::domain::{
    Recipient, RenderedMessage, Sender, SmtpCredentials, SmtpTlsPolicy, TransportKind,
};
use async_trait::async_trait;
use lettre::{
    message::{header, header::ContentType, Mailbox},
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{AsyncSmtpConnection, TlsParameters},
        commands::{Data, Mail, Rcpt},
        extension::{ClientId, Extension},
        Error as SmtpError,
    },
    Address, Message,
};
use std::time::Duration;
use tracing::debug;

/// Bound on establishing the session (TCP dial, greeting, EHLO)
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const HELLO_NAME: &str = "localhost";

/// SMTP transport that talks to a relay directly
pub struct SmtpTransport {
    credentials: SmtpCredentials,
    connect_timeout: Duration,
}

impl SmtpTransport {
    pub fn from_credentials(credentials: SmtpCredentials) -> Self {
        Self {
            credentials,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build the RFC 5322 message: From, To, Subject, MIME-Version and an
    /// HTML body in UTF-8
    pub fn build_message(
        message: &RenderedMessage,
        recipient: &Recipient,
        sender: &Sender,
    ) -> Result<Message, DeliveryError> {
        let from = Mailbox::new(sender.name.clone(), parse_address(&sender.address)?);
        let to_name = Some(recipient.name.clone()).filter(|n| !n.is_empty());
        let to = Mailbox::new(to_name, parse_address(&recipient.email)?);

        Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .header(header::MIME_VERSION_1_0)
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .map_err(|e| DeliveryError::InvalidAddress(e.to_string()))
    }

    async fn connect(&self, hello: &ClientId) -> Result<AsyncSmtpConnection, DeliveryError> {
        let server = (self.credentials.host.as_str(), self.credentials.port);
        let connecting = AsyncSmtpConnection::connect_tokio1(
            server,
            Some(self.connect_timeout),
            hello,
            None,
            None,
        );

        match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                let stage = if is_reply(&e) {
                    SmtpStage::ClientInit
                } else {
                    SmtpStage::Connect
                };
                Err(DeliveryError::Connect {
                    stage,
                    message: e.to_string(),
                })
            }
            Err(_) => Err(DeliveryError::Connect {
                stage: SmtpStage::Connect,
                message: format!("no response within {:?}", self.connect_timeout),
            }),
        }
    }

    async fn start_tls(
        &self,
        conn: &mut AsyncSmtpConnection,
        hello: &ClientId,
    ) -> Result<(), DeliveryError> {
        let offered = conn.server_info().supports_feature(Extension::StartTls);
        if !offered {
            return match self.credentials.tls {
                SmtpTlsPolicy::Opportunistic => {
                    debug!(host = %self.credentials.host, "STARTTLS not offered, continuing in plaintext");
                    Ok(())
                }
                SmtpTlsPolicy::Required => Err(DeliveryError::Connect {
                    stage: SmtpStage::StartTls,
                    message: "server does not support STARTTLS".to_string(),
                }),
            };
        }

        // Relays commonly present self-signed certificates
        let parameters = TlsParameters::builder(self.credentials.host.clone())
            .dangerous_accept_invalid_certs(true)
            .build()
            .map_err(|e| DeliveryError::Connect {
                stage: SmtpStage::StartTls,
                message: e.to_string(),
            })?;

        conn.starttls(parameters, hello)
            .await
            .map_err(|e| DeliveryError::Connect {
                stage: SmtpStage::StartTls,
                message: e.to_string(),
            })
    }

    async fn run_session(
        &self,
        conn: &mut AsyncSmtpConnection,
        hello: &ClientId,
        envelope_from: Address,
        envelope_to: Address,
        body: &[u8],
    ) -> Result<(), DeliveryError> {
        self.start_tls(conn, hello).await?;

        let credentials = Credentials::new(
            self.credentials.username.clone(),
            self.credentials.password.clone(),
        );
        conn.auth(&[Mechanism::Plain], &credentials)
            .await
            .map_err(|e| DeliveryError::Auth(e.to_string()))?;

        conn.command(Mail::new(Some(envelope_from), vec![]))
            .await
            .map_err(|e| protocol_error(SmtpStage::Sender, e))?;

        conn.command(Rcpt::new(envelope_to, vec![]))
            .await
            .map_err(|e| protocol_error(SmtpStage::Recipient, e))?;

        conn.command(Data)
            .await
            .map_err(|e| protocol_error(SmtpStage::DataOpen, e))?;

        conn.message(body).await.map_err(|e| {
            // A reply to the final "." means the body was written
            let stage = if is_reply(&e) {
                SmtpStage::DataClose
            } else {
                SmtpStage::DataWrite
            };
            protocol_error(stage, e)
        })?;

        Ok(())
    }
}

#[async_trait]
impl EmailTransport for SmtpTransport {
    async fn deliver(
        &self,
        message: &RenderedMessage,
        recipient: &Recipient,
        sender: &Sender,
    ) -> Result<(), DeliveryError> {
        let email = Self::build_message(message, recipient, sender)?;
        let envelope_from = parse_address(&sender.address)?;
        let envelope_to = parse_address(&recipient.email)?;
        let body = email.formatted();

        let hello = ClientId::Domain(HELLO_NAME.to_string());
        let mut conn = self.connect(&hello).await?;

        match self
            .run_session(&mut conn, &hello, envelope_from, envelope_to, &body)
            .await
        {
            Ok(()) => {
                // The message is accepted once the server answers the final "."
                let _ = conn.quit().await;
                debug!(host = %self.credentials.host, port = self.credentials.port, "SMTP session complete");
                Ok(())
            }
            Err(e) => {
                conn.abort().await;
                Err(e)
            }
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Smtp
    }
}

fn parse_address(address: &str) -> Result<Address, DeliveryError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {}", address, e)))
}

/// The server answered, with a negative or unparsable reply
fn is_reply(e: &SmtpError) -> bool {
    e.status().is_some() || e.is_response()
}

fn protocol_error(stage: SmtpStage, e: SmtpError) -> DeliveryError {
    DeliveryError::Protocol {
        stage,
        code: e.status().and_then(|code| code.to_string().parse().ok()),
        message: e.to_string(),
    }
}
