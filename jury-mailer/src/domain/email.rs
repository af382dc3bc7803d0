//! Credential email domain types

use crate::email::validation::validate_address;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// The three interchangeable delivery backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Smtp,
    SendGrid,
    Mailgun,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::SendGrid => "sendgrid",
            Self::Mailgun => "mailgun",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A judge receiving their access code
#[derive(Clone, PartialEq, Eq, Validate)]
pub struct Recipient {
    pub name: String,

    #[validate(custom(function = "validate_address"))]
    pub email: String,

    /// Opaque credential code, 8 characters
    #[validate(length(equal = 8))]
    pub code: String,
}

impl Recipient {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            code: code.into(),
        }
    }

    /// "Name <address>", or the bare address when the name is empty
    pub fn mailbox(&self) -> String {
        format_mailbox(Some(&self.name), &self.email)
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipient")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("code", &"***")
            .finish()
    }
}

/// Sender identity as it appears in the From header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: Option<String>,
    pub address: String,
}

impl Sender {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    pub fn with_name(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Build the "From" address string
    pub fn mailbox(&self) -> String {
        format_mailbox(self.name.as_deref(), &self.address)
    }
}

fn format_mailbox(name: Option<&str>, address: &str) -> String {
    match name {
        Some(name) if !name.is_empty() => format!("{} <{}>", name, address),
        _ => address.to_string(),
    }
}

/// Subject and HTML body of one credential email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub html_body: String,
}

/// Whether SMTP delivery insists on a STARTTLS upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpTlsPolicy {
    /// Fail when the server does not offer STARTTLS
    #[default]
    Required,
    /// Upgrade only when STARTTLS is advertised
    Opportunistic,
}

impl FromStr for SmtpTlsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "opportunistic" => Ok(Self::Opportunistic),
            other => Err(format!("unknown SMTP TLS policy: {}", other)),
        }
    }
}

/// Credentials for the active transport. Exactly one variant is selected per send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCredentials {
    Smtp(SmtpCredentials),
    SendGrid(SendGridCredentials),
    Mailgun(MailgunCredentials),
}

impl ProviderCredentials {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Smtp(_) => TransportKind::Smtp,
            Self::SendGrid(_) => TransportKind::SendGrid,
            Self::Mailgun(_) => TransportKind::Mailgun,
        }
    }

    /// Sender identity for this transport. SMTP sends from the bare address.
    pub fn sender(&self) -> Sender {
        match self {
            Self::Smtp(c) => Sender::new(&c.from_address),
            Self::SendGrid(c) => Sender::with_name(&c.from_address, &c.from_name),
            Self::Mailgun(c) => Sender::with_name(&c.from_address, &c.from_name),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub tls: SmtpTlsPolicy,
}

impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("from_address", &self.from_address)
            .field("tls", &self.tls)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SendGridCredentials {
    pub api_key: String,
    pub from_name: String,
    pub from_address: String,
    /// Overrides the public API base (proxies, tests)
    pub api_base: Option<String>,
}

impl fmt::Debug for SendGridCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendGridCredentials")
            .field("api_key", &"***")
            .field("from_name", &self.from_name)
            .field("from_address", &self.from_address)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct MailgunCredentials {
    pub api_key: String,
    pub domain: String,
    pub is_eu: bool,
    pub from_name: String,
    pub from_address: String,
    /// Overrides the regional API base (proxies, tests)
    pub api_base: Option<String>,
}

impl fmt::Debug for MailgunCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailgunCredentials")
            .field("api_key", &"***")
            .field("domain", &self.domain)
            .field("is_eu", &self.is_eu)
            .field("from_name", &self.from_name)
            .field("from_address", &self.from_address)
            .field("api_base", &self.api_base)
            .finish()
    }
}
