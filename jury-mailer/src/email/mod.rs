//! Email delivery for the Jury platform
//!
//! Three interchangeable transports deliver the same rendered message:
//! - Direct SMTP (using lettre)
//! - SendGrid HTTP API
//! - Mailgun HTTP API

pub mod mailgun;
pub mod provider;
pub mod sendgrid;
pub mod smtp;
pub mod templates;
pub mod validation;

pub use mailgun::MailgunTransport;
pub use provider::{DeliveryError, EmailTransport, SmtpStage};
pub use sendgrid::SendGridTransport;
pub use smtp::SmtpTransport;
pub use templates::{CredentialVars, TemplateError, TemplateRenderer, TemplateSource};
pub use validation::{is_bare_address, is_valid};
