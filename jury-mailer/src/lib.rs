//! Jury Mailer - judge credential email delivery
//!
//! This crate sends a judge their login code for the Jury judging platform
//! through direct SMTP, SendGrid or Mailgun, whichever the environment
//! configures.

pub mod config;
pub mod domain;
pub mod email;
pub mod error;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use config::{check_startup, ConfigError, ConfigResolver};
pub use domain::{Recipient, TransportKind};
pub use error::{EmailError, Result};
pub use service::EmailDispatcher;
