//! Unified error handling for credential email dispatch

use crate::config::ConfigError;
use crate::domain::TransportKind;
use crate::email::{DeliveryError, TemplateError};
use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, EmailError>;

/// Email dispatch error types
#[derive(Error, Debug)]
pub enum EmailError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("{transport} delivery failed: {source}")]
    Delivery {
        transport: TransportKind,
        #[source]
        source: DeliveryError,
    },
}

impl EmailError {
    pub fn delivery(transport: TransportKind, source: DeliveryError) -> Self {
        Self::Delivery { transport, source }
    }

    /// Transport that failed, for delivery errors
    pub fn transport(&self) -> Option<TransportKind> {
        match self {
            Self::Delivery { transport, .. } => Some(*transport),
            _ => None,
        }
    }

    pub fn as_delivery(&self) -> Option<&DeliveryError> {
        match self {
            Self::Delivery { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Worth retrying later; configuration and template errors never are
    pub fn is_transient(&self) -> bool {
        self.as_delivery().is_some_and(DeliveryError::is_transient)
    }
}
