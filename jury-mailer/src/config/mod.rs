//! Configuration resolution for the Jury mailer
//!
//! All lookups go through a [`ConfigSource`] so that tests can inject an
//! in-memory map instead of touching the process environment. Values are
//! re-read on every call; nothing is cached.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Configuration keys read by the mailer
pub mod keys {
    pub const JURY_ADMIN_PASSWORD: &str = "JURY_ADMIN_PASSWORD";
    pub const EMAIL_FROM: &str = "EMAIL_FROM";
    pub const EMAIL_FROM_NAME: &str = "EMAIL_FROM_NAME";

    pub const EMAIL_HOST: &str = "EMAIL_HOST";
    pub const EMAIL_PORT: &str = "EMAIL_PORT";
    pub const EMAIL_USERNAME: &str = "EMAIL_USERNAME";
    pub const EMAIL_PASSWORD: &str = "EMAIL_PASSWORD";
    pub const EMAIL_SMTP_TLS: &str = "EMAIL_SMTP_TLS";

    pub const SENDGRID_API_KEY: &str = "SENDGRID_API_KEY";
    pub const SENDGRID_API_BASE: &str = "SENDGRID_API_BASE";

    pub const MAILGUN_API_KEY: &str = "MAILGUN_API_KEY";
    pub const MAILGUN_DOMAIN: &str = "MAILGUN_DOMAIN";
    pub const MAILGUN_IS_EU: &str = "MAILGUN_IS_EU_TRUE_FALSE";
    pub const MAILGUN_API_BASE: &str = "MAILGUN_API_BASE";

    pub const APP_NAME: &str = "VITE_JURY_NAME";
    pub const EMAIL_TEMPLATE_PATH: &str = "EMAIL_TEMPLATE_PATH";

    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    pub const LOG_FILTER: &str = "RUST_LOG";
}

/// Keys that must always be present
pub const REQUIRED_KEYS: [&str; 2] = [keys::JURY_ADMIN_PASSWORD, keys::EMAIL_FROM];

/// Direct SMTP credential set
pub const SMTP_KEYS: [&str; 3] = [keys::EMAIL_HOST, keys::EMAIL_USERNAME, keys::EMAIL_PASSWORD];

/// SendGrid credential set
pub const SENDGRID_KEYS: [&str; 2] = [keys::SENDGRID_API_KEY, keys::EMAIL_FROM_NAME];

/// Mailgun credential set
pub const MAILGUN_KEYS: [&str; 3] = [
    keys::MAILGUN_API_KEY,
    keys::MAILGUN_DOMAIN,
    keys::EMAIL_FROM_NAME,
];

pub const DEFAULT_SMTP_PORT: &str = "587";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environmental variable not defined")]
    Missing(String),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },

    #[error(
        "either all envs for smtp, sendgrid, or mailgun must be defined (one of these sets): {:?} OR {:?} OR {:?}",
        SMTP_KEYS,
        SENDGRID_KEYS,
        MAILGUN_KEYS
    )]
    NoProvider,
}

/// A read-only source of named configuration values
#[cfg_attr(test, mockall::automock)]
pub trait ConfigSource: Send + Sync {
    /// Look up a raw value. `None` means the key is not defined.
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads values from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn lookup(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// In-memory configuration, used by tests and embedders
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for MapSource
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigSource for MapSource {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Resolves configuration values with required/optional semantics.
///
/// A value that is defined but empty is treated the same as an undefined one.
#[derive(Clone)]
pub struct ConfigResolver {
    source: Arc<dyn ConfigSource>,
}

impl ConfigResolver {
    pub fn new(source: impl ConfigSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Resolver backed by the process environment
    pub fn from_env() -> Self {
        Self::new(EnvSource)
    }

    /// Non-empty value for `key`, if any
    pub fn get(&self, key: &str) -> Option<String> {
        self.source.lookup(key).filter(|value| !value.is_empty())
    }

    /// Value for `key`, or [`ConfigError::Missing`] when absent or empty
    pub fn get_required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    /// Value for `key`, or `default` when absent or empty
    pub fn get_optional(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// True iff every key resolves to a non-empty value
    pub fn is_complete(&self, keys: &[&str]) -> bool {
        keys.iter().all(|key| self.get(key).is_some())
    }
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigResolver").finish_non_exhaustive()
    }
}

/// Startup precondition: required keys are set and at least one provider
/// credential set is complete. `main` exits with this error otherwise.
pub fn check_startup(config: &ConfigResolver) -> Result<(), ConfigError> {
    for key in REQUIRED_KEYS {
        config.get_required(key)?;
    }

    let any_provider = config.is_complete(&SMTP_KEYS)
        || config.is_complete(&SENDGRID_KEYS)
        || config.is_complete(&MAILGUN_KEYS);

    if !any_provider {
        return Err(ConfigError::NoProvider);
    }

    Ok(())
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// "text" or "json"
    pub log_format: String,
    /// `EnvFilter` directives
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            log_filter: "jury_mailer=info".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_resolver(config: &ConfigResolver) -> Self {
        let defaults = Self::default();
        Self {
            log_format: config
                .get_optional(keys::LOG_FORMAT, &defaults.log_format)
                .to_lowercase(),
            log_filter: config.get_optional(keys::LOG_FILTER, &defaults.log_filter),
        }
    }

    pub fn is_json(&self) -> bool {
        self.log_format == "json"
    }
}
