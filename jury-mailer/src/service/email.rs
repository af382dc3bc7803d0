//! Credential email dispatch
//!
//! Picks a transport from the live configuration on every call
//! (Mailgun > SendGrid > SMTP), renders the credential template and hands the
//! message to the selected transport exactly once.

use crate::config::{keys, ConfigError, ConfigResolver, DEFAULT_SMTP_PORT};
use crate::domain::{
    MailgunCredentials, ProviderCredentials, Recipient, RenderedMessage, SendGridCredentials,
    Sender, SmtpCredentials, SmtpTlsPolicy, TransportKind,
};
use crate::email::{
    DeliveryError, EmailTransport, MailgunTransport, SendGridTransport, SmtpTransport,
    TemplateRenderer,
};
use crate::error::{EmailError, Result};
use crate::telemetry::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, Span};

/// Subject line of every credential email
pub fn subject_for(app_name: &str) -> String {
    format!("Jury Judging Platform [{}]", app_name)
}

/// Transport precedence: Mailgun when its key and domain are set, else
/// SendGrid when its key is set, else SMTP.
pub fn select_transport(config: &ConfigResolver) -> TransportKind {
    if config.is_complete(&[keys::MAILGUN_API_KEY, keys::MAILGUN_DOMAIN]) {
        TransportKind::Mailgun
    } else if config.is_complete(&[keys::SENDGRID_API_KEY]) {
        TransportKind::SendGrid
    } else {
        TransportKind::Smtp
    }
}

/// Read the credential set for `kind`
pub fn resolve_credentials(
    kind: TransportKind,
    config: &ConfigResolver,
) -> std::result::Result<ProviderCredentials, ConfigError> {
    let from_address = config.get_required(keys::EMAIL_FROM)?;

    let credentials = match kind {
        TransportKind::Smtp => {
            let port_value = config.get_optional(keys::EMAIL_PORT, DEFAULT_SMTP_PORT);
            let port = port_value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: keys::EMAIL_PORT.to_string(),
                value: port_value.clone(),
            })?;

            let tls = match config.get(keys::EMAIL_SMTP_TLS) {
                Some(value) => value.parse::<SmtpTlsPolicy>().map_err(|_| ConfigError::Invalid {
                    key: keys::EMAIL_SMTP_TLS.to_string(),
                    value,
                })?,
                None => SmtpTlsPolicy::default(),
            };

            ProviderCredentials::Smtp(SmtpCredentials {
                host: config.get_required(keys::EMAIL_HOST)?,
                port,
                username: config.get_required(keys::EMAIL_USERNAME)?,
                password: config.get_required(keys::EMAIL_PASSWORD)?,
                from_address,
                tls,
            })
        }
        TransportKind::SendGrid => ProviderCredentials::SendGrid(SendGridCredentials {
            api_key: config.get_required(keys::SENDGRID_API_KEY)?,
            from_name: config.get_required(keys::EMAIL_FROM_NAME)?,
            from_address,
            api_base: config.get(keys::SENDGRID_API_BASE),
        }),
        TransportKind::Mailgun => ProviderCredentials::Mailgun(MailgunCredentials {
            api_key: config.get_required(keys::MAILGUN_API_KEY)?,
            domain: config.get_required(keys::MAILGUN_DOMAIN)?,
            is_eu: config
                .get_optional(keys::MAILGUN_IS_EU, "false")
                .eq_ignore_ascii_case("true"),
            from_name: config.get_required(keys::EMAIL_FROM_NAME)?,
            from_address,
            api_base: config.get(keys::MAILGUN_API_BASE),
        }),
    };

    Ok(credentials)
}

/// Builds an [`EmailTransport`] for a resolved credential set.
///
/// Dispatcher tests swap this out to avoid real network calls.
#[cfg_attr(test, mockall::automock)]
pub trait TransportFactory: Send + Sync {
    fn create(&self, credentials: &ProviderCredentials) -> Box<dyn EmailTransport>;
}

/// Builds the real SMTP, SendGrid and Mailgun transports
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, credentials: &ProviderCredentials) -> Box<dyn EmailTransport> {
        match credentials {
            ProviderCredentials::Smtp(c) => Box::new(SmtpTransport::from_credentials(c.clone())),
            ProviderCredentials::SendGrid(c) => Box::new(SendGridTransport::from_credentials(c)),
            ProviderCredentials::Mailgun(c) => Box::new(MailgunTransport::from_credentials(c)),
        }
    }
}

/// Sends judge credential emails through whichever transport is configured.
///
/// Holds no mutable state; one dispatcher can serve concurrent sends.
pub struct EmailDispatcher {
    config: ConfigResolver,
    renderer: TemplateRenderer,
    factory: Arc<dyn TransportFactory>,
    timeout: Option<Duration>,
}

impl EmailDispatcher {
    pub fn new(config: ConfigResolver) -> Self {
        let renderer = TemplateRenderer::from_config(&config);
        Self {
            config,
            renderer,
            factory: Arc::new(DefaultTransportFactory),
            timeout: None,
        }
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Overall bound on each delivery, on top of the transports' own timeouts
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &ConfigResolver {
        &self.config
    }

    /// Transport the next send would use
    pub fn select_transport(&self) -> TransportKind {
        select_transport(&self.config)
    }

    /// Subject and body for `recipient`
    pub fn render_message(
        &self,
        recipient: &Recipient,
        base_url: &str,
        app_name: &str,
    ) -> Result<RenderedMessage> {
        let html_body =
            self.renderer
                .render_credential(&recipient.name, base_url, &recipient.code, app_name)?;

        Ok(RenderedMessage {
            subject: subject_for(app_name),
            html_body,
        })
    }

    /// Send `recipient` their credential code with a login link under
    /// `base_url`. One attempt, no retries.
    #[instrument(skip_all, fields(transport = tracing::field::Empty))]
    pub async fn send_credential_email(&self, recipient: &Recipient, base_url: &str) -> Result<()> {
        let kind = self.select_transport();
        Span::current().record("transport", kind.as_str());
        debug!("Selected {} transport", kind);

        let app_name = self.config.get_required(keys::APP_NAME)?;
        let credentials = resolve_credentials(kind, &self.config)?;
        let sender = credentials.sender();

        let message = self.render_message(recipient, base_url, &app_name)?;

        let transport = self.factory.create(&credentials);
        let started = Instant::now();
        let result = self.deliver(transport.as_ref(), &message, recipient, &sender).await;
        metrics::record_send(kind, result.is_ok(), started.elapsed());

        result.map_err(|e| EmailError::delivery(kind, e))?;

        info!("Credential email accepted by {}", kind);
        Ok(())
    }

    async fn deliver(
        &self,
        transport: &dyn EmailTransport,
        message: &RenderedMessage,
        recipient: &Recipient,
        sender: &Sender,
    ) -> std::result::Result<(), DeliveryError> {
        let delivery = transport.deliver(message, recipient, sender);
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, delivery)
                .await
                .map_err(|_| DeliveryError::Timeout(timeout))?,
            None => delivery.await,
        }
    }
}
