use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jury_mailer::{
    check_startup, config::TelemetryConfig, email, telemetry, ConfigResolver, EmailDispatcher,
    Recipient,
};
use std::time::Duration;
use tracing::info;
use validator::Validate;

#[derive(Parser, Debug)]
#[command(name = "jury-mailer", version, about = "Send Jury judge credential emails")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate configuration and show which transport would be used
    Check,
    /// Send one credential email
    Send {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
        /// Public URL of the Jury instance, used for the login link
        #[arg(long)]
        base_url: String,
        /// Overall delivery timeout
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = ConfigResolver::from_env();

    telemetry::init(&TelemetryConfig::from_resolver(&config));

    check_startup(&config).context("invalid configuration")?;

    let mut dispatcher = EmailDispatcher::new(config);

    match cli.command {
        Command::Check => {
            println!("configuration ok, transport: {}", dispatcher.select_transport());
        }
        Command::Send {
            name,
            email: address,
            code,
            base_url,
            timeout_secs,
        } => {
            if !email::is_bare_address(&address) {
                bail!("invalid email address: {}", address);
            }
            url::Url::parse(&base_url)
                .with_context(|| format!("invalid base URL: {}", base_url))?;
            let recipient = Recipient::new(name, address, code);
            recipient.validate().context("invalid recipient")?;

            if let Some(secs) = timeout_secs {
                dispatcher = dispatcher.with_timeout(Duration::from_secs(secs));
            }

            dispatcher
                .send_credential_email(&recipient, &base_url)
                .await?;
            info!("Credential email sent to {}", recipient.email);
        }
    }

    Ok(())
}
