//! End-to-end credential email dispatch

mod common;

use common::{MockSmtpServer, SmtpScript, PASSWORD, USERNAME};
use jury_mailer::config::{keys, MapSource};
use jury_mailer::{ConfigResolver, EmailDispatcher, EmailError, Recipient, TransportKind};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_env() -> MapSource {
    MapSource::new()
        .with(keys::JURY_ADMIN_PASSWORD, "admin")
        .with(keys::EMAIL_FROM, "jury@example.com")
        .with(keys::EMAIL_FROM_NAME, "HackFest Jury")
        .with(keys::APP_NAME, "HackFest")
}

fn ada() -> Recipient {
    Recipient::new("Ada", "ada@example.com", "ABCD1234")
}

#[tokio::test]
async fn test_dispatch_through_mailgun() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mg.example.com/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"message":"Queued"}"#))
        .expect(1)
        .mount(&server)
        .await;

    // SMTP is also complete; Mailgun still wins
    let env = base_env()
        .with(keys::EMAIL_HOST, "smtp.example.com")
        .with(keys::EMAIL_USERNAME, USERNAME)
        .with(keys::EMAIL_PASSWORD, PASSWORD)
        .with(keys::MAILGUN_API_KEY, "key-test")
        .with(keys::MAILGUN_DOMAIN, "mg.example.com")
        .with(keys::MAILGUN_API_BASE, server.uri());

    let dispatcher = EmailDispatcher::new(ConfigResolver::new(env));
    assert_eq!(dispatcher.select_transport(), TransportKind::Mailgun);

    dispatcher
        .send_credential_email(&ada(), "https://judge.example")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let form: HashMap<String, String> = url::form_urlencoded::parse(&requests[0].body)
        .into_owned()
        .collect();
    assert_eq!(form["subject"], "Jury Judging Platform [HackFest]");
    assert_eq!(form["to"], "Ada <ada@example.com>");
    assert_eq!(form["from"], "HackFest Jury <jury@example.com>");

    let html = &form["html"];
    assert!(html.contains("<span>ABCD</span><span>1234</span>"));
    assert!(html.contains("code=ABCD1234"));
    assert!(html.contains("judge.example"));
    assert!(html.contains("HackFest"));
}

#[tokio::test]
async fn test_dispatch_through_sendgrid() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let env = base_env()
        .with(keys::SENDGRID_API_KEY, "SG.key")
        .with(keys::SENDGRID_API_BASE, server.uri());

    EmailDispatcher::new(ConfigResolver::new(env))
        .send_credential_email(&ada(), "https://judge.example")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["subject"], "Jury Judging Platform [HackFest]");
    assert_eq!(body["personalizations"][0]["to"][0]["email"], "ada@example.com");
    assert!(body["content"][0]["value"]
        .as_str()
        .unwrap()
        .contains("ABCD1234"));
}

#[tokio::test]
async fn test_dispatch_through_smtp() {
    let smtp = MockSmtpServer::start(SmtpScript::default()).await;

    let env = base_env()
        .with(keys::EMAIL_HOST, "127.0.0.1")
        .with(keys::EMAIL_PORT, smtp.port().to_string())
        .with(keys::EMAIL_USERNAME, USERNAME)
        .with(keys::EMAIL_PASSWORD, PASSWORD)
        .with(keys::EMAIL_SMTP_TLS, "opportunistic");

    let dispatcher = EmailDispatcher::new(ConfigResolver::new(env));
    assert_eq!(dispatcher.select_transport(), TransportKind::Smtp);

    dispatcher
        .send_credential_email(&ada(), "https://judge.example")
        .await
        .unwrap();

    let transcript = smtp.transcript();
    assert!(transcript.saw("MAIL FROM:<jury@example.com>"));
    assert!(transcript.saw("RCPT TO:<ada@example.com>"));
    assert!(transcript.data.contains("Subject: Jury Judging Platform [HackFest]"));
}

#[tokio::test]
async fn test_dispatch_provider_error_carries_transport() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream failure"))
        .mount(&server)
        .await;

    let env = base_env()
        .with(keys::MAILGUN_API_KEY, "key-test")
        .with(keys::MAILGUN_DOMAIN, "mg.example.com")
        .with(keys::MAILGUN_API_BASE, server.uri());

    let err = EmailDispatcher::new(ConfigResolver::new(env))
        .send_credential_email(&ada(), "https://judge.example")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EmailError::Delivery {
            transport: TransportKind::Mailgun,
            ..
        }
    ));
    assert!(err.is_transient());
    assert!(err.to_string().starts_with("mailgun delivery failed"));
}

#[tokio::test]
async fn test_dispatch_with_template_file() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let template = std::env::temp_dir().join(format!("jury-dispatch-{}.html", std::process::id()));
    std::fs::write(&template, "<b>{{ CodeLeft }}-{{ CodeRight }}</b> for {{ Name }}").unwrap();

    let env = base_env()
        .with(keys::MAILGUN_API_KEY, "key-test")
        .with(keys::MAILGUN_DOMAIN, "mg.example.com")
        .with(keys::MAILGUN_API_BASE, server.uri())
        .with(keys::EMAIL_TEMPLATE_PATH, template.to_string_lossy());

    EmailDispatcher::new(ConfigResolver::new(env))
        .send_credential_email(&ada(), "https://judge.example")
        .await
        .unwrap();
    std::fs::remove_file(&template).unwrap();

    let requests = server.received_requests().await.unwrap();
    let form: HashMap<String, String> = url::form_urlencoded::parse(&requests[0].body)
        .into_owned()
        .collect();
    assert_eq!(form["html"], "<b>ABCD-1234</b> for Ada");
}
