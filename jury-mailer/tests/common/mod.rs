//! Common test utilities: a scripted in-process SMTP server

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use jury_mailer::domain::{SmtpCredentials, SmtpTlsPolicy};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::TlsAcceptor;

pub const USERNAME: &str = "jury";
pub const PASSWORD: &str = "secret";

/// Replies the mock server gives at each step of a session
#[derive(Debug, Clone)]
pub struct SmtpScript {
    /// Never send a greeting; hold the connection open
    pub silent: bool,
    pub greeting: String,
    pub advertise_starttls: bool,
    pub starttls_reply: String,
    pub mail_reply: String,
    pub rcpt_reply: String,
    pub data_reply: String,
    pub end_of_data_reply: String,
}

impl SmtpScript {
    /// Advertise STARTTLS and upgrade with a self-signed certificate
    pub fn with_starttls() -> Self {
        Self {
            advertise_starttls: true,
            starttls_reply: "220 2.0.0 Ready to start TLS".to_string(),
            ..Self::default()
        }
    }

    fn upgrades(&self) -> bool {
        self.advertise_starttls && self.starttls_reply.starts_with("220")
    }
}

impl Default for SmtpScript {
    fn default() -> Self {
        Self {
            silent: false,
            greeting: "220 mock.jury.local ESMTP ready".to_string(),
            advertise_starttls: false,
            starttls_reply: "454 4.7.0 TLS not available".to_string(),
            mail_reply: "250 2.1.0 Sender OK".to_string(),
            rcpt_reply: "250 2.1.5 Recipient OK".to_string(),
            data_reply: "354 Start mail input; end with <CRLF>.<CRLF>".to_string(),
            end_of_data_reply: "250 2.0.0 Queued".to_string(),
        }
    }
}

/// What the server saw
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    pub commands: Vec<String>,
    pub authenticated_as: Option<String>,
    pub tls_established: bool,
    /// AUTH succeeded on the encrypted channel
    pub authenticated_over_tls: bool,
    pub data: String,
}

impl Transcript {
    pub fn saw(&self, prefix: &str) -> bool {
        self.commands.iter().any(|c| c.starts_with(prefix))
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    transcript: Arc<Mutex<Transcript>>,
}

impl MockSmtpServer {
    pub async fn start(script: SmtpScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transcript = Arc::new(Mutex::new(Transcript::default()));
        let acceptor = script.upgrades().then(tls_acceptor);

        let shared = transcript.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let script = script.clone();
                let transcript = shared.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    handle_session(socket, script, transcript, acceptor).await;
                });
            }
        });

        Self { addr, transcript }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.lock().unwrap().clone()
    }

    /// Credentials pointing at this server with the default user
    pub fn credentials(&self, tls: SmtpTlsPolicy) -> SmtpCredentials {
        SmtpCredentials {
            host: "127.0.0.1".to_string(),
            port: self.port(),
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
            from_address: "jury@example.com".to_string(),
            tls,
        }
    }
}

/// Acceptor with a fresh self-signed certificate for 127.0.0.1
fn tls_acceptor() -> TlsAcceptor {
    // Lets every rustls user in the test process agree on a provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string(), "localhost".to_string()])
            .unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert.der().clone()], key)
    .unwrap();

    TlsAcceptor::from(Arc::new(config))
}

async fn reply<S>(stream: &mut BufReader<S>, line: &str) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let writer = stream.get_mut();
    writer.write_all(format!("{}\r\n", line).as_bytes()).await?;
    writer.flush().await
}

async fn next_line<S>(stream: &mut BufReader<S>) -> Option<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = String::new();
    match stream.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

/// How a command loop ended
enum SessionEnd {
    Closed,
    StartTls,
}

async fn handle_session(
    socket: TcpStream,
    script: SmtpScript,
    transcript: Arc<Mutex<Transcript>>,
    acceptor: Option<TlsAcceptor>,
) {
    let mut stream = BufReader::new(socket);

    if script.silent {
        // Keep the socket open until the client gives up
        while next_line(&mut stream).await.is_some() {}
        return;
    }

    if reply(&mut stream, &script.greeting).await.is_err() {
        return;
    }

    if let SessionEnd::StartTls = run_commands(&mut stream, &script, &transcript, false).await {
        let Some(acceptor) = acceptor else {
            return;
        };
        let Ok(tls) = acceptor.accept(stream.into_inner()).await else {
            return;
        };
        transcript.lock().unwrap().tls_established = true;

        let mut stream = BufReader::new(tls);
        run_commands(&mut stream, &script, &transcript, true).await;
    }
}

async fn run_commands<S>(
    stream: &mut BufReader<S>,
    script: &SmtpScript,
    transcript: &Arc<Mutex<Transcript>>,
    encrypted: bool,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(line) = next_line(stream).await {
        transcript.lock().unwrap().commands.push(line.clone());
        let upper = line.to_ascii_uppercase();

        let response = if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            let mut ehlo = String::from("250-mock.jury.local\r\n");
            if script.advertise_starttls && !encrypted {
                ehlo.push_str("250-STARTTLS\r\n");
            }
            ehlo.push_str("250 AUTH PLAIN LOGIN");
            ehlo
        } else if upper.starts_with("STARTTLS") {
            if reply(stream, &script.starttls_reply).await.is_err() {
                return SessionEnd::Closed;
            }
            if script.upgrades() && !encrypted {
                return SessionEnd::StartTls;
            }
            continue;
        } else if upper.starts_with("AUTH PLAIN ") {
            match decode_plain(&line["AUTH PLAIN ".len()..]) {
                Some((user, pass)) if user == USERNAME && pass == PASSWORD => {
                    let mut seen = transcript.lock().unwrap();
                    seen.authenticated_as = Some(user);
                    seen.authenticated_over_tls = encrypted;
                    "235 2.7.0 Authentication successful".to_string()
                }
                _ => "535 5.7.8 Authentication credentials invalid".to_string(),
            }
        } else if upper.starts_with("MAIL FROM") {
            script.mail_reply.clone()
        } else if upper.starts_with("RCPT TO") {
            script.rcpt_reply.clone()
        } else if upper == "DATA" {
            if reply(stream, &script.data_reply).await.is_err() {
                return SessionEnd::Closed;
            }
            if !script.data_reply.starts_with("354") {
                continue;
            }
            let mut data = String::new();
            while let Some(body_line) = next_line(stream).await {
                if body_line == "." {
                    break;
                }
                data.push_str(&body_line);
                data.push('\n');
            }
            transcript.lock().unwrap().data = data;
            script.end_of_data_reply.clone()
        } else if upper == "QUIT" {
            let _ = reply(stream, "221 2.0.0 Bye").await;
            return SessionEnd::Closed;
        } else {
            "250 OK".to_string()
        };

        if reply(stream, &response).await.is_err() {
            return SessionEnd::Closed;
        }
    }

    SessionEnd::Closed
}

/// Decode an AUTH PLAIN initial response: `authzid\0user\0pass`
fn decode_plain(encoded: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let mut parts = text.split('\0');
    let _authzid = parts.next()?;
    let user = parts.next()?.to_string();
    let pass = parts.next()?.to_string();
    Some((user, pass))
}

/// A local port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
