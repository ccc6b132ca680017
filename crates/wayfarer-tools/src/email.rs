//! SMTP mailer -- the side-effect executor behind the approval gate.
//!
//! Delivers the formatted itinerary email over implicit TLS (port 465)
//! with AUTH LOGIN. Command and message builders are pure functions so
//! the protocol plumbing is testable without a server. Every failure
//! maps to a retryable delivery error; the session stays at the gate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::ClientConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info};

use crate::error::{Result, ToolError};
use wayfarer_agent::{AgentError, SideEffectExecutor};

/// Default SMTP implicit-TLS port.
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// Connection and response timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// SMTP command builders (pure functions, testable)
// ---------------------------------------------------------------------------

/// Build an SMTP EHLO command.
pub fn smtp_ehlo_command(domain: &str) -> String {
    format!("EHLO {domain}\r\n")
}

/// Build an SMTP AUTH LOGIN command.
pub fn smtp_auth_login_command() -> String {
    "AUTH LOGIN\r\n".to_string()
}

/// Encode a string to base64 for SMTP AUTH.
pub fn smtp_base64_encode(input: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(input)
}

/// Build an SMTP MAIL FROM command.
pub fn smtp_mail_from_command(from: &str) -> String {
    format!("MAIL FROM:<{from}>\r\n")
}

/// Build an SMTP RCPT TO command.
pub fn smtp_rcpt_to_command(to: &str) -> String {
    format!("RCPT TO:<{to}>\r\n")
}

/// Build an SMTP DATA command.
pub fn smtp_data_command() -> String {
    "DATA\r\n".to_string()
}

/// Build an HTML email message for SMTP DATA. The payload is the
/// formatted itinerary body produced by the transform model.
///
/// Body lines starting with `.` are dot-stuffed (RFC 5321 section
/// 4.5.2) so a bare dot line cannot terminate DATA early.
pub fn smtp_message_body(from: &str, to: &str, subject: &str, html_body: &str) -> String {
    format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/html; charset=UTF-8\r\n\
         \r\n\
         {}\r\n\
         .\r\n",
        dot_stuff(html_body)
    )
}

/// Prefix an extra dot on every body line that starts with one.
fn dot_stuff(body: &str) -> String {
    let stuffed: Vec<String> = body
        .lines()
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect();
    stuffed.join("\r\n")
}

/// Build an SMTP QUIT command.
pub fn smtp_quit_command() -> String {
    "QUIT\r\n".to_string()
}

// ---------------------------------------------------------------------------
// TLS plumbing
// ---------------------------------------------------------------------------

/// Build a rustls `ClientConfig` using Mozilla's bundled root certificates.
fn tls_client_config() -> Arc<ClientConfig> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Arc::new(config)
}

/// Establish an implicit-TLS connection to the SMTP server.
async fn connect_tls(host: &str, port: u16, timeout: Duration) -> Result<TlsStream<TcpStream>> {
    let connector = TlsConnector::from(tls_client_config());
    let server_name =
        rustls::pki_types::ServerName::try_from(host.to_owned()).map_err(|e| ToolError::Smtp {
            reason: format!("invalid server name '{host}': {e}"),
        })?;

    let addr = format!("{host}:{port}");

    let tcp_stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| ToolError::Timeout {
            seconds: timeout.as_secs(),
            reason: format!("TCP connection to {addr} timed out"),
        })?
        .map_err(|e| ToolError::Smtp {
            reason: format!("TCP connection to {addr} failed: {e}"),
        })?;

    let tls_stream = tokio::time::timeout(timeout, connector.connect(server_name, tcp_stream))
        .await
        .map_err(|_| ToolError::Timeout {
            seconds: timeout.as_secs(),
            reason: format!("TLS handshake with {host} timed out"),
        })?
        .map_err(|e| ToolError::Smtp {
            reason: format!("TLS handshake with {host} failed: {e}"),
        })?;

    Ok(tls_stream)
}

/// Read an SMTP response (one or more lines) until the final status line.
async fn smtp_read_response(
    reader: &mut BufReader<ReadHalf<TlsStream<TcpStream>>>,
) -> Result<(u16, Vec<String>)> {
    let mut lines = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(CONNECT_TIMEOUT_SECS);

    loop {
        let mut line = String::new();
        let read_result = tokio::time::timeout_at(deadline, reader.read_line(&mut line)).await;

        match read_result {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {
                let trimmed = line.trim().to_string();
                debug!(smtp_line = %trimmed, "SMTP response line");
                lines.push(trimmed.clone());

                // SMTP responses: "NNN-text" for continuation, "NNN text" for final.
                if trimmed.len() >= 4 {
                    let fourth_char = trimmed.as_bytes().get(3).copied();
                    if fourth_char == Some(b' ') || fourth_char.is_none() {
                        break;
                    }
                } else {
                    break;
                }
            }
            Ok(Err(e)) => {
                return Err(ToolError::Smtp {
                    reason: format!("SMTP read error: {e}"),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    seconds: CONNECT_TIMEOUT_SECS,
                    reason: "SMTP response timed out".into(),
                });
            }
        }
    }

    let status = lines
        .first()
        .and_then(|l| l.get(..3))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    Ok((status, lines))
}

/// Send one command and check the response class (2xx or 3xx).
async fn smtp_send_cmd(
    writer: &mut WriteHalf<TlsStream<TcpStream>>,
    reader: &mut BufReader<ReadHalf<TlsStream<TcpStream>>>,
    cmd: &str,
    expected_status_class: u16,
) -> Result<(u16, Vec<String>)> {
    writer
        .write_all(cmd.as_bytes())
        .await
        .map_err(|e| ToolError::Smtp {
            reason: format!("SMTP write error: {e}"),
        })?;
    let (status, lines) = smtp_read_response(reader).await?;
    if status / 100 != expected_status_class {
        return Err(ToolError::Smtp {
            reason: format!(
                "SMTP error: expected {expected_status_class}xx, got {status}: {}",
                lines.join("; ")
            ),
        });
    }
    Ok((status, lines))
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

/// SMTP server configuration, injected at construction.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP implicit-TLS port (465 for Gmail).
    pub port: u16,
    /// Account username, usually the sender address.
    pub username: String,
    /// Account password or app-specific password.
    pub password: String,
    /// TCP/TLS connect timeout.
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SMTP_PORT,
            username: username.into(),
            password: password.into(),
            timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Delivers approved emails over SMTP.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    async fn send(&self, payload: &str, sender: &str, recipient: &str, subject: &str) -> Result<()> {
        let tls_stream =
            connect_tls(&self.config.host, self.config.port, self.config.timeout).await?;
        let (read_half, mut write_half) = tokio::io::split(tls_stream);
        let mut reader = BufReader::new(read_half);

        // Server greeting.
        let (greeting_status, _) = smtp_read_response(&mut reader).await?;
        if greeting_status / 100 != 2 {
            return Err(ToolError::Smtp {
                reason: format!("SMTP server rejected connection with status {greeting_status}"),
            });
        }

        let ehlo = smtp_ehlo_command("wayfarer.local");
        smtp_send_cmd(&mut write_half, &mut reader, &ehlo, 2).await?;

        smtp_send_cmd(&mut write_half, &mut reader, &smtp_auth_login_command(), 3).await?;

        let b64_user = format!("{}\r\n", smtp_base64_encode(&self.config.username));
        smtp_send_cmd(&mut write_half, &mut reader, &b64_user, 3).await?;

        let b64_pass = format!("{}\r\n", smtp_base64_encode(&self.config.password));
        smtp_send_cmd(&mut write_half, &mut reader, &b64_pass, 2).await?;

        let mail_from = smtp_mail_from_command(sender);
        smtp_send_cmd(&mut write_half, &mut reader, &mail_from, 2).await?;

        let rcpt_to = smtp_rcpt_to_command(recipient);
        smtp_send_cmd(&mut write_half, &mut reader, &rcpt_to, 2).await?;

        smtp_send_cmd(&mut write_half, &mut reader, &smtp_data_command(), 3).await?;

        let message = smtp_message_body(sender, recipient, subject, payload);
        smtp_send_cmd(&mut write_half, &mut reader, &message, 2).await?;

        let _ = write_half.write_all(smtp_quit_command().as_bytes()).await;

        info!(recipient, subject, "email delivered");
        Ok(())
    }
}

#[async_trait]
impl SideEffectExecutor for SmtpMailer {
    async fn deliver(
        &self,
        payload: &str,
        sender: &str,
        recipient: &str,
        subject: &str,
    ) -> wayfarer_agent::Result<()> {
        self.send(payload, sender, recipient, subject)
            .await
            .map_err(|e| AgentError::DeliveryFailed {
                reason: e.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn smtp_ehlo_command_format() {
        assert_eq!(smtp_ehlo_command("wayfarer.local"), "EHLO wayfarer.local\r\n");
    }

    #[test]
    fn smtp_auth_login_command_format() {
        assert_eq!(smtp_auth_login_command(), "AUTH LOGIN\r\n");
    }

    #[test]
    fn smtp_mail_from_command_format() {
        assert_eq!(
            smtp_mail_from_command("sender@example.com"),
            "MAIL FROM:<sender@example.com>\r\n"
        );
    }

    #[test]
    fn smtp_rcpt_to_command_format() {
        assert_eq!(
            smtp_rcpt_to_command("recipient@example.com"),
            "RCPT TO:<recipient@example.com>\r\n"
        );
    }

    #[test]
    fn smtp_data_and_quit_command_format() {
        assert_eq!(smtp_data_command(), "DATA\r\n");
        assert_eq!(smtp_quit_command(), "QUIT\r\n");
    }

    #[test]
    fn smtp_message_body_is_html_mime() {
        let msg = smtp_message_body(
            "from@x.com",
            "to@y.com",
            "Travel Information",
            "<html><body>Itinerary</body></html>",
        );
        assert!(msg.starts_with("From: from@x.com\r\n"));
        assert!(msg.contains("To: to@y.com\r\n"));
        assert!(msg.contains("Subject: Travel Information\r\n"));
        assert!(msg.contains("MIME-Version: 1.0\r\n"));
        assert!(msg.contains("Content-Type: text/html; charset=UTF-8\r\n"));
        assert!(msg.contains("<html><body>Itinerary</body></html>\r\n"));
        assert!(msg.ends_with(".\r\n"));
    }

    #[test]
    fn smtp_message_body_stuffs_leading_dots() {
        let msg = smtp_message_body(
            "from@x.com",
            "to@y.com",
            "Subject",
            "line one\n.\n.hidden line\nline two",
        );
        // A lone dot line must not terminate DATA.
        assert!(msg.contains("\r\n..\r\n..hidden line\r\n"));
        // Only the final terminator is a bare dot line.
        assert_eq!(msg.matches("\r\n.\r\n").count(), 1);
        assert!(msg.ends_with("line two\r\n.\r\n"));
    }

    #[test]
    fn smtp_base64_encode_round_trips() {
        for input in ["user@example.com", "my-secret-password", "p@$$w0rd!#%&"] {
            let encoded = smtp_base64_encode(input);
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(&encoded)
                .unwrap();
            assert_eq!(String::from_utf8(decoded).unwrap(), input);
        }
    }

    #[test]
    fn smtp_base64_encode_empty() {
        assert_eq!(smtp_base64_encode(""), "");
    }

    #[test]
    fn smtp_config_defaults() {
        let config = SmtpConfig::new("smtp.gmail.com", "agent@gmail.com", "app-password");
        assert_eq!(config.port, 465);
        assert_eq!(config.timeout, Duration::from_secs(30));

        let config = config.with_port(2465);
        assert_eq!(config.port, 2465);
    }
}
