// src/dispatch/smtp.rs
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{
    authentication::Credentials as SmtpCredentials, AsyncSmtpTransport, PoolConfig,
};
use lettre::{Address, AsyncTransport, Tokio1Executor};
use std::time::Duration;

use super::relay::{Credentials, MailRelay, OutgoingMessage, RelayError, RelaySession};
use crate::config::MailSettings;

/// STARTTLS submission relay (port 587 by default).
pub struct SmtpRelay {
    host: String,
    port: u16,
    timeout: Duration,
}

impl SmtpRelay {
    pub fn new(settings: &MailSettings) -> Self {
        Self {
            host: settings.relay_host.clone(),
            port: settings.relay_port,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

struct SmtpSession {
    // Pool of one: every send reuses the same authenticated connection.
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

#[async_trait]
impl MailRelay for SmtpRelay {
    async fn login(&self, credentials: &Credentials) -> Result<Box<dyn RelaySession>, RelayError> {
        let from: Mailbox = credentials
            .sender_address
            .trim()
            .parse()
            .map_err(|e| RelayError::Auth(format!("invalid sender address: {e}")))?;

        let creds = SmtpCredentials::new(
            credentials.sender_address.trim().to_string(),
            credentials.sender_secret.clone(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| RelayError::Session(format!("invalid relay host: {e}")))?
            .port(self.port)
            .timeout(Some(self.timeout))
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(1))
            .build();

        match mailer.test_connection().await {
            Ok(true) => {}
            Ok(false) => return Err(RelayError::Session("relay did not answer".into())),
            Err(e) => return Err(classify(&e, true)),
        }
        tracing::info!(target: "dispatch", host = %self.host, port = self.port, "relay login ok");
        Ok(Box::new(SmtpSession { mailer, from }))
    }
}

#[async_trait]
impl RelaySession for SmtpSession {
    async fn send(&mut self, message: &OutgoingMessage) -> Result<(), RelayError> {
        let address: Address = message
            .to
            .email
            .trim()
            .parse()
            .map_err(|e| RelayError::Rejected(format!("invalid recipient address: {e}")))?;
        let to = Mailbox::new(Some(message.to.display_name.clone()), address);

        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .header(header::ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .map_err(|e| RelayError::Rejected(format!("build email: {e}")))?;

        self.mailer
            .send(msg)
            .await
            .map(|_| ())
            .map_err(|e| classify(&e, false))
    }

    async fn close(self: Box<Self>) -> Result<(), RelayError> {
        // Dropping the transport shuts down its pooled connection.
        drop(self);
        Ok(())
    }
}

/// 53x replies are authentication problems. Other SMTP replies refuse only the
/// current message, except during login where nothing has been sent yet.
fn classify(e: &lettre::transport::smtp::Error, during_login: bool) -> RelayError {
    let reason = e.to_string();
    let auth = e
        .status()
        .map(|code| code.to_string().starts_with("53"))
        .unwrap_or(false);
    if auth {
        RelayError::Auth(reason)
    } else if (e.is_transient() || e.is_permanent()) && !during_login {
        RelayError::Rejected(reason)
    } else {
        RelayError::Session(reason)
    }
}
