// src/dispatch/relay.rs
use async_trait::async_trait;
use std::fmt;

use crate::roster::Recipient;

/// Sender identity used to log in to the relay.
#[derive(Clone)]
pub struct Credentials {
    pub sender_address: String,
    pub sender_secret: String,
}

impl Credentials {
    pub fn new(sender_address: impl Into<String>, sender_secret: impl Into<String>) -> Self {
        Self {
            sender_address: sender_address.into(),
            sender_secret: sender_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("sender_address", &self.sender_address)
            .field("sender_secret", &"<redacted>")
            .finish()
    }
}

/// One personalized message ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: Recipient,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Login rejected; nothing can be sent with these credentials.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// This one message was refused; the session is still usable.
    #[error("message rejected: {0}")]
    Rejected(String),
    /// Connection-level failure; the session cannot continue.
    #[error("relay session error: {0}")]
    Session(String),
}

/// A mail submission service (SMTP in production).
#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Box<dyn RelaySession>, RelayError>;
}

/// An authenticated session. Not safe for concurrent sends.
#[async_trait]
pub trait RelaySession: Send {
    async fn send(&mut self, message: &OutgoingMessage) -> Result<(), RelayError>;
    async fn close(self: Box<Self>) -> Result<(), RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_not_printed() {
        let c = Credentials::new("desk@example.com", "hunter2");
        let dbg = format!("{c:?}");
        assert!(dbg.contains("desk@example.com"));
        assert!(!dbg.contains("hunter2"));
    }
}
