// tests/support/mod.rs
//
// In-process collaborators shared by the integration tests: a scripted mail
// relay and a feed source that fails for chosen keywords.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use morning_briefing::dispatch::{
    Credentials, MailRelay, OutgoingMessage, RelayError, RelaySession,
};
use morning_briefing::ingest::providers::GoogleNewsProvider;
use morning_briefing::ingest::types::{Article, FeedSource};

pub const FEED_XML: &str = include_str!("../fixtures/google_news_rss.xml");

/// What the relay does for one recipient address.
#[derive(Clone, Debug)]
pub enum Reply {
    Reject(String),
    Break(String),
}

#[derive(Default)]
pub struct StubRelay {
    pub login_error: Option<RelayError>,
    pub replies: Vec<(String, Reply)>,
    pub logins: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<OutgoingMessage>>>,
}

impl StubRelay {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn rejecting_login(reason: &str) -> Self {
        Self {
            login_error: Some(RelayError::Auth(reason.to_string())),
            ..Self::default()
        }
    }

    pub fn with_reply(mut self, email: &str, reply: Reply) -> Self {
        self.replies.push((email.to_string(), reply));
        self
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to.email.clone())
            .collect()
    }
}

struct StubSession {
    replies: Vec<(String, Reply)>,
    closes: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<OutgoingMessage>>>,
}

#[async_trait]
impl MailRelay for StubRelay {
    async fn login(&self, _credentials: &Credentials) -> Result<Box<dyn RelaySession>, RelayError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.login_error {
            return Err(e.clone());
        }
        Ok(Box::new(StubSession {
            replies: self.replies.clone(),
            closes: self.closes.clone(),
            sent: self.sent.clone(),
        }))
    }
}

#[async_trait]
impl RelaySession for StubSession {
    async fn send(&mut self, message: &OutgoingMessage) -> Result<(), RelayError> {
        let reply = self
            .replies
            .iter()
            .find(|(email, _)| *email == message.to.email)
            .map(|(_, r)| r.clone());
        match reply {
            Some(Reply::Reject(reason)) => Err(RelayError::Rejected(reason)),
            Some(Reply::Break(reason)) => Err(RelayError::Session(reason)),
            None => {
                self.sent.lock().unwrap().push(message.clone());
                Ok(())
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), RelayError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves the fixture feed, except for keywords listed in `failing`.
pub struct FlakyFeed {
    inner: GoogleNewsProvider,
    failing: HashSet<String>,
}

impl FlakyFeed {
    pub fn new(failing: &[&str]) -> Self {
        Self {
            inner: GoogleNewsProvider::from_fixture(FEED_XML),
            failing: failing.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl FeedSource for FlakyFeed {
    async fn fetch_latest(&self, keyword: &str) -> anyhow::Result<Vec<Article>> {
        if self.failing.contains(keyword) {
            anyhow::bail!("feed unreachable for {keyword}");
        }
        self.inner.fetch_latest(keyword).await
    }

    fn name(&self) -> &'static str {
        "Flaky"
    }
}
