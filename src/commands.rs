//! Operator commands: collect, reset, dispatch.
//!
//! `BriefingService` owns the snapshot, the progress counters and the
//! collaborators. Outer surfaces (HTTP router, CLI) only call these methods.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

use crate::briefing::{BriefingAggregator, BriefingSnapshot, BriefingState};
use crate::config::BriefingConfig;
use crate::digest::{DigestRenderer, Document};
use crate::dispatch::{
    CancelToken, Credentials, DispatchEngine, DispatchError, DispatchJob, DispatchReport,
    MailRelay, SmtpRelay,
};
use crate::ingest::config::clean_keywords;
use crate::ingest::providers::GoogleNewsProvider;
use crate::ingest::types::FeedSource;
use crate::ingest::FeedClient;
use crate::progress::{Both, NoProgress, ProgressCounter, ProgressSink, ProgressSnapshot};
use crate::roster::{is_valid_email, normalize, ImportStatus, RawRow, Recipient, RosterImport, RosterImporter};

#[derive(Debug, Clone)]
pub struct CollectBriefing {
    pub keywords: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchDigest {
    pub sender_address: Option<String>,
    pub sender_secret: Option<String>,
    pub roster_locator: Option<String>,
    /// Rows supplied directly; skips the roster import.
    pub rows: Option<Vec<RawRow>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("no keywords given")]
    NoKeywords,
    #[error("no briefing collected yet")]
    NoBriefing,
    #[error("a valid sender address and a secret are required")]
    MissingCredentials,
    #[error("collection was reset before it finished")]
    Superseded,
    #[error("a dispatch is already running")]
    DispatchBusy,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub summary: String,
    pub report: DispatchReport,
    pub roster_status: ImportStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    pub collect: ProgressSnapshot,
    pub dispatch: ProgressSnapshot,
}

pub struct BriefingService {
    config: BriefingConfig,
    aggregator: BriefingAggregator,
    renderer: DigestRenderer,
    roster: RosterImporter,
    engine: DispatchEngine,
    relay: Arc<dyn MailRelay>,
    state: RwLock<BriefingState>,
    collect_progress: ProgressCounter,
    dispatch_progress: ProgressCounter,
    dispatch_gate: tokio::sync::Mutex<()>,
    cancel: Mutex<CancelToken>,
}

impl BriefingService {
    pub fn new(
        config: BriefingConfig,
        feed: Arc<dyn FeedSource>,
        relay: Arc<dyn MailRelay>,
    ) -> Self {
        let aggregator = BriefingAggregator::new(FeedClient::new(feed), config.feed.concurrency);
        Self {
            aggregator,
            renderer: DigestRenderer::new(config.digest.clone()),
            roster: RosterImporter::new(config.roster.clone()),
            engine: DispatchEngine::new(&config.mail),
            relay,
            state: RwLock::new(BriefingState::new()),
            collect_progress: ProgressCounter::new(),
            dispatch_progress: ProgressCounter::new(),
            dispatch_gate: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(CancelToken::new()),
            config,
        }
    }

    /// Production wiring: Google News feed + SMTP relay from config.
    pub fn from_config(config: BriefingConfig) -> anyhow::Result<Self> {
        let feed = Arc::new(GoogleNewsProvider::from_settings(&config.feed)?);
        let relay = Arc::new(SmtpRelay::new(&config.mail));
        Ok(Self::new(config, feed, relay))
    }

    pub fn config(&self) -> &BriefingConfig {
        &self.config
    }

    pub fn current(&self) -> Option<Arc<BriefingSnapshot>> {
        self.state.read().expect("briefing state poisoned").current()
    }

    pub fn progress(&self) -> ProgressView {
        ProgressView {
            collect: self.collect_progress.snapshot(),
            dispatch: self.dispatch_progress.snapshot(),
        }
    }

    /// CollectBriefing: fetch every keyword and replace the snapshot.
    pub async fn collect(
        &self,
        cmd: CollectBriefing,
    ) -> Result<Arc<BriefingSnapshot>, CommandError> {
        self.collect_with_progress(cmd, &NoProgress).await
    }

    /// Like [`collect`](Self::collect), also reporting to `observer`.
    pub async fn collect_with_progress(
        &self,
        cmd: CollectBriefing,
        observer: &dyn ProgressSink,
    ) -> Result<Arc<BriefingSnapshot>, CommandError> {
        if cmd.start_date > cmd.end_date {
            return Err(CommandError::InvalidRange {
                start: cmd.start_date,
                end: cmd.end_date,
            });
        }
        let keywords = clean_keywords(cmd.keywords);
        if keywords.is_empty() {
            return Err(CommandError::NoKeywords);
        }

        let ticket = self.state.read().expect("briefing state poisoned").begin_run();
        self.collect_progress.start(keywords.len());
        let result = self
            .aggregator
            .collect(
                &keywords,
                cmd.start_date,
                cmd.end_date,
                &Both(&self.collect_progress, observer),
            )
            .await;
        self.collect_progress.finish();
        let snapshot = result?;

        let mut state = self.state.write().expect("briefing state poisoned");
        if !state.commit(ticket, snapshot) {
            return Err(CommandError::Superseded);
        }
        state.current().ok_or(CommandError::Superseded)
    }

    /// ResetBriefing: drop the snapshot and invalidate any running collection.
    pub fn reset(&self) {
        self.state.write().expect("briefing state poisoned").reset();
        info!(target: "briefing", "briefing reset");
    }

    /// Render the current snapshot for `issue_date`.
    pub fn document(&self, issue_date: NaiveDate) -> Result<Document, CommandError> {
        let snapshot = self.current().ok_or(CommandError::NoBriefing)?;
        Ok(self
            .renderer
            .render(&snapshot, &snapshot.keywords(), issue_date))
    }

    pub async fn load_roster(&self, locator: Option<&str>) -> (Vec<Recipient>, RosterImport) {
        let import = self.roster.load(locator).await;
        let recipients = normalize(&import.rows, &self.roster.settings().placeholder_name);
        (recipients, import)
    }

    /// DispatchDigest: mail the current digest to the roster.
    pub async fn dispatch(&self, cmd: DispatchDigest) -> Result<DispatchOutcome, CommandError> {
        let document = self.document(today())?;
        let credentials = self.credentials(&cmd)?;

        let Ok(_gate) = self.dispatch_gate.try_lock() else {
            return Err(CommandError::DispatchBusy);
        };
        // Installed before the roster import so a cancel during the fetch sticks.
        let cancel = CancelToken::new();
        *self.cancel.lock().expect("cancel token poisoned") = cancel.clone();

        let (roster, roster_status) = match cmd.rows {
            Some(rows) => (
                normalize(&rows, &self.roster.settings().placeholder_name),
                ImportStatus::Loaded,
            ),
            None => {
                let (recipients, import) = self.load_roster(cmd.roster_locator.as_deref()).await;
                (recipients, import.status)
            }
        };
        if let ImportStatus::Degraded(reason) = &roster_status {
            warn!(target: "dispatch", %reason, "dispatching to fallback roster");
        }

        let job = DispatchJob {
            document: &document,
            roster: &roster,
            credentials: &credentials,
            greeting_template: &self.config.mail.greeting_template,
        };
        self.dispatch_progress.start(roster.len());
        let result = self
            .engine
            .send(self.relay.as_ref(), &job, &self.dispatch_progress, &cancel)
            .await;
        self.dispatch_progress.finish();

        let report = result?;
        Ok(DispatchOutcome {
            summary: report.summary(),
            report,
            roster_status,
        })
    }

    /// Stop the running dispatch before its next recipient.
    pub fn cancel_dispatch(&self) {
        self.cancel.lock().expect("cancel token poisoned").cancel();
    }

    fn credentials(&self, cmd: &DispatchDigest) -> Result<Credentials, CommandError> {
        let pick = |given: &Option<String>, fallback: &Option<String>| {
            given
                .as_deref()
                .or(fallback.as_deref())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let address = pick(&cmd.sender_address, &self.config.mail.sender_address)
            .filter(|a| is_valid_email(a));
        let secret = pick(&cmd.sender_secret, &self.config.mail.sender_secret);
        match (address, secret) {
            (Some(a), Some(s)) => Ok(Credentials::new(a, s)),
            _ => Err(CommandError::MissingCredentials),
        }
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
