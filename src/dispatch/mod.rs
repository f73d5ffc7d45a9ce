//! # Dispatch Engine
//! Sends the rendered digest, personalized per recipient, over authenticated
//! relay sessions.
//!
//! Policy: a rejected login aborts before any message is attempted; a refused
//! message is recorded and the batch goes on; a broken session aborts the rest
//! of the batch. Every attempt (sent, skipped or refused) advances progress.
//! Sends on one session are strictly sequential with a fixed pause between them.

pub mod relay;
pub mod smtp;

use futures::future::join_all;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::MailSettings;
use crate::digest::Document;
use crate::progress::ProgressSink;
use crate::roster::{is_valid_email, Recipient};
pub use relay::{Credentials, MailRelay, OutgoingMessage, RelayError, RelaySession};
pub use smtp::SmtpRelay;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("dispatch_sent_total", "Digest messages accepted by the relay.");
        describe_counter!(
            "dispatch_failed_total",
            "Digest messages refused for a single recipient."
        );
        describe_counter!(
            "dispatch_skipped_total",
            "Recipients skipped for an invalid address."
        );
        describe_counter!(
            "dispatch_auth_failures_total",
            "Dispatch runs aborted by a rejected relay login."
        );
        describe_counter!(
            "dispatch_cancelled_total",
            "Recipients left unattempted because the run was cancelled."
        );
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    SkippedInvalidEmail,
    TransientFailure(String),
    /// Not attempted: the run was cancelled first.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub recipient: Recipient,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub results: Vec<DispatchResult>,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| *o == Outcome::Success)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == Outcome::SkippedInvalidEmail)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::TransientFailure(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| *o == Outcome::Cancelled)
    }

    /// "N of M recipients succeeded"
    pub fn summary(&self) -> String {
        format!("{} of {} recipients succeeded", self.succeeded(), self.total())
    }
}

/// Fatal dispatch errors. Anything per-recipient lives in [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("mail relay rejected the login: {0}")]
    AuthFailure(String),
    /// Unexpected session failure; `results` holds what was attempted before it.
    #[error("dispatch aborted: {reason}")]
    Session {
        reason: String,
        results: Vec<DispatchResult>,
    },
}

/// Stops a dispatch between recipients.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one dispatch run needs besides the relay.
pub struct DispatchJob<'a> {
    pub document: &'a Document,
    pub roster: &'a [Recipient],
    pub credentials: &'a Credentials,
    /// `{name}` is replaced with the escaped display name.
    pub greeting_template: &'a str,
}

pub struct DispatchEngine {
    send_delay: Duration,
    subject_template: String,
    partitions: usize,
}

impl DispatchEngine {
    pub fn new(settings: &MailSettings) -> Self {
        ensure_metrics_described();
        Self {
            send_delay: Duration::from_millis(settings.send_delay_ms),
            subject_template: settings.subject_template.clone(),
            partitions: settings.partitions.max(1),
        }
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    /// `body_html` is the digest rendered once per run; only the greeting varies.
    pub fn compose(
        &self,
        job: &DispatchJob<'_>,
        body_html: &str,
        recipient: &Recipient,
    ) -> OutgoingMessage {
        let greeting = job.greeting_template.replace(
            "{name}",
            &html_escape::encode_text(&recipient.display_name),
        );
        OutgoingMessage {
            from: job.credentials.sender_address.clone(),
            to: recipient.clone(),
            subject: self
                .subject_template
                .replace("{date}", &job.document.issue_date.format("%Y-%m-%d").to_string()),
            html_body: format!("{greeting}{body_html}"),
        }
    }

    /// Send to the whole roster. Uses `partitions` independent sessions, each
    /// serving a contiguous slice of the roster; results keep roster order.
    pub async fn send(
        &self,
        relay: &dyn MailRelay,
        job: &DispatchJob<'_>,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<DispatchReport, DispatchError> {
        let total = job.roster.len();
        let chunk = total.div_ceil(self.partitions).max(1);
        let mut slices: Vec<&[Recipient]> = job.roster.chunks(chunk).collect();
        if slices.is_empty() {
            slices.push(&[]);
        }

        // Log in every session before the first message goes out.
        let mut sessions = Vec::with_capacity(slices.len());
        for _ in 0..slices.len() {
            match relay.login(job.credentials).await {
                Ok(s) => sessions.push(s),
                Err(e) => {
                    for s in sessions {
                        let _ = s.close().await;
                    }
                    return Err(login_error(e));
                }
            }
        }

        progress.report(0, total);
        let body_html = job.document.to_html();
        let ctx = SessionContext {
            job,
            body_html: &body_html,
            attempts: AtomicUsize::new(0),
            progress,
            cancel,
            aborted: CancelToken::new(),
        };
        let runs = sessions
            .into_iter()
            .zip(slices)
            .map(|(session, slice)| self.run_session(session, slice, &ctx));
        let outcomes = join_all(runs).await;

        let mut results = Vec::with_capacity(total);
        let mut abort = None;
        for outcome in outcomes {
            match outcome {
                Ok(mut part) => results.append(&mut part),
                Err((reason, mut part)) => {
                    results.append(&mut part);
                    abort.get_or_insert(reason);
                }
            }
        }

        if let Some(reason) = abort {
            warn!(target: "dispatch", %reason, attempted = results.len(), total, "dispatch aborted");
            return Err(DispatchError::Session { reason, results });
        }

        let report = DispatchReport { results };
        info!(
            target: "dispatch",
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            cancelled = report.cancelled(),
            total,
            "{}",
            report.summary()
        );
        Ok(report)
    }

    async fn run_session(
        &self,
        mut session: Box<dyn RelaySession>,
        slice: &[Recipient],
        ctx: &SessionContext<'_>,
    ) -> Result<Vec<DispatchResult>, (String, Vec<DispatchResult>)> {
        let total = ctx.job.roster.len();
        let mut results = Vec::with_capacity(slice.len());
        let mut sent_any = false;

        for (idx, recipient) in slice.iter().enumerate() {
            if sent_any && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            if ctx.aborted.is_cancelled() {
                // A sibling session broke; its error ends the batch.
                info!(target: "dispatch", remaining = slice.len() - idx, "stopping after a broken session");
                break;
            }
            if ctx.cancel.is_cancelled() {
                let rest = &slice[idx..];
                counter!("dispatch_cancelled_total").increment(rest.len() as u64);
                info!(target: "dispatch", remaining = rest.len(), "dispatch cancelled");
                results.extend(rest.iter().map(|r| DispatchResult {
                    recipient: r.clone(),
                    outcome: Outcome::Cancelled,
                }));
                break;
            }

            let outcome = if !is_valid_email(&recipient.email) {
                counter!("dispatch_skipped_total").increment(1);
                Outcome::SkippedInvalidEmail
            } else {
                sent_any = true;
                let msg = self.compose(ctx.job, ctx.body_html, recipient);
                match session.send(&msg).await {
                    Ok(()) => {
                        counter!("dispatch_sent_total").increment(1);
                        Outcome::Success
                    }
                    Err(RelayError::Rejected(reason)) => {
                        counter!("dispatch_failed_total").increment(1);
                        warn!(
                            target: "dispatch",
                            recipient = %anon_hash(&recipient.email),
                            %reason,
                            "send failed; continuing"
                        );
                        Outcome::TransientFailure(reason)
                    }
                    Err(e) => {
                        ctx.aborted.cancel();
                        let _ = session.close().await;
                        return Err((e.to_string(), results));
                    }
                }
            };
            results.push(DispatchResult {
                recipient: recipient.clone(),
                outcome,
            });

            let done = ctx.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.progress.report(done, total);
        }

        if let Err(e) = session.close().await {
            warn!(target: "dispatch", error = %e, "closing relay session failed");
        }
        Ok(results)
    }
}

/// Shared by every session of one `send`.
struct SessionContext<'a> {
    job: &'a DispatchJob<'a>,
    body_html: &'a str,
    attempts: AtomicUsize,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancelToken,
    /// Set when any session hits a fatal error.
    aborted: CancelToken,
}

fn login_error(e: RelayError) -> DispatchError {
    match e {
        RelayError::Auth(reason) => {
            counter!("dispatch_auth_failures_total").increment(1);
            warn!(target: "dispatch", %reason, "relay login rejected");
            DispatchError::AuthFailure(reason)
        }
        other => DispatchError::Session {
            reason: other.to_string(),
            results: Vec::new(),
        },
    }
}

/// Short stable id for an address, so logs never carry the address itself.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.trim().to_ascii_lowercase().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
