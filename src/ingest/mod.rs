// src/ingest/mod.rs
pub mod config;
pub mod filter;
pub mod providers;
pub mod types;

use crate::ingest::types::{Article, FeedSource};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_fetch_total", "Feed requests issued, one per keyword.");
        describe_counter!(
            "feed_fetch_errors_total",
            "Feed requests that failed and degraded to an empty result."
        );
        describe_counter!("feed_entries_total", "Feed entries parsed into articles.");
        describe_counter!(
            "feed_entries_dropped_total",
            "Feed entries dropped as malformed (no title, link or parseable date)."
        );
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_histogram!("feed_fetch_ms", "Feed fetch + parse time in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Feed access that never fails: request or parse errors are logged, counted
/// and returned as an empty list, same as a search with no hits.
#[derive(Clone)]
pub struct FeedClient {
    source: Arc<dyn FeedSource>,
}

/// What a single keyword fetch produced.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub articles: Vec<Article>,
    /// Set when the request itself failed. The article list is empty then.
    pub failed: bool,
}

impl FeedClient {
    pub fn new(source: Arc<dyn FeedSource>) -> Self {
        ensure_metrics_described();
        Self { source }
    }

    pub async fn fetch(&self, keyword: &str) -> Vec<Article> {
        self.fetch_outcome(keyword).await.articles
    }

    pub async fn fetch_outcome(&self, keyword: &str) -> FetchOutcome {
        let t0 = std::time::Instant::now();
        counter!("feed_fetch_total").increment(1);
        let outcome = match self.source.fetch_latest(keyword).await {
            Ok(articles) => FetchOutcome {
                articles,
                failed: false,
            },
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    error = ?e,
                    provider = self.source.name(),
                    keyword,
                    "feed fetch failed; treating as no results"
                );
                counter!("feed_fetch_errors_total").increment(1);
                FetchOutcome {
                    articles: Vec::new(),
                    failed: true,
                }
            }
        };
        histogram!("feed_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        outcome
    }
}
