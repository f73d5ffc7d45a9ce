//! # Briefing Aggregator
//! Runs the feed client and date filter over a keyword list and assembles the
//! per-keyword article collection every other stage reads from.
//!
//! Fetches run through a bounded pool (`buffered`), so at most `concurrency`
//! feed requests are in flight and results still come back in keyword order.
//! A snapshot is only ever handed out whole; [`BriefingState`] swaps it in
//! after a run completes.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use futures::StreamExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::ingest::config::clean_keywords;
use crate::ingest::filter::filter_by_date;
use crate::ingest::types::{check_range, Article, KeywordQuery};
use crate::ingest::FeedClient;
use crate::progress::ProgressSink;

/// Articles collected for one keyword, in feed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordArticles {
    pub keyword: String,
    pub articles: Vec<Article>,
}

/// Result of one collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefingSnapshot {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub collected_at: DateTime<Utc>,
    pub sections: Vec<KeywordArticles>,
    /// Keywords whose feed request failed. Their article list is empty.
    #[serde(default)]
    pub failed_keywords: Vec<String>,
}

impl BriefingSnapshot {
    pub fn keywords(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.keyword.clone()).collect()
    }

    pub fn get(&self, keyword: &str) -> Option<&[Article]> {
        self.sections
            .iter()
            .find(|s| s.keyword == keyword)
            .map(|s| s.articles.as_slice())
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn total_articles(&self) -> usize {
        self.sections.iter().map(|s| s.articles.len()).sum()
    }
}

pub struct BriefingAggregator {
    client: FeedClient,
    concurrency: usize,
}

impl BriefingAggregator {
    pub fn new(client: FeedClient, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Collect every keyword; reports progress after each keyword is done.
    pub async fn collect(
        &self,
        keywords: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
        progress: &dyn ProgressSink,
    ) -> Result<BriefingSnapshot> {
        check_range(start_date, end_date)?;
        let queries = clean_keywords(keywords.iter().cloned())
            .into_iter()
            .map(|kw| KeywordQuery::new(kw, start_date, end_date))
            .collect::<Result<Vec<_>>>()?;
        let total = queries.len();
        progress.report(0, total);

        let client = &self.client;
        let mut results = futures::stream::iter(queries)
            .map(|q| async move {
                let outcome = client.fetch_outcome(&q.keyword).await;
                (q, outcome)
            })
            .buffered(self.concurrency);

        let mut sections = Vec::with_capacity(total);
        let mut failed_keywords = Vec::new();
        while let Some((query, outcome)) = results.next().await {
            let KeywordQuery {
                keyword,
                start_date: from,
                end_date: to,
            } = query;
            let fetched = outcome.articles.len();
            let articles = dedup_links(filter_by_date(outcome.articles, from, to));
            tracing::debug!(
                target: "briefing",
                keyword = %keyword,
                fetched,
                kept = articles.len(),
                "keyword collected"
            );
            if outcome.failed {
                failed_keywords.push(keyword.clone());
            }
            sections.push(KeywordArticles { keyword, articles });
            progress.report(sections.len(), total);
        }

        let snapshot = BriefingSnapshot {
            start_date,
            end_date,
            collected_at: Utc::now(),
            sections,
            failed_keywords,
        };

        counter!("briefing_collect_runs_total").increment(1);
        counter!("briefing_articles_total").increment(snapshot.total_articles() as u64);
        info!(
            target: "briefing",
            keywords = snapshot.len(),
            articles = snapshot.total_articles(),
            failed = snapshot.failed_keywords.len(),
            "collection finished"
        );
        Ok(snapshot)
    }
}

/// Drop repeated links, keeping the first occurrence.
fn dedup_links(articles: Vec<Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| seen.insert(a.link.as_str().to_string()))
        .collect()
}

/// Identifies one collection attempt; stale after a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket(u64);

/// Owner of the current snapshot: empty at start, replaced by completed runs,
/// cleared by reset.
#[derive(Debug, Default)]
pub struct BriefingState {
    snapshot: Option<Arc<BriefingSnapshot>>,
    generation: u64,
}

impl BriefingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<BriefingSnapshot>> {
        self.snapshot.clone()
    }

    pub fn begin_run(&self) -> RunTicket {
        RunTicket(self.generation)
    }

    /// Install `snapshot` unless a reset happened since `ticket` was issued.
    pub fn commit(&mut self, ticket: RunTicket, snapshot: BriefingSnapshot) -> bool {
        if ticket.0 != self.generation {
            tracing::info!(target: "briefing", "discarding collection result after reset");
            return false;
        }
        self.generation += 1;
        self.snapshot = Some(Arc::new(snapshot));
        true
    }

    pub fn reset(&mut self) {
        self.generation += 1;
        self.snapshot = None;
    }
}
