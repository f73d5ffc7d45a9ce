// src/lib.rs
// Public library surface for the server, the CLI and integration tests.

pub mod api;
pub mod briefing;
pub mod commands;
pub mod config;
pub mod digest;
pub mod dispatch;
pub mod export;
pub mod ingest;
pub mod metrics;
pub mod progress;
pub mod roster;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::briefing::{BriefingAggregator, BriefingSnapshot, BriefingState, KeywordArticles};
pub use crate::commands::{BriefingService, CollectBriefing, CommandError, DispatchDigest};
pub use crate::config::BriefingConfig;
pub use crate::digest::{DigestRenderer, Document};
pub use crate::dispatch::{CancelToken, DispatchEngine, DispatchError, DispatchReport, Outcome};
pub use crate::ingest::types::{Article, FeedSource};
pub use crate::roster::{RawRow, Recipient};
