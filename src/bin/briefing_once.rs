//! Collect one briefing and print it as Markdown.
//!
//! Keywords come from `--keywords`, then the keywords file, then the briefing
//! config. With `--out`, the Markdown and CSV artifacts are also written to DIR.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use morning_briefing::commands::{today, BriefingService, CollectBriefing};
use morning_briefing::config::BriefingConfig;
use morning_briefing::export::{csv_artifact, markdown_artifact};
use morning_briefing::ingest::config::{load_keywords_default, parse_keyword_input};
use morning_briefing::progress::ProgressSink;

/// Collect one news briefing for a date range and print it as Markdown.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// First day of the range (YYYY-MM-DD), defaults to today
    start: Option<NaiveDate>,

    /// Last day of the range (YYYY-MM-DD), defaults to the later of START and today
    end: Option<NaiveDate>,

    /// Comma-separated keywords, overriding the keywords file and config
    #[arg(long)]
    keywords: Option<String>,

    /// Directory to write the dated .md and .csv artifacts into
    #[arg(long)]
    out: Option<PathBuf>,
}

struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&self, done: usize, total: usize) {
        eprintln!("[{done}/{total}]");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let config = BriefingConfig::load_default()?;

    let keywords = match &args.keywords {
        Some(raw) => parse_keyword_input(raw),
        None => {
            let from_file = load_keywords_default()?;
            if from_file.is_empty() {
                config.keywords.clone()
            } else {
                from_file
            }
        }
    };
    let day = today();
    let start_date = args.start.unwrap_or(day);
    let end_date = args.end.unwrap_or(start_date.max(day));

    let service = BriefingService::from_config(config)?;
    let cmd = CollectBriefing {
        keywords,
        start_date,
        end_date,
    };
    service.collect_with_progress(cmd, &StderrProgress).await?;
    let doc = service.document(day)?;
    println!("{}", doc.to_markdown());

    if let Some(dir) = args.out {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        for artifact in [markdown_artifact(&doc, day), csv_artifact(&doc, day)] {
            let path = dir.join(&artifact.filename);
            std::fs::write(&path, &artifact.bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
    }
    Ok(())
}
