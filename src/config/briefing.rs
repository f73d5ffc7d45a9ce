// src/config/briefing.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const ENV_CONFIG_PATH: &str = "BRIEFING_CONFIG_PATH";
pub const ENV_SMTP_PASS: &str = "SMTP_PASS";
pub const DEFAULT_CONFIG_TOML: &str = "config/briefing.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/briefing.json";

/// Most entries taken from one feed response.
pub const MAX_FEED_ENTRIES: usize = 30;
/// Pause between two sends on one relay session.
pub const DEFAULT_SEND_DELAY_MS: u64 = 100;

fn default_keywords() -> Vec<String> {
    ["방송광고", "미디어렙법", "어드레서블 TV", "OTT 광고", "KAI 지수"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefingConfig {
    pub keywords: Vec<String>,
    pub feed: FeedSettings,
    pub roster: RosterSettings,
    pub mail: MailSettings,
    pub digest: DigestSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub endpoint: String,
    /// Extra query parameters appended after `q`.
    pub params: Vec<(String, String)>,
    pub max_entries: usize,
    /// Upper bound on concurrent outbound feed requests.
    pub concurrency: usize,
    pub timeout_secs: u64,
    /// Offset used to turn publication timestamps into calendar dates.
    pub utc_offset_hours: i8,
    pub user_agent: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://news.google.com/rss/search".to_string(),
            params: vec![
                ("hl".into(), "ko".into()),
                ("gl".into(), "KR".into()),
                ("ceid".into(), "KR:ko".into()),
            ],
            max_entries: MAX_FEED_ENTRIES,
            concurrency: 4,
            timeout_secs: 10,
            utc_offset_hours: 9,
            user_agent: concat!("morning-briefing/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterSettings {
    pub sheet_url: Option<String>,
    pub name_column: String,
    pub email_column: String,
    /// Display name for rows that carry an email but no name.
    pub placeholder_name: String,
    pub cache_ttl_secs: u64,
    pub fallback_name: String,
    pub fallback_email: String,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            sheet_url: None,
            name_column: "이름".to_string(),
            email_column: "이메일".to_string(),
            placeholder_name: "구독자".to_string(),
            cache_ttl_secs: 600,
            fallback_name: "테스트유저".to_string(),
            fallback_email: "test@example.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub relay_host: String,
    pub relay_port: u16,
    pub sender_address: Option<String>,
    /// "ENV" means: read from SMTP_PASS.
    pub sender_secret: Option<String>,
    pub send_delay_ms: u64,
    /// Independent relay sessions used for one dispatch.
    pub partitions: usize,
    pub timeout_secs: u64,
    /// `{date}` is replaced with the issue date.
    pub subject_template: String,
    /// `{name}` is replaced with the recipient's display name.
    pub greeting_template: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            relay_host: "smtp.gmail.com".to_string(),
            relay_port: 587,
            sender_address: None,
            sender_secret: None,
            send_delay_ms: DEFAULT_SEND_DELAY_MS,
            partitions: 1,
            timeout_secs: 30,
            subject_template: "[KOBACO 브리핑] {date} 뉴스레터".to_string(),
            greeting_template:
                "<p>안녕하세요, <b>{name}</b>님.<br>오늘의 주요 뉴스 브리핑입니다.</p><br>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestSettings {
    /// `{date}` is replaced with the issue date.
    pub title_template: String,
    pub empty_marker: String,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            title_template: "📅 {date} 뉴스 브리핑".to_string(),
            empty_marker: "기사 없음".to_string(),
        }
    }
}

impl BriefingConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading briefing config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: BriefingConfig = if ext == "json" {
            serde_json::from_str(&data).context("parsing briefing config json")?
        } else {
            toml::from_str(&data).context("parsing briefing config toml")?
        };
        cfg.sanitized()
    }

    /// $BRIEFING_CONFIG_PATH, then config/briefing.toml, then config/briefing.json, then defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        for candidate in [DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_JSON] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
        }
        Self::defaults().sanitized()
    }

    pub fn defaults() -> Self {
        Self {
            keywords: default_keywords(),
            ..Default::default()
        }
    }

    fn sanitized(mut self) -> Result<Self> {
        if self.keywords.is_empty() {
            self.keywords = default_keywords();
        }
        self.keywords = crate::ingest::config::clean_keywords(self.keywords);

        let feed = &mut self.feed;
        if feed.max_entries == 0 || feed.max_entries > MAX_FEED_ENTRIES {
            feed.max_entries = MAX_FEED_ENTRIES;
        }
        feed.concurrency = feed.concurrency.clamp(1, 16);
        if !(-12..=14).contains(&feed.utc_offset_hours) {
            feed.utc_offset_hours = 0;
        }

        self.mail.partitions = self.mail.partitions.max(1);

        // Resolve secret if "ENV"
        if let Some(secret) = &self.mail.sender_secret {
            if secret.trim().eq_ignore_ascii_case("env") {
                let resolved = env::var(ENV_SMTP_PASS)
                    .map_err(|_| anyhow!("Missing {ENV_SMTP_PASS} env var"))?;
                self.mail.sender_secret = Some(resolved);
            }
        }
        Ok(self)
    }
}
