// src/ingest/providers/google_news.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::config::FeedSettings;
use crate::ingest::normalize_text;
use crate::ingest::types::{Article, FeedSource};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Google News keyword search over RSS.
pub struct GoogleNewsProvider {
    mode: Mode,
    max_entries: usize,
    offset: UtcOffset,
}

enum Mode {
    Fixture(String),
    Http {
        endpoint: Url,
        params: Vec<(String, String)>,
        client: reqwest::Client,
    },
}

impl GoogleNewsProvider {
    /// Serve the same XML document for every keyword.
    pub fn from_fixture(xml: &str) -> Self {
        let defaults = FeedSettings::default();
        Self {
            mode: Mode::Fixture(xml.to_string()),
            max_entries: defaults.max_entries,
            offset: offset_from_hours(defaults.utc_offset_hours),
        }
    }

    pub fn from_settings(settings: &FeedSettings) -> Result<Self> {
        let endpoint = Url::parse(&settings.endpoint)
            .with_context(|| format!("invalid feed endpoint {}", settings.endpoint))?;
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            mode: Mode::Http {
                endpoint,
                params: settings.params.clone(),
                client,
            },
            max_entries: settings.max_entries,
            offset: offset_from_hours(settings.utc_offset_hours),
        })
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_utc_offset_hours(mut self, hours: i8) -> Self {
        self.offset = offset_from_hours(hours);
        self
    }

    /// Search URL for `keyword`; the keyword is form-encoded into `q`.
    pub fn search_url(endpoint: &Url, params: &[(String, String)], keyword: &str) -> Url {
        let mut url = endpoint.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("q", keyword);
            for (k, v) in params {
                q.append_pair(k, v);
            }
        }
        url
    }

    fn parse_items_from_str(&self, s: &str, keyword: &str) -> Result<Vec<Article>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing google news rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len().min(self.max_entries));
        let mut dropped = 0u64;
        for it in rss.channel.item.into_iter().take(self.max_entries) {
            match self.to_article(it, keyword) {
                Some(a) => out.push(a),
                None => dropped += 1,
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("feed_parse_ms").record(ms);
        counter!("feed_entries_total").increment(out.len() as u64);
        counter!("feed_entries_dropped_total").increment(dropped);
        if dropped > 0 {
            tracing::debug!(target: "ingest", keyword, dropped, "dropped malformed feed entries");
        }
        Ok(out)
    }

    fn to_article(&self, it: Item, keyword: &str) -> Option<Article> {
        let title = normalize_text(it.title.as_deref()?);
        if title.is_empty() {
            return None;
        }
        let link = Url::parse(it.link.as_deref()?.trim()).ok()?;
        let published_raw = it.pub_date?.trim().to_string();
        let published_date = parse_published_date(&published_raw, self.offset)?;
        Some(Article {
            keyword: keyword.to_string(),
            title,
            link,
            published_raw,
            published_date,
            summary: it
                .description
                .as_deref()
                .map(normalize_text)
                .unwrap_or_default(),
        })
    }
}

#[async_trait]
impl FeedSource for GoogleNewsProvider {
    async fn fetch_latest(&self, keyword: &str) -> Result<Vec<Article>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s, keyword),
            Mode::Http {
                endpoint,
                params,
                client,
            } => {
                let url = Self::search_url(endpoint, params, keyword);
                let body = client
                    .get(url)
                    .send()
                    .await
                    .context("google news http get()")?
                    .error_for_status()
                    .context("google news non-2xx")?
                    .text()
                    .await
                    .context("google news http .text()")?;
                self.parse_items_from_str(&body, keyword)
            }
        }
    }

    fn name(&self) -> &'static str {
        "GoogleNews"
    }
}

fn offset_from_hours(hours: i8) -> UtcOffset {
    UtcOffset::from_hms(hours, 0, 0).unwrap_or(UtcOffset::UTC)
}

/// Calendar date of an RFC 2822 timestamp as seen from `offset`.
pub fn parse_published_date(raw: &str, offset: UtcOffset) -> Option<NaiveDate> {
    let normalized = normalize_zone_name(raw.trim());
    let dt = OffsetDateTime::parse(&normalized, &Rfc2822).ok()?;
    let date = dt.to_offset(offset).date();
    NaiveDate::from_ymd_opt(date.year(), u8::from(date.month()) as u32, date.day() as u32)
}

// Feeds commonly end timestamps with a zone name instead of a numeric offset.
fn normalize_zone_name(ts: &str) -> String {
    for name in [" GMT", " UTC", " UT", " Z"] {
        if let Some(head) = ts.strip_suffix(name) {
            return format!("{head} +0000");
        }
    }
    ts.to_string()
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&middot;", "·")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kst() -> UtcOffset {
        offset_from_hours(9)
    }

    #[test]
    fn gmt_timestamps_are_bucketed_in_offset() {
        let d = parse_published_date("Wed, 31 Jan 2024 16:30:00 GMT", kst()).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        let d = parse_published_date("Wed, 31 Jan 2024 16:30:00 GMT", UtcOffset::UTC).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn numeric_offsets_parse() {
        let d = parse_published_date("Fri, 05 Jan 2024 10:00:00 +0900", kst()).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn garbage_timestamps_are_rejected() {
        assert!(parse_published_date("yesterday", kst()).is_none());
        assert!(parse_published_date("", kst()).is_none());
    }

    #[test]
    fn search_url_escapes_keyword() {
        let endpoint = Url::parse("https://news.google.com/rss/search").unwrap();
        let params = vec![("hl".to_string(), "ko".to_string())];
        let url = GoogleNewsProvider::search_url(&endpoint, &params, "OTT 광고&x");
        let s = url.as_str();
        assert!(s.starts_with("https://news.google.com/rss/search?q="));
        assert!(s.contains("OTT+"));
        assert!(s.contains("%26x"));
        assert!(s.ends_with("&hl=ko"));
    }

    #[tokio::test]
    async fn malformed_entries_are_dropped_and_cap_applies() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>t</title>
<item><title>Good one</title><link>https://a.example/1</link><pubDate>Mon, 15 Jan 2024 03:00:00 GMT</pubDate><description>&lt;a href="x"&gt;Body&lt;/a&gt;&amp;nbsp;text</description></item>
<item><title>No date</title><link>https://a.example/2</link></item>
<item><title>Bad date</title><link>https://a.example/3</link><pubDate>not a date</pubDate></item>
<item><title>Bad link</title><link>not a url</link><pubDate>Mon, 15 Jan 2024 03:00:00 GMT</pubDate></item>
<item><title>Second good</title><link>https://a.example/5</link><pubDate>Tue, 16 Jan 2024 03:00:00 GMT</pubDate></item>
<item><title>Beyond cap</title><link>https://a.example/6</link><pubDate>Tue, 16 Jan 2024 03:00:00 GMT</pubDate></item>
</channel></rss>"#;
        let p = GoogleNewsProvider::from_fixture(xml).with_max_entries(5);
        let items = p.fetch_latest("kw").await.unwrap();
        let titles: Vec<_> = items.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Good one", "Second good"]);
        assert_eq!(items[0].keyword, "kw");
        assert_eq!(items[0].summary, "Body text");
        assert_eq!(items[0].published_raw, "Mon, 15 Jan 2024 03:00:00 GMT");
    }

    #[tokio::test]
    async fn empty_channel_yields_nothing() {
        let xml = r#"<rss version="2.0"><channel><title>t</title></channel></rss>"#;
        let p = GoogleNewsProvider::from_fixture(xml);
        assert!(p.fetch_latest("kw").await.unwrap().is_empty());
    }
}
