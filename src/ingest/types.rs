// src/ingest/types.rs
use anyhow::{bail, Result};
use chrono::NaiveDate;
use url::Url;

/// One feed entry collected for a keyword. Within a briefing, `(keyword, link)` is unique.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Article {
    pub keyword: String,
    pub title: String,
    pub link: Url,
    pub published_raw: String, // as sent by the feed, e.g. "Fri, 05 Jan 2024 03:00:00 GMT"
    pub published_date: NaiveDate,
    pub summary: String,
}

/// A keyword plus the inclusive date range it is collected for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordQuery {
    pub keyword: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl KeywordQuery {
    pub fn new(keyword: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Result<Self> {
        let keyword = keyword.into();
        check_range(start_date, end_date)?;
        if keyword.trim().is_empty() {
            bail!("keyword must not be empty");
        }
        Ok(Self {
            keyword,
            start_date,
            end_date,
        })
    }
}

/// `start <= end`, checked before any fetch is issued.
pub fn check_range(start_date: NaiveDate, end_date: NaiveDate) -> Result<()> {
    if start_date > end_date {
        bail!("start date {start_date} is after end date {end_date}");
    }
    Ok(())
}

/// Raw access to a feed backend. Errors are reported here and absorbed by
/// [`crate::ingest::FeedClient`].
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_latest(&self, keyword: &str) -> Result<Vec<Article>>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_rejects_inverted_range_and_blank_keyword() {
        let jan1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let jan31 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert!(KeywordQuery::new("OTT 광고", jan1, jan31).is_ok());
        assert!(KeywordQuery::new("OTT 광고", jan1, jan1).is_ok());
        assert!(KeywordQuery::new("OTT 광고", jan31, jan1).is_err());
        assert!(KeywordQuery::new("  ", jan1, jan31).is_err());
    }
}
