//! # Recipient Roster
//!
//! - `normalize` turns raw `(name?, email?)` rows into recipients, dropping rows
//!   without a usable email and filling in a placeholder name.
//! - `RosterImporter` reads rows from a published spreadsheet (CSV export). When
//!   the source is missing, unreachable or lacks the expected columns it yields a
//!   single fallback row instead of failing; the import status says so.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RosterSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl RawRow {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub display_name: String,
    pub email: String,
}

/// Minimal address check used for roster rows and again right before sending.
pub fn is_valid_email(email: &str) -> bool {
    let e = email.trim();
    !e.is_empty() && e.contains('@')
}

pub fn normalize(rows: &[RawRow], placeholder_name: &str) -> Vec<Recipient> {
    rows.iter()
        .filter_map(|row| {
            let email = row.email.as_deref().map(str::trim).unwrap_or_default();
            if !is_valid_email(email) {
                return None;
            }
            let display_name = row
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(placeholder_name)
                .to_string();
            Some(Recipient {
                display_name,
                email: email.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ImportStatus {
    Loaded,
    /// The fallback row was substituted.
    Degraded(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterImport {
    pub rows: Vec<RawRow>,
    pub status: ImportStatus,
}

impl RosterImport {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, ImportStatus::Degraded(_))
    }
}

/// Google Sheets `/edit...` URL → CSV export URL. Other URLs pass through.
pub fn csv_export_url(sheet_url: &str) -> String {
    static RE_EDIT: OnceCell<Regex> = OnceCell::new();
    let re = RE_EDIT.get_or_init(|| Regex::new(r"/edit.*$").unwrap());
    re.replace(sheet_url.trim(), "/export?format=csv").to_string()
}

/// Rows from CSV text using `name_col` / `email_col` headers.
pub fn rows_from_csv(text: &str, name_col: &str, email_col: &str) -> Result<Vec<RawRow>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = parse_csv(text).into_iter();
    let header = records.next().ok_or_else(|| anyhow!("empty sheet"))?;
    let find = |col: &str| header.iter().position(|h| h.trim() == col);
    let (Some(name_idx), Some(email_idx)) = (find(name_col), find(email_col)) else {
        return Err(anyhow!("missing columns ('{name_col}', '{email_col}' required)"));
    };

    let cell = |rec: &Vec<String>, idx: usize| {
        rec.get(idx)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    Ok(records
        .filter(|rec| rec.iter().any(|c| !c.trim().is_empty()))
        .map(|rec| RawRow {
            name: cell(&rec, name_idx),
            email: cell(&rec, email_idx),
        })
        .collect())
}

/// RFC 4180-style records: quoted fields, doubled quotes, CRLF or LF.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

pub struct RosterImporter {
    settings: RosterSettings,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, (Instant, RosterImport)>>,
}

impl RosterImporter {
    pub fn new(settings: RosterSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &RosterSettings {
        &self.settings
    }

    fn fallback(&self, reason: impl Into<String>) -> RosterImport {
        let reason = reason.into();
        tracing::warn!(target: "roster", %reason, "using fallback roster row");
        RosterImport {
            rows: vec![RawRow::new(
                &self.settings.fallback_name,
                &self.settings.fallback_email,
            )],
            status: ImportStatus::Degraded(reason),
        }
    }

    /// Rows for `locator` (or the configured sheet), cached for the configured TTL.
    pub async fn load(&self, locator: Option<&str>) -> RosterImport {
        let locator = locator
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.settings.sheet_url.clone());
        let Some(url) = locator else {
            return self.fallback("no roster source configured");
        };

        let ttl = Duration::from_secs(self.settings.cache_ttl_secs);
        let cached = {
            let cache = self.cache.lock().expect("roster cache poisoned");
            cache
                .get(&url)
                .filter(|(at, _)| at.elapsed() < ttl)
                .map(|(_, hit)| hit.clone())
        };
        if let Some(hit) = cached {
            return hit;
        }

        let import = match self.fetch_rows(&url).await {
            Ok(rows) => RosterImport {
                rows,
                status: ImportStatus::Loaded,
            },
            Err(e) => self.fallback(format!("{e:#}")),
        };
        self.cache
            .lock()
            .expect("roster cache poisoned")
            .insert(url, (Instant::now(), import.clone()));
        import
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("roster cache poisoned").clear();
    }

    async fn fetch_rows(&self, sheet_url: &str) -> Result<Vec<RawRow>> {
        let csv_url = csv_export_url(sheet_url);
        let body = self
            .client
            .get(&csv_url)
            .send()
            .await
            .context("roster http get()")?
            .error_for_status()
            .context("roster non-2xx")?
            .text()
            .await
            .context("roster http .text()")?;
        rows_from_csv(&body, &self.settings.name_column, &self.settings.email_column)
    }
}
