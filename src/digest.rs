//! # Digest Renderer
//! Pure transform from a [`BriefingSnapshot`] into a [`Document`] and from a
//! document into its HTML (mail, preview) and markdown (export) forms.

use chrono::NaiveDate;
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Serialize;
use std::fmt::Write as _;

use crate::briefing::BriefingSnapshot;
use crate::config::DigestSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestEntry {
    pub title: String,
    pub link: String,
    pub published_raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum SectionBody {
    Entries(Vec<DigestEntry>),
    /// The keyword had no articles in range.
    NoArticles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub keyword: String,
    pub body: SectionBody,
}

impl Section {
    pub fn entries(&self) -> &[DigestEntry] {
        match &self.body {
            SectionBody::Entries(v) => v,
            SectionBody::NoArticles => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub title: String,
    pub issue_date: NaiveDate,
    pub empty_marker: String,
    pub sections: Vec<Section>,
}

pub struct DigestRenderer {
    settings: DigestSettings,
}

impl DigestRenderer {
    pub fn new(settings: DigestSettings) -> Self {
        Self { settings }
    }

    /// Sections follow `keyword_order`; keywords absent from the snapshot render as empty.
    pub fn render(
        &self,
        snapshot: &BriefingSnapshot,
        keyword_order: &[String],
        issue_date: NaiveDate,
    ) -> Document {
        let sections = keyword_order
            .iter()
            .map(|kw| {
                let articles = snapshot.get(kw).unwrap_or(&[]);
                let body = if articles.is_empty() {
                    SectionBody::NoArticles
                } else {
                    SectionBody::Entries(
                        articles
                            .iter()
                            .map(|a| DigestEntry {
                                title: a.title.clone(),
                                link: a.link.to_string(),
                                published_raw: a.published_raw.clone(),
                            })
                            .collect(),
                    )
                };
                Section {
                    keyword: kw.clone(),
                    body,
                }
            })
            .collect();

        Document {
            title: fill_date(&self.settings.title_template, issue_date),
            issue_date,
            empty_marker: self.settings.empty_marker.clone(),
            sections,
        }
    }
}

impl Default for DigestRenderer {
    fn default() -> Self {
        Self::new(DigestSettings::default())
    }
}

/// Korean long date used in titles, e.g. `2024년 01월 15일`.
pub fn long_date(date: NaiveDate) -> String {
    date.format("%Y년 %m월 %d일").to_string()
}

pub(crate) fn fill_date(template: &str, date: NaiveDate) -> String {
    template.replace("{date}", &long_date(date))
}

impl Document {
    pub fn article_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries().len()).sum()
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "<h2>{}</h2><hr>", encode_text(&self.title));
        for section in &self.sections {
            let _ = write!(out, "<h3>[{}]</h3><ul>", encode_text(&section.keyword));
            match &section.body {
                SectionBody::NoArticles => {
                    let _ = write!(out, "<li>{}</li>", encode_text(&self.empty_marker));
                }
                SectionBody::Entries(entries) => {
                    for e in entries {
                        let _ = write!(
                            out,
                            "<li><a href=\"{}\"><b>{}</b></a><br><small>{}</small></li>",
                            encode_double_quoted_attribute(&e.link),
                            encode_text(&e.title),
                            encode_text(&e.published_raw)
                        );
                    }
                }
            }
            out.push_str("</ul><br>");
        }
        out
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", self.title);
        for section in &self.sections {
            let _ = writeln!(out, "## {}\n", section.keyword);
            match &section.body {
                SectionBody::NoArticles => {
                    let _ = writeln!(out, "- {}", self.empty_marker);
                }
                SectionBody::Entries(entries) => {
                    for e in entries {
                        let _ = writeln!(
                            out,
                            "- [{}]({}) ({})",
                            escape_md_link_text(&e.title),
                            e.link,
                            e.published_raw
                        );
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

fn escape_md_link_text(s: &str) -> String {
    s.replace('[', "\\[").replace(']', "\\]")
}
