//! Downloadable artifacts built from a rendered [`Document`].

use chrono::NaiveDate;

use crate::digest::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn markdown_artifact(doc: &Document, today: NaiveDate) -> Artifact {
    Artifact {
        filename: dated_filename("md", today),
        content_type: "text/markdown; charset=utf-8",
        bytes: doc.to_markdown().into_bytes(),
    }
}

/// One row per article; keywords without articles get a row with the empty marker.
/// Starts with a UTF-8 BOM so spreadsheet apps pick the right encoding.
pub fn csv_artifact(doc: &Document, today: NaiveDate) -> Artifact {
    let mut out = String::from("\u{feff}keyword,title,link,published\r\n");
    for section in &doc.sections {
        let entries = section.entries();
        if entries.is_empty() {
            push_row(&mut out, &[&section.keyword, &doc.empty_marker, "", ""]);
        }
        for e in entries {
            push_row(
                &mut out,
                &[&section.keyword, &e.title, &e.link, &e.published_raw],
            );
        }
    }
    Artifact {
        filename: dated_filename("csv", today),
        content_type: "text/csv; charset=utf-8",
        bytes: out.into_bytes(),
    }
}

pub fn dated_filename(ext: &str, today: NaiveDate) -> String {
    format!("briefing_{}.{ext}", today.format("%Y%m%d"))
}

fn push_row(out: &mut String, cells: &[&str]) {
    let row: Vec<String> = cells.iter().map(|c| csv_cell(c)).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

fn csv_cell(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
