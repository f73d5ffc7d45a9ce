// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "BRIEFING_KEYWORDS_PATH";

/// Split operator input like `"방송광고, OTT 광고,, "` into clean keywords.
pub fn parse_keyword_input(input: &str) -> Vec<String> {
    clean_keywords(input.split(',').map(str::to_string))
}

/// Load keywords from an explicit path. Supports TOML or JSON formats.
pub fn load_keywords_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading keywords from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_keywords(&content, ext.as_str())
}

/// Load keywords using env var + fallbacks:
/// 1) $BRIEFING_KEYWORDS_PATH
/// 2) config/keywords.toml
/// 3) config/keywords.json
pub fn load_keywords_default() -> Result<Vec<String>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_keywords_from(&pb);
        } else {
            return Err(anyhow!("BRIEFING_KEYWORDS_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/keywords.toml");
    if toml_p.exists() {
        return load_keywords_from(&toml_p);
    }
    let json_p = PathBuf::from("config/keywords.json");
    if json_p.exists() {
        return load_keywords_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_keywords(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("keywords");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported keyword list format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlKw {
        keywords: Vec<String>,
    }
    let v: TomlKw = toml::from_str(s)?;
    Ok(clean_keywords(v.keywords))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_keywords(v))
}

/// Trim, drop empties and drop repeats. First occurrence wins, order is kept.
pub fn clean_keywords<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_string()) {
            out.push(t.to_string());
        }
    }
    out
}
