// src/ingest/filter.rs
//! Date-range filter applied to each keyword's candidates.

use chrono::NaiveDate;

use crate::ingest::types::Article;

/// Keep articles with `start <= published_date <= end`, input order preserved.
pub fn filter_by_date(articles: Vec<Article>, start: NaiveDate, end: NaiveDate) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|a| is_within(a, start, end))
        .collect()
}

#[inline]
pub fn is_within(article: &Article, start: NaiveDate, end: NaiveDate) -> bool {
    start <= article.published_date && article.published_date <= end
}
