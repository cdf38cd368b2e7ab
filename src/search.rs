//! Hybrid retrieval: vector ranking combined with metadata filtering.
//!
//! The searcher over-fetches from the vector index, then walks the ranking
//! in order, resolving each vector id to its chunk row and applying the
//! section and attribute filters. Rank order is the index's order — hits are
//! never re-sorted here — and filtering stops as soon as `top_k` hits
//! survive. Over-fetching is the only mitigation for filters discarding
//! candidates; there is no second query if the budget runs dry.

use std::sync::Arc;

use anyhow::Result;

use crate::config::RetrievalConfig;
use crate::index::RetrievalIndex;
use crate::models::{ChunkRecord, SearchHit, SectionCategory};
use crate::store::HitResolver;

/// One `key=value` attribute constraint. All constraints are conjunctive.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeFilter {
    /// Case-insensitive substring on the document title.
    Title(String),
    /// Membership in the `"; "`-delimited author list (substring per entry).
    Author(String),
    /// Prefix match on the publication date, e.g. `year=2021`.
    Year(String),
    /// Case-insensitive substring on the journal name.
    Journal(String),
    /// Case-insensitive substring on the publisher.
    Editorial(String),
    /// Exact DOI.
    Doi(String),
    /// Case-insensitive substring on the conference/meeting name.
    Conference(String),
    /// Exact ISBN.
    Isbn(String),
    /// Case-insensitive substring on the abstract.
    Abstract(String),
    /// Membership in the `", "`-delimited keyword list.
    Keyword(String),
    /// Membership in the `"; "`-delimited affiliation list.
    Affiliation(String),
    /// Case-insensitive substring on the source filename.
    Filename(String),
    /// Exact language (`spanish` / `english`), case-insensitive.
    Language(String),
}

impl AttributeFilter {
    /// Parse one `key=value` expression. Returns `None` (after a warning)
    /// for malformed expressions and unknown keys, which the caller treats
    /// as no-ops rather than hard errors.
    pub fn parse(raw: &str) -> Option<AttributeFilter> {
        let Some((key, value)) = raw.split_once('=') else {
            eprintln!("Warning: ignoring malformed filter '{}' (expected key=value)", raw);
            return None;
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            eprintln!("Warning: ignoring filter '{}' with empty value", raw);
            return None;
        }
        match key.trim().to_lowercase().as_str() {
            "title" => Some(AttributeFilter::Title(value)),
            "author" | "authors" => Some(AttributeFilter::Author(value)),
            "year" => Some(AttributeFilter::Year(value)),
            "journal" => Some(AttributeFilter::Journal(value)),
            "editorial" | "publisher" => Some(AttributeFilter::Editorial(value)),
            "doi" => Some(AttributeFilter::Doi(value)),
            "conference" => Some(AttributeFilter::Conference(value)),
            "isbn" => Some(AttributeFilter::Isbn(value)),
            "abstract" => Some(AttributeFilter::Abstract(value)),
            "keyword" | "keywords" => Some(AttributeFilter::Keyword(value)),
            "affiliation" | "affiliations" => Some(AttributeFilter::Affiliation(value)),
            "filename" => Some(AttributeFilter::Filename(value)),
            "language" => Some(AttributeFilter::Language(value)),
            other => {
                eprintln!("Warning: ignoring unknown filter key '{}'", other);
                None
            }
        }
    }

    pub fn matches(&self, record: &ChunkRecord) -> bool {
        let meta = &record.meta;
        match self {
            AttributeFilter::Title(v) => substr_ci(meta.title.as_deref(), v),
            AttributeFilter::Author(v) => list_any(meta.authors.as_deref(), ';', v),
            AttributeFilter::Year(v) => meta
                .date
                .as_deref()
                .map(|d| d.starts_with(v.as_str()))
                .unwrap_or(false),
            AttributeFilter::Journal(v) => substr_ci(meta.journal.as_deref(), v),
            AttributeFilter::Editorial(v) => substr_ci(meta.editorial.as_deref(), v),
            AttributeFilter::Doi(v) => meta.doi.as_deref() == Some(v.as_str()),
            AttributeFilter::Conference(v) => substr_ci(meta.conference.as_deref(), v),
            AttributeFilter::Isbn(v) => meta.isbn.as_deref() == Some(v.as_str()),
            AttributeFilter::Abstract(v) => substr_ci(meta.abstract_text.as_deref(), v),
            AttributeFilter::Keyword(v) => list_any(meta.keywords.as_deref(), ',', v),
            AttributeFilter::Affiliation(v) => list_any(meta.affiliations.as_deref(), ';', v),
            AttributeFilter::Filename(v) => substr_ci(Some(&record.filename), v),
            AttributeFilter::Language(v) => meta.language.eq_ignore_ascii_case(v),
        }
    }
}

fn substr_ci(field: Option<&str>, needle: &str) -> bool {
    field
        .map(|f| f.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

fn list_any(field: Option<&str>, sep: char, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    field
        .map(|f| {
            f.split(sep)
                .any(|entry| entry.trim().to_lowercase().contains(&needle))
        })
        .unwrap_or(false)
}

/// Parse a batch of raw `key=value` expressions, dropping the invalid ones.
pub fn parse_filters(raw: &[String]) -> Vec<AttributeFilter> {
    raw.iter().filter_map(|r| AttributeFilter::parse(r)).collect()
}

pub struct HybridSearcher {
    index: Arc<dyn RetrievalIndex>,
    resolver: Arc<dyn HitResolver>,
    config: RetrievalConfig,
}

impl HybridSearcher {
    pub fn new(
        index: Arc<dyn RetrievalIndex>,
        resolver: Arc<dyn HitResolver>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            resolver,
            config,
        }
    }

    /// Run one query. An empty `sections` slice means no section constraint.
    ///
    /// Vector ids with no resolvable chunk row are skipped; they can only
    /// appear if the store was modified out of band, and dropping them keeps
    /// a query usable on a partially damaged store.
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        sections: &[SectionCategory],
        filters: &[AttributeFilter],
    ) -> Result<Vec<SearchHit>> {
        let fetch = top_k.saturating_mul(self.config.overfetch_factor).max(top_k);
        let candidates = self.index.search(query, fetch).await?;

        let mut hits = Vec::with_capacity(top_k);
        for (vector_id, score) in candidates {
            let Some(record) = self.resolver.resolve(vector_id).await? else {
                continue;
            };
            if !sections.is_empty() && !sections.contains(&record.category) {
                continue;
            }
            if !filters.iter().all(|f| f.matches(&record)) {
                continue;
            }
            hits.push(SearchHit::from_record(record, score));
            if hits.len() == top_k {
                break;
            }
        }
        Ok(hits)
    }
}
