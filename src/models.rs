//! Core data models used throughout Thesis Harness.
//!
//! These types represent the documents, sections, chunks, and search results
//! that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A body section produced by the TEI parser before chunking.
#[derive(Debug, Clone)]
pub struct RawSection {
    pub heading: Option<String>,
    pub body: String,
}

/// Header-level metadata extracted from a TEI document.
#[derive(Debug, Clone, Default)]
pub struct DocumentMeta {
    pub title: Option<String>,
    /// Author full names joined with `"; "`.
    pub authors: Option<String>,
    /// Publication date as written in the TEI header (`when` attribute).
    pub date: Option<String>,
    pub abstract_text: Option<String>,
    /// Keyword terms joined with `", "`.
    pub keywords: Option<String>,
    /// Institution names joined with `"; "`.
    pub affiliations: Option<String>,
    pub journal: Option<String>,
    pub editorial: Option<String>,
    pub doi: Option<String>,
    pub conference: Option<String>,
    pub isbn: Option<String>,
    /// `"spanish"` or `"english"`, detected from the body text.
    pub language: String,
}

/// Semantic role assigned to a section heading.
///
/// The taxonomy is closed; anything the classifier cannot place with enough
/// confidence falls back to [`SectionCategory::Otros`]. Serialized names are
/// the snake_case Spanish identifiers used in the database and on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionCategory {
    Resumen,
    Abstract,
    Introduccion,
    Antecedentes,
    EstadoDelArte,
    Objetivos,
    ObjetivoGeneral,
    Justificacion,
    Hipotesis,
    Metodologia,
    Resultados,
    Conclusiones,
    Otros,
}

impl SectionCategory {
    pub const ALL: [SectionCategory; 13] = [
        SectionCategory::Resumen,
        SectionCategory::Abstract,
        SectionCategory::Introduccion,
        SectionCategory::Antecedentes,
        SectionCategory::EstadoDelArte,
        SectionCategory::Objetivos,
        SectionCategory::ObjetivoGeneral,
        SectionCategory::Justificacion,
        SectionCategory::Hipotesis,
        SectionCategory::Metodologia,
        SectionCategory::Resultados,
        SectionCategory::Conclusiones,
        SectionCategory::Otros,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionCategory::Resumen => "resumen",
            SectionCategory::Abstract => "abstract",
            SectionCategory::Introduccion => "introduccion",
            SectionCategory::Antecedentes => "antecedentes",
            SectionCategory::EstadoDelArte => "estado_del_arte",
            SectionCategory::Objetivos => "objetivos",
            SectionCategory::ObjetivoGeneral => "objetivo_general",
            SectionCategory::Justificacion => "justificacion",
            SectionCategory::Hipotesis => "hipotesis",
            SectionCategory::Metodologia => "metodologia",
            SectionCategory::Resultados => "resultados",
            SectionCategory::Conclusiones => "conclusiones",
            SectionCategory::Otros => "otros",
        }
    }

    pub fn parse(s: &str) -> Option<SectionCategory> {
        SectionCategory::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
    }
}

impl std::fmt::Display for SectionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded, boundary-aligned segment of a section's body text.
///
/// Offsets are byte offsets into the whitespace-normalized parent text and
/// always fall on char boundaries. `overlap_start`/`overlap_end` record the
/// lookback/lookahead window available to a downstream re-assembler; they are
/// not the chunk's own boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub size_chars: usize,
    /// 0-based, strictly increasing within one parent section.
    pub sequence_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub overlap_start: usize,
    pub overlap_end: usize,
}

/// A chunk row joined to its parent document's attributes, as resolved from
/// the metadata store during search.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub category: SectionCategory,
    pub section_title: Option<String>,
    pub text: String,
    pub meta: DocumentMeta,
    pub filename: String,
}

/// One search result. Transient, never persisted.
///
/// `score` is the raw distance reported by the vector index; lower means
/// more similar under L2 metrics.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f32,
    pub category: SectionCategory,
    pub section_title: Option<String>,
    pub text: String,
    pub meta: DocumentMeta,
    pub filename: String,
}

impl SearchHit {
    pub fn from_record(record: ChunkRecord, score: f32) -> Self {
        SearchHit {
            chunk_id: record.chunk_id,
            score,
            category: record.category,
            section_title: record.section_title,
            text: record.text,
            meta: record.meta,
            filename: record.filename,
        }
    }
}
