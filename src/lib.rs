//! # Thesis Harness
//!
//! A local-first ingestion and retrieval pipeline for academic theses and
//! papers. PDFs go through a GROBID server for structure extraction, the
//! resulting TEI is split into classified sections and overlapping chunks,
//! and retrieval combines vector ranking with metadata filtering over a
//! single SQLite database.
//!
//! ## Pipeline
//!
//! ```text
//! PDF -> GROBID (TEI XML) -> sections -> classify -> chunk -> SQLite
//!                                                        \-> embed -> vectors
//! ```
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | TOML configuration loading and validation |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`extract`] | GROBID HTTP client |
//! | [`tei`] | TEI XML parsing: metadata, sections, references |
//! | [`classify`] | Fuzzy section-category classification (ES/EN) |
//! | [`chunk`] | Sliding-window chunker with boundary snapping |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama) and vector math |
//! | [`index`] | Flat L2 vector index over SQLite |
//! | [`store`] | Metadata store and vector-id resolution |
//! | [`search`] | Hybrid searcher: over-fetch, filter, rank-preserving |
//! | [`ingest`] / [`index_cmd`] / [`search_cmd`] / [`stats`] | CLI commands |

pub mod chunk;
pub mod classify;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod index_cmd;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod search;
pub mod search_cmd;
pub mod stats;
pub mod store;
pub mod tei;
