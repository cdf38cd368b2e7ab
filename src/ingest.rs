//! Ingestion pipeline: PDF -> GROBID -> TEI -> classified sections -> chunks.
//!
//! Each document is fingerprinted before any extraction work happens, so
//! re-running ingestion over the same directory is cheap and idempotent.
//! A document that fails any stage is reported and skipped; the run
//! continues with the remaining files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::chunk::{chunk_text, estimate_tokens};
use crate::classify::categorize;
use crate::config::Config;
use crate::db;
use crate::embedding::embed_texts;
use crate::extract::GrobidClient;
use crate::index::{FlatIndex, RetrievalIndex};
use crate::migrate;
use crate::store::{ChunkKeyAllocator, MetadataStore};
use crate::tei::{parse_tei, TeiDocument};

pub struct IngestOptions {
    pub dry_run: bool,
    pub limit: Option<usize>,
}

#[derive(Default)]
struct IngestSummary {
    ingested: usize,
    duplicates: usize,
    failed: usize,
    sections: usize,
    chunks: usize,
    embedded: usize,
}

enum Outcome {
    Ingested {
        sections: usize,
        chunks: usize,
        embedded: usize,
    },
    Duplicate,
    WouldIngest,
}

pub async fn run_ingest(config: &Config, path: &Path, options: IngestOptions) -> Result<()> {
    let mut pdfs = collect_pdfs(path)?;
    if let Some(limit) = options.limit {
        pdfs.truncate(limit);
    }
    if pdfs.is_empty() {
        bail!("No PDF files found under {}", path.display());
    }

    let client = GrobidClient::new(&config.extraction)?;
    if !options.dry_run && !client.is_alive().await {
        bail!(
            "GROBID server at {} is not responding; is it running?",
            config.extraction.grobid_url
        );
    }

    let pool = db::connect(config).await?;
    migrate::create_schema(&pool).await?;
    let store = MetadataStore::new(pool.clone());

    println!(
        "Ingesting {} file(s) from {}{}",
        pdfs.len(),
        path.display(),
        if options.dry_run { " (dry run)" } else { "" }
    );

    let mut summary = IngestSummary::default();

    for pdf in &pdfs {
        let filename = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| pdf.display().to_string());

        match ingest_one(config, &client, &store, pdf, &filename, options.dry_run).await {
            Ok(Outcome::Ingested {
                sections,
                chunks,
                embedded,
            }) => {
                println!(
                    "  {} -> {} section(s), {} chunk(s){}",
                    filename,
                    sections,
                    chunks,
                    if embedded > 0 {
                        format!(", {} embedded", embedded)
                    } else {
                        String::new()
                    }
                );
                summary.ingested += 1;
                summary.sections += sections;
                summary.chunks += chunks;
                summary.embedded += embedded;
            }
            Ok(Outcome::Duplicate) => {
                println!("  {} -> already ingested, skipping", filename);
                summary.duplicates += 1;
            }
            Ok(Outcome::WouldIngest) => {
                println!("  {} -> would ingest", filename);
                summary.ingested += 1;
            }
            Err(e) => {
                eprintln!("  {} -> failed: {:#}", filename, e);
                summary.failed += 1;
            }
        }
    }

    println!(
        "\nDone: {} ingested, {} duplicate(s), {} failed ({} sections, {} chunks, {} embedded)",
        summary.ingested,
        summary.duplicates,
        summary.failed,
        summary.sections,
        summary.chunks,
        summary.embedded
    );
    if !config.embedding.is_enabled() && summary.chunks > 0 {
        println!("Embedding is disabled; run `tsh index pending` after enabling a provider.");
    }

    pool.close().await;
    Ok(())
}

async fn ingest_one(
    config: &Config,
    client: &GrobidClient,
    store: &MetadataStore,
    pdf: &Path,
    filename: &str,
    dry_run: bool,
) -> Result<Outcome> {
    let bytes = std::fs::read(pdf).with_context(|| format!("Failed to read {}", pdf.display()))?;
    let fingerprint = fingerprint(&bytes);

    if store.find_by_fingerprint(&fingerprint).await?.is_some() {
        return Ok(Outcome::Duplicate);
    }
    if dry_run {
        return Ok(Outcome::WouldIngest);
    }

    let xml = client.process_fulltext(bytes, filename).await?;
    let tei = parse_tei(&xml)?;
    if tei.sections.is_empty() {
        bail!("No body sections extracted");
    }

    let candidate_id = uuid::Uuid::new_v4().to_string();
    let (document_id, existed) = store
        .insert_document_if_absent(
            &candidate_id,
            filename,
            &fingerprint,
            &tei.meta,
            tei.sections.len(),
            tei.references.len(),
        )
        .await?;
    if existed {
        // A concurrent ingestion of the same content won the race.
        return Ok(Outcome::Duplicate);
    }

    let (sections, chunks) = persist_document(config, store, &document_id, &tei).await?;

    let embedded = if config.embedding.is_enabled() {
        match embed_pending_for_document(config, store, &document_id).await {
            Ok(n) => n,
            Err(e) => {
                eprintln!(
                    "  {} -> embedding failed ({:#}); chunks stay pending",
                    filename, e
                );
                0
            }
        }
    } else {
        0
    };

    Ok(Outcome::Ingested {
        sections,
        chunks,
        embedded,
    })
}

async fn persist_document(
    config: &Config,
    store: &MetadataStore,
    document_id: &str,
    tei: &TeiDocument,
) -> Result<(usize, usize)> {
    let mut allocator = ChunkKeyAllocator::new(document_id);
    let mut section_count = 0usize;

    for (idx, section) in tei.sections.iter().enumerate() {
        let heading = section.heading.as_deref().unwrap_or("");
        let category = categorize(heading, &section.body, &config.classifier);
        let section_id = format!("{}_sec_{:03}", document_id, idx);

        store
            .insert_section(
                &section_id,
                document_id,
                section.heading.as_deref(),
                category,
                section.body.len(),
                estimate_tokens(&section.body),
            )
            .await?;
        section_count += 1;

        for chunk in chunk_text(
            &section.body,
            config.chunking.chunk_size_chars,
            config.chunking.overlap_chars,
        ) {
            let key = allocator.next_key();
            store
                .insert_chunk(&key, document_id, &section_id, category, &chunk)
                .await?;
        }
    }

    for (idx, reference) in tei.references.iter().enumerate() {
        store.insert_reference(document_id, idx, reference).await?;
    }

    Ok((section_count, allocator.allocated()))
}

/// Embed this document's fresh chunks in batches and add them to the index.
async fn embed_pending_for_document(
    config: &Config,
    store: &MetadataStore,
    document_id: &str,
) -> Result<usize> {
    let dims = config
        .embedding
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required"))?;
    let index = FlatIndex::new(store.pool().clone(), dims);

    let pending: Vec<(String, String)> = store
        .pending_chunks(None)
        .await?
        .into_iter()
        .filter(|(id, _)| id.starts_with(document_id))
        .collect();

    let mut added = 0usize;
    for batch in pending.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
        let embeddings = embed_texts(&config.embedding, &texts).await?;
        if embeddings.len() != batch.len() {
            bail!(
                "Provider returned {} embeddings for {} texts",
                embeddings.len(),
                batch.len()
            );
        }
        for ((chunk_id, _), embedding) in batch.iter().zip(embeddings.iter()) {
            index.add(chunk_id, embedding).await?;
            added += 1;
        }
    }
    Ok(added)
}

/// SHA-256 of the raw PDF bytes, hex-encoded.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn collect_pdfs(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("Path does not exist: {}", path.display());
    }

    let mut pdfs: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = fingerprint(b"hello");
        assert_eq!(fp.len(), 64);
        assert_eq!(
            fp,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn identical_bytes_share_a_fingerprint() {
        assert_eq!(fingerprint(b"same"), fingerprint(b"same"));
        assert_ne!(fingerprint(b"same"), fingerprint(b"different"));
    }

    #[test]
    fn collect_finds_pdfs_recursively_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("nested/c.pdf"), b"x").unwrap();

        let pdfs = collect_pdfs(dir.path()).unwrap();
        let names: Vec<String> = pdfs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn collect_accepts_a_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.pdf");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(collect_pdfs(&file).unwrap(), vec![file]);
    }

    #[test]
    fn collect_rejects_missing_path() {
        assert!(collect_pdfs(Path::new("/nonexistent/nowhere")).is_err());
    }
}
