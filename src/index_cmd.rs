//! `index pending`: embed the chunk backlog and add it to the vector index.
//!
//! Chunks land in the store with a NULL `vector_id` whenever ingestion runs
//! with embedding disabled or an embedding batch fails. This command drains
//! that backlog batch by batch; a failed batch is reported and skipped, and
//! its chunks stay pending for the next run.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, embed_texts};
use crate::index::{FlatIndex, RetrievalIndex};
use crate::store::MetadataStore;

pub struct IndexOptions {
    pub batch_size: Option<usize>,
    pub dry_run: bool,
}

pub async fn run_index_pending(config: &Config, options: IndexOptions) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled; set [embedding] in the config first");
    }
    let provider = create_provider(&config.embedding)?;
    let dims = provider.dims();

    let pool = db::connect(config).await?;
    let store = MetadataStore::new(pool.clone());

    let pending = store.pending_chunks(None).await?;
    if pending.is_empty() {
        println!("No pending chunks; index is up to date.");
        pool.close().await;
        return Ok(());
    }

    let batch_size = options.batch_size.unwrap_or(config.embedding.batch_size);
    println!(
        "{} pending chunk(s), batch size {}, model {} ({} dims){}",
        pending.len(),
        batch_size,
        provider.model_name(),
        dims,
        if options.dry_run { " (dry run)" } else { "" }
    );

    if options.dry_run {
        pool.close().await;
        return Ok(());
    }

    let index = FlatIndex::new(pool.clone(), dims);
    let mut added = 0usize;
    let mut failed_batches = 0usize;

    for batch in pending.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
        match embed_texts(&config.embedding, &texts).await {
            Ok(embeddings) if embeddings.len() == batch.len() => {
                for ((chunk_id, _), embedding) in batch.iter().zip(embeddings.iter()) {
                    index.add(chunk_id, embedding).await?;
                    added += 1;
                }
                println!("  embedded {}/{}", added, pending.len());
            }
            Ok(embeddings) => {
                eprintln!(
                    "  batch skipped: provider returned {} embeddings for {} texts",
                    embeddings.len(),
                    batch.len()
                );
                failed_batches += 1;
            }
            Err(e) => {
                eprintln!("  batch failed: {:#}", e);
                failed_batches += 1;
            }
        }
    }

    let remaining = store.count_pending().await?;
    println!(
        "\nDone: {} chunk(s) indexed, {} batch(es) failed, {} still pending",
        added, failed_batches, remaining
    );

    pool.close().await;
    Ok(())
}
