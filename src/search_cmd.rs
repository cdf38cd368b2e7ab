//! `search`: embed the query, run the hybrid searcher, print the hits.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, embed_query};
use crate::index::FlatIndex;
use crate::models::{SearchHit, SectionCategory};
use crate::search::{parse_filters, HybridSearcher};
use crate::store::MetadataStore;

pub struct SearchOptions {
    pub query: String,
    pub limit: Option<usize>,
    /// Comma-separated category names, e.g. `metodologia,resultados`.
    pub sections: Option<String>,
    /// Raw `key=value` attribute filters.
    pub filters: Vec<String>,
}

pub async fn run_search(config: &Config, options: SearchOptions) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Search requires an embedding provider; embedding is disabled in the config");
    }

    let sections = parse_sections(options.sections.as_deref())?;
    let filters = parse_filters(&options.filters);
    let top_k = options.limit.unwrap_or(config.retrieval.final_limit);

    let provider = create_provider(&config.embedding)?;
    let query_vec = embed_query(&config.embedding, &options.query).await?;

    let pool = db::connect(config).await?;
    let dims = provider.dims();

    let index = Arc::new(FlatIndex::new(pool.clone(), dims));
    let resolver = Arc::new(MetadataStore::new(pool.clone()));
    let searcher = HybridSearcher::new(index, resolver, config.retrieval.clone());

    let hits = searcher
        .search(&query_vec, top_k, &sections, &filters)
        .await?;

    if hits.is_empty() {
        println!("No results.");
    } else {
        for (rank, hit) in hits.iter().enumerate() {
            print_hit(rank + 1, hit);
        }
    }

    pool.close().await;
    Ok(())
}

fn parse_sections(raw: Option<&str>) -> Result<Vec<SectionCategory>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            SectionCategory::parse(name).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown section category '{}'. Valid categories: {}",
                    name,
                    SectionCategory::ALL
                        .iter()
                        .map(|c| c.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
        })
        .collect()
}

fn print_hit(rank: usize, hit: &SearchHit) {
    println!("{}. [{:.4}] {} ({})", rank, hit.score, hit.chunk_id, hit.category);
    if let Some(title) = &hit.meta.title {
        println!("   {}", title);
    }
    let mut byline = Vec::new();
    if let Some(authors) = &hit.meta.authors {
        byline.push(authors.clone());
    }
    if let Some(date) = &hit.meta.date {
        byline.push(date.clone());
    }
    byline.push(hit.filename.clone());
    println!("   {}", byline.join(" | "));
    if let Some(section) = &hit.section_title {
        println!("   Section: {}", section);
    }

    let preview: String = hit.text.chars().take(240).collect();
    let ellipsis = if hit.text.chars().count() > 240 { "..." } else { "" };
    println!("   {}{}\n", preview, ellipsis);
}
