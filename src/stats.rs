//! `stats`: corpus-level counts for a quick health check.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::store::MetadataStore;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = MetadataStore::new(pool.clone());

    let stats = store.stats().await?;

    println!("Database: {}", config.db.path.display());
    println!("  Documents:      {}", stats.documents);
    println!("  Sections:       {}", stats.sections);
    println!("  Chunks:         {}", stats.chunks);
    println!("  Vectors:        {}", stats.vectors);
    println!("  Pending chunks: {}", stats.pending_chunks);

    if stats.chunks > 0 {
        println!(
            "  Chunk size:     avg {:.0}, min {}, max {} chars",
            stats.chunk_size_avg, stats.chunk_size_min, stats.chunk_size_max
        );
    }

    let rows = sqlx::query(
        "SELECT category, COUNT(*) AS n FROM sections GROUP BY category ORDER BY n DESC",
    )
    .fetch_all(&pool)
    .await?;
    if !rows.is_empty() {
        println!("  Sections by category:");
        for row in rows {
            let category: String = row.get("category");
            let n: i64 = row.get("n");
            println!("    {:<18} {}", category, n);
        }
    }

    pool.close().await;
    Ok(())
}
