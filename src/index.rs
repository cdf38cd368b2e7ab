//! Vector index.
//!
//! [`RetrievalIndex`] is the seam between the searcher and the concrete
//! index; [`FlatIndex`] is the only implementation: an exhaustive L2 scan
//! over embedding blobs stored in the SQLite `vectors` table. Flat search is
//! exact and needs no training or tuning, and at the corpus sizes this tool
//! targets (thousands of chunks) a full scan is well under interactive
//! latency.
//!
//! Vector ids are assigned by SQLite AUTOINCREMENT, so they are monotonic
//! and never reused. Assignment and the chunk back-reference happen in one
//! transaction: there is no window where a vector exists without its chunk
//! knowing its id.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, l2_distance, vec_to_blob};

#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Store one embedding for a chunk and return its assigned vector id.
    async fn add(&self, chunk_id: &str, embedding: &[f32]) -> Result<i64>;

    /// Nearest neighbours of `query`: `(vector_id, distance)` pairs sorted
    /// by ascending distance, at most `top_n` of them.
    async fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<(i64, f32)>>;

    fn dims(&self) -> usize;
}

/// Exhaustive L2 index over the SQLite `vectors` table.
pub struct FlatIndex {
    pool: SqlitePool,
    dims: usize,
}

impl FlatIndex {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }

    /// Number of stored vectors.
    pub async fn len(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl RetrievalIndex for FlatIndex {
    async fn add(&self, chunk_id: &str, embedding: &[f32]) -> Result<i64> {
        if embedding.len() != self.dims {
            bail!(
                "Embedding dimension mismatch: got {}, index expects {}",
                embedding.len(),
                self.dims
            );
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO vectors (chunk_id, dims, embedding, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(chunk_id)
        .bind(self.dims as i64)
        .bind(vec_to_blob(embedding))
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        let vector_id = result.last_insert_rowid();

        let updated = sqlx::query("UPDATE chunks SET vector_id = ? WHERE id = ?")
            .bind(vector_id)
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() != 1 {
            bail!("No chunk row for id '{}'", chunk_id);
        }

        tx.commit().await?;
        Ok(vector_id)
    }

    async fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<(i64, f32)>> {
        if query.len() != self.dims {
            bail!(
                "Query dimension mismatch: got {}, index expects {}",
                query.len(),
                self.dims
            );
        }
        if top_n == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT vector_id, embedding FROM vectors ORDER BY vector_id")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<(i64, f32)> = rows
            .into_iter()
            .map(|r| {
                let id: i64 = r.get("vector_id");
                let blob: Vec<u8> = r.get("embedding");
                (id, l2_distance(query, &blob_to_vec(&blob)))
            })
            .collect();

        // Stable sort keeps insertion order among exact ties.
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_n);
        Ok(scored)
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::models::{Chunk, SectionCategory};
    use crate::store::MetadataStore;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn seeded_pool(chunk_ids: &[&str]) -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        migrate::create_schema(&pool).await.unwrap();

        let store = MetadataStore::new(pool.clone());
        store
            .insert_document_if_absent("doc1", "a.pdf", "fp-1", &Default::default(), 1, 0)
            .await
            .unwrap();
        store
            .insert_section("sec1", "doc1", None, SectionCategory::Otros, 0, 0)
            .await
            .unwrap();
        for (seq, id) in chunk_ids.iter().enumerate() {
            let chunk = Chunk {
                text: format!("text {}", seq),
                size_chars: 6,
                sequence_index: seq,
                start_offset: 0,
                end_offset: 6,
                overlap_start: 0,
                overlap_end: 6,
            };
            store
                .insert_chunk(id, "doc1", "sec1", SectionCategory::Otros, &chunk)
                .await
                .unwrap();
        }
        (dir, pool)
    }

    #[tokio::test]
    async fn vector_ids_are_monotonic_and_stamped_on_chunks() {
        let (_dir, pool) = seeded_pool(&["c0", "c1"]).await;
        let index = FlatIndex::new(pool.clone(), 2);

        let id0 = index.add("c0", &[1.0, 0.0]).await.unwrap();
        let id1 = index.add("c1", &[0.0, 1.0]).await.unwrap();
        assert!(id1 > id0);

        let row = sqlx::query("SELECT vector_id FROM chunks WHERE id = 'c1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let stamped: Option<i64> = row.get("vector_id");
        assert_eq!(stamped, Some(id1));
        assert_eq!(index.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn add_rejects_wrong_dimension() {
        let (_dir, pool) = seeded_pool(&["c0"]).await;
        let index = FlatIndex::new(pool, 4);
        let err = index.add("c0", &[1.0, 2.0]).await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn add_fails_for_missing_chunk_and_leaves_no_vector() {
        let (_dir, pool) = seeded_pool(&["c0"]).await;
        let index = FlatIndex::new(pool.clone(), 2);
        assert!(index.add("ghost", &[1.0, 0.0]).await.is_err());
        // The transaction rolled back; nothing was stored.
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_orders_by_ascending_distance() {
        let (_dir, pool) = seeded_pool(&["c0", "c1", "c2"]).await;
        let index = FlatIndex::new(pool, 2);

        let far = index.add("c0", &[10.0, 10.0]).await.unwrap();
        let near = index.add("c1", &[1.0, 1.0]).await.unwrap();
        let exact = index.add("c2", &[0.0, 0.0]).await.unwrap();

        let hits = index.search(&[0.0, 0.0], 10).await.unwrap();
        assert_eq!(
            hits.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![exact, near, far]
        );
        assert_eq!(hits[0].1, 0.0);

        let top2 = index.search(&[0.0, 0.0], 2).await.unwrap();
        assert_eq!(top2.len(), 2);
    }

    #[tokio::test]
    async fn search_rejects_wrong_query_dimension() {
        let (_dir, pool) = seeded_pool(&[]).await;
        let index = FlatIndex::new(pool, 3);
        assert!(index.search(&[1.0], 5).await.is_err());
    }

    #[tokio::test]
    async fn empty_index_returns_no_hits() {
        let (_dir, pool) = seeded_pool(&[]).await;
        let index = FlatIndex::new(pool, 2);
        assert!(index.search(&[0.0, 0.0], 5).await.unwrap().is_empty());
    }
}
