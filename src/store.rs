//! SQLite metadata store.
//!
//! All durable state except the embedding blobs themselves lives here:
//! documents, classified sections, chunks, and bibliographic references.
//! The store also resolves vector ids back to chunk rows for the searcher,
//! via the [`HitResolver`] trait.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::{ChunkRecord, DocumentMeta, SectionCategory};
use crate::tei::BibReference;

/// Allocates chunk keys within one document: `{doc_id}_chunk_0000`,
/// `{doc_id}_chunk_0001`, ... The counter is explicit and scoped to the
/// allocator, so concurrent ingestion of different documents can never
/// interleave key sequences.
pub struct ChunkKeyAllocator {
    document_id: String,
    next: usize,
}

impl ChunkKeyAllocator {
    pub fn new(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            next: 0,
        }
    }

    pub fn next_key(&mut self) -> String {
        let key = format!("{}_chunk_{:04}", self.document_id, self.next);
        self.next += 1;
        key
    }

    pub fn allocated(&self) -> usize {
        self.next
    }
}

/// Aggregate counts for the `stats` command.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub documents: i64,
    pub sections: i64,
    pub chunks: i64,
    pub vectors: i64,
    pub pending_chunks: i64,
    pub chunk_size_avg: f64,
    pub chunk_size_min: i64,
    pub chunk_size_max: i64,
}

/// Resolves a vector id to the chunk it was computed from.
///
/// Separated from [`MetadataStore`] so the searcher can be tested against an
/// in-memory fake without a database.
#[async_trait]
pub trait HitResolver: Send + Sync {
    async fn resolve(&self, vector_id: i64) -> Result<Option<ChunkRecord>>;
}

pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the existing document id for a fingerprint, if any. Ingestion
    /// uses this to short-circuit duplicates before talking to GROBID's
    /// downstream stages.
    pub async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT id FROM documents WHERE fingerprint = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Insert a document, or return the already-stored id for the same
    /// fingerprint. The conflict target makes this race-free: when two
    /// ingestions of the same content run concurrently, the loser gets the
    /// winner's id back instead of a constraint error.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_document_if_absent(
        &self,
        id: &str,
        filename: &str,
        fingerprint: &str,
        meta: &DocumentMeta,
        total_sections: usize,
        total_references: usize,
    ) -> Result<(String, bool)> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (
                id, filename, fingerprint, title, authors, date_published,
                abstract, keywords, affiliations, journal, editorial, doi,
                conference, isbn, language, total_sections, total_references,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(filename)
        .bind(fingerprint)
        .bind(&meta.title)
        .bind(&meta.authors)
        .bind(&meta.date)
        .bind(&meta.abstract_text)
        .bind(&meta.keywords)
        .bind(&meta.affiliations)
        .bind(&meta.journal)
        .bind(&meta.editorial)
        .bind(&meta.doi)
        .bind(&meta.conference)
        .bind(&meta.isbn)
        .bind(&meta.language)
        .bind(total_sections as i64)
        .bind(total_references as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok((id.to_string(), false));
        }
        let row = sqlx::query("SELECT id FROM documents WHERE fingerprint = ?")
            .bind(fingerprint)
            .fetch_one(&self.pool)
            .await?;
        Ok((row.get("id"), true))
    }

    pub async fn insert_section(
        &self,
        id: &str,
        document_id: &str,
        title: Option<&str>,
        category: SectionCategory,
        content_length: usize,
        token_estimate: usize,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sections (id, document_id, title, category, content_length, token_estimate)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(document_id)
        .bind(title)
        .bind(category.as_str())
        .bind(content_length as i64)
        .bind(token_estimate as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_chunk(
        &self,
        id: &str,
        document_id: &str,
        section_id: &str,
        category: SectionCategory,
        chunk: &crate::models::Chunk,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunks (
                id, document_id, section_id, sequence_index, text, size_chars,
                start_offset, end_offset, overlap_start, overlap_end, category
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(document_id)
        .bind(section_id)
        .bind(chunk.sequence_index as i64)
        .bind(&chunk.text)
        .bind(chunk.size_chars as i64)
        .bind(chunk.start_offset as i64)
        .bind(chunk.end_offset as i64)
        .bind(chunk.overlap_start as i64)
        .bind(chunk.overlap_end as i64)
        .bind(category.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_reference(
        &self,
        document_id: &str,
        ref_index: usize,
        reference: &BibReference,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bib_references (document_id, ref_index, title, authors, date)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(document_id)
        .bind(ref_index as i64)
        .bind(&reference.title)
        .bind(&reference.authors)
        .bind(&reference.date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Chunks not yet embedded: `(chunk_id, text)` ordered by chunk id so
    /// repeated runs walk the backlog in a stable order.
    pub async fn pending_chunks(&self, limit: Option<usize>) -> Result<Vec<(String, String)>> {
        let sql = match limit {
            Some(_) => {
                "SELECT id, text FROM chunks WHERE vector_id IS NULL ORDER BY id LIMIT ?"
            }
            None => "SELECT id, text FROM chunks WHERE vector_id IS NULL ORDER BY id",
        };
        let mut query = sqlx::query(sql);
        if let Some(n) = limit {
            query = query.bind(n as i64);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("id"), r.get("text")))
            .collect())
    }

    pub async fn count_pending(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks WHERE vector_id IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM documents")
            .fetch_one(&self.pool)
            .await?;
        stats.documents = row.get("n");

        let row = sqlx::query("SELECT COUNT(*) AS n FROM sections")
            .fetch_one(&self.pool)
            .await?;
        stats.sections = row.get("n");

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n,
                   COALESCE(AVG(size_chars), 0.0) AS avg_size,
                   COALESCE(MIN(size_chars), 0) AS min_size,
                   COALESCE(MAX(size_chars), 0) AS max_size
            FROM chunks
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        stats.chunks = row.get("n");
        stats.chunk_size_avg = row.get("avg_size");
        stats.chunk_size_min = row.get("min_size");
        stats.chunk_size_max = row.get("max_size");

        let row = sqlx::query("SELECT COUNT(*) AS n FROM vectors")
            .fetch_one(&self.pool)
            .await?;
        stats.vectors = row.get("n");

        stats.pending_chunks = self.count_pending().await?;
        Ok(stats)
    }
}

#[async_trait]
impl HitResolver for MetadataStore {
    async fn resolve(&self, vector_id: i64) -> Result<Option<ChunkRecord>> {
        let row = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.document_id, c.category, c.text,
                   s.title AS section_title,
                   d.filename, d.title, d.authors, d.date_published,
                   d.abstract AS abstract_text, d.keywords, d.affiliations,
                   d.journal, d.editorial, d.doi, d.conference, d.isbn,
                   d.language
            FROM chunks c
            JOIN sections s ON s.id = c.section_id
            JOIN documents d ON d.id = c.document_id
            WHERE c.vector_id = ?
            "#,
        )
        .bind(vector_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let category: String = r.get("category");
            ChunkRecord {
                chunk_id: r.get("chunk_id"),
                document_id: r.get("document_id"),
                category: SectionCategory::parse(&category).unwrap_or(SectionCategory::Otros),
                section_title: r.get("section_title"),
                text: r.get("text"),
                meta: DocumentMeta {
                    title: r.get("title"),
                    authors: r.get("authors"),
                    date: r.get("date_published"),
                    abstract_text: r.get("abstract_text"),
                    keywords: r.get("keywords"),
                    affiliations: r.get("affiliations"),
                    journal: r.get("journal"),
                    editorial: r.get("editorial"),
                    doi: r.get("doi"),
                    conference: r.get("conference"),
                    isbn: r.get("isbn"),
                    language: r.get("language"),
                },
                filename: r.get("filename"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::models::Chunk;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn test_store() -> (tempfile::TempDir, MetadataStore) {
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
        (dir, MetadataStore::new(pool))
    }

    fn sample_meta() -> DocumentMeta {
        DocumentMeta {
            title: Some("Sample Thesis".to_string()),
            authors: Some("Ana García; John Smith".to_string()),
            language: "spanish".to_string(),
            ..Default::default()
        }
    }

    fn sample_chunk(seq: usize) -> Chunk {
        Chunk {
            text: format!("chunk body {}", seq),
            size_chars: 13,
            sequence_index: seq,
            start_offset: seq * 10,
            end_offset: seq * 10 + 13,
            overlap_start: seq * 10,
            overlap_end: seq * 10 + 13,
        }
    }

    #[test]
    fn chunk_keys_are_zero_padded_and_sequential() {
        let mut alloc = ChunkKeyAllocator::new("doc1");
        assert_eq!(alloc.next_key(), "doc1_chunk_0000");
        assert_eq!(alloc.next_key(), "doc1_chunk_0001");
        assert_eq!(alloc.allocated(), 2);
    }

    #[test]
    fn allocators_for_different_documents_are_independent() {
        let mut a = ChunkKeyAllocator::new("doc-a");
        let mut b = ChunkKeyAllocator::new("doc-b");
        a.next_key();
        assert_eq!(b.next_key(), "doc-b_chunk_0000");
        assert_eq!(a.next_key(), "doc-a_chunk_0001");
    }

    #[tokio::test]
    async fn fingerprint_lookup_finds_inserted_document() {
        let (_dir, store) = test_store().await;
        store
            .insert_document_if_absent("doc1", "a.pdf", "fp-123", &sample_meta(), 2, 0)
            .await
            .unwrap();
        assert_eq!(
            store.find_by_fingerprint("fp-123").await.unwrap(),
            Some("doc1".to_string())
        );
        assert_eq!(store.find_by_fingerprint("fp-999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_fingerprint_returns_existing_id() {
        let (_dir, store) = test_store().await;
        let (id, existed) = store
            .insert_document_if_absent("doc1", "a.pdf", "fp-123", &sample_meta(), 0, 0)
            .await
            .unwrap();
        assert_eq!(id, "doc1");
        assert!(!existed);

        // Same fingerprint under a new id: not an error, the stored id wins.
        let (id, existed) = store
            .insert_document_if_absent("doc2", "b.pdf", "fp-123", &sample_meta(), 0, 0)
            .await
            .unwrap();
        assert_eq!(id, "doc1");
        assert!(existed);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
    }

    #[tokio::test]
    async fn pending_chunks_are_ordered_and_limited() {
        let (_dir, store) = test_store().await;
        store
            .insert_document_if_absent("doc1", "a.pdf", "fp-1", &sample_meta(), 1, 0)
            .await
            .unwrap();
        store
            .insert_section("sec1", "doc1", Some("Intro"), SectionCategory::Introduccion, 30, 7)
            .await
            .unwrap();

        let mut alloc = ChunkKeyAllocator::new("doc1");
        for seq in 0..3 {
            let key = alloc.next_key();
            store
                .insert_chunk(&key, "doc1", "sec1", SectionCategory::Introduccion, &sample_chunk(seq))
                .await
                .unwrap();
        }

        let all = store.pending_chunks(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].0, "doc1_chunk_0000");
        assert_eq!(all[2].0, "doc1_chunk_0002");

        let limited = store.pending_chunks(Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(store.count_pending().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn resolve_returns_none_for_unknown_vector_id() {
        let (_dir, store) = test_store().await;
        assert!(store.resolve(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_reflect_inserted_rows() {
        let (_dir, store) = test_store().await;
        store
            .insert_document_if_absent("doc1", "a.pdf", "fp-1", &sample_meta(), 1, 1)
            .await
            .unwrap();
        store
            .insert_section("sec1", "doc1", None, SectionCategory::Otros, 13, 3)
            .await
            .unwrap();
        store
            .insert_chunk("doc1_chunk_0000", "doc1", "sec1", SectionCategory::Otros, &sample_chunk(0))
            .await
            .unwrap();
        store
            .insert_reference("doc1", 0, &BibReference::default())
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.sections, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.vectors, 0);
        assert_eq!(stats.pending_chunks, 1);
        assert_eq!(stats.chunk_size_min, 13);
        assert_eq!(stats.chunk_size_max, 13);
    }
}
