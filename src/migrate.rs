use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Documents: one row per ingested thesis/paper. `fingerprint` is the
    // content hash used to short-circuit duplicate ingestion.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            fingerprint TEXT NOT NULL UNIQUE,
            title TEXT,
            authors TEXT,
            date_published TEXT,
            abstract TEXT,
            keywords TEXT,
            affiliations TEXT,
            journal TEXT,
            editorial TEXT,
            doi TEXT,
            conference TEXT,
            isbn TEXT,
            language TEXT NOT NULL DEFAULT 'unknown',
            total_sections INTEGER NOT NULL DEFAULT 0,
            total_references INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Sections: the classified units between document and chunk.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            title TEXT,
            category TEXT NOT NULL,
            content_length INTEGER NOT NULL,
            token_estimate INTEGER NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunks: the atomic retrieval units. `vector_id` is the append-only
    // back-reference into the vectors table; NULL until the chunk has been
    // embedded and added to the index.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            section_id TEXT NOT NULL,
            sequence_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            size_chars INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            overlap_start INTEGER NOT NULL,
            overlap_end INTEGER NOT NULL,
            category TEXT NOT NULL,
            vector_id INTEGER UNIQUE,
            FOREIGN KEY (document_id) REFERENCES documents(id),
            FOREIGN KEY (section_id) REFERENCES sections(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vectors: embedding blobs keyed by monotonic rowid. Rows are never
    // updated or deleted; the index has no delete primitive in this design.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            vector_id INTEGER PRIMARY KEY AUTOINCREMENT,
            chunk_id TEXT NOT NULL UNIQUE,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Bibliographic references extracted from the TEI back matter.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bib_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id TEXT NOT NULL,
            ref_index INTEGER NOT NULL,
            title TEXT,
            authors TEXT,
            date TEXT,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sections_document ON sections(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sections_category ON sections(category)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_vector ON chunks(vector_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_refs_document ON bib_references(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}
