//! SQLite document store backend.
//!
//! Provides [`SqliteDocumentStore`] which implements [`DocumentStore`] using
//! [sqlx](https://docs.rs/sqlx). Embeddings are stored as JSON arrays; all
//! similarity scoring happens in process, so no vector extension is needed.
//!
//! This module is only available when the `sqlite` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::sqlite::SqliteDocumentStore;
//!
//! let store = SqliteDocumentStore::new("sqlite://docqa.db").await?;
//! let document = store.save_document("handbook.txt", text).await?;
//! store.save_chunks(&document.id, chunks).await?;
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::document::{Chunk, Document, DocumentSummary};
use crate::error::{RagError, Result};
use crate::store::DocumentStore;

const BACKEND: &str = "sqlite";

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS documents (\
        id TEXT PRIMARY KEY, \
        name TEXT NOT NULL, \
        text TEXT NOT NULL, \
        created_at TEXT NOT NULL, \
        chunk_count INTEGER NOT NULL DEFAULT 0\
    )",
    "CREATE TABLE IF NOT EXISTS chunks (\
        id TEXT PRIMARY KEY, \
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE, \
        document_name TEXT NOT NULL, \
        chunk_index INTEGER NOT NULL, \
        text TEXT NOT NULL, \
        embedding TEXT NOT NULL\
    )",
    "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks (document_id)",
];

/// A [`DocumentStore`] backed by a SQLite database.
///
/// Chunk sets are written and deleted inside transactions, so readers never
/// observe a partial chunk set.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open (creating if missing) the database at `database_url` and ensure the schema.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(map_err)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(map_err)?;
        Self::from_pool(pool).await
    }

    /// Open a private in-memory database, mainly for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(map_err)?
            .foreign_keys(true);
        // Every connection to `:memory:` is a separate database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(map_err)?;
        Self::from_pool(pool).await
    }

    /// Create a store from an existing connection pool and ensure the schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.map_err(map_err)?;
        }
        debug!("sqlite schema ready");
        Ok(Self { pool })
    }

    /// Cheap connectivity probe.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(map_err)?;
        Ok(())
    }
}

fn map_err(e: sqlx::Error) -> RagError {
    RagError::storage(BACKEND, e.to_string())
}

fn count_from(value: i64) -> usize {
    usize::try_from(value).unwrap_or_default()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RagError::storage(BACKEND, format!("invalid timestamp '{value}': {e}")))
}

fn summary_from_row(row: &SqliteRow) -> Result<DocumentSummary> {
    let created_at: String = row.try_get("created_at").map_err(map_err)?;
    Ok(DocumentSummary {
        id: row.try_get("id").map_err(map_err)?,
        name: row.try_get("name").map_err(map_err)?,
        created_at: parse_timestamp(&created_at)?,
        chunk_count: count_from(row.try_get("chunk_count").map_err(map_err)?),
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
    let embedding: String = row.try_get("embedding").map_err(map_err)?;
    let embedding: Vec<f32> = serde_json::from_str(&embedding)
        .map_err(|e| RagError::storage(BACKEND, format!("invalid stored embedding: {e}")))?;
    Ok(Chunk {
        id: row.try_get("id").map_err(map_err)?,
        document_id: row.try_get("document_id").map_err(map_err)?,
        document_name: row.try_get("document_name").map_err(map_err)?,
        index: count_from(row.try_get("chunk_index").map_err(map_err)?),
        text: row.try_get("text").map_err(map_err)?,
        embedding,
    })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn save_document(&self, name: &str, text: &str) -> Result<Document> {
        let document = Document::new(name, text);
        sqlx::query(
            "INSERT INTO documents (id, name, text, created_at, chunk_count) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(&document.id)
        .bind(&document.name)
        .bind(&document.text)
        .bind(document.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        debug!(document.id = %document.id, "stored document row");
        Ok(document)
    }

    async fn save_chunks(&self, document_id: &str, chunks: Vec<Chunk>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let updated = sqlx::query("UPDATE documents SET chunk_count = ? WHERE id = ?")
            .bind(chunks.len() as i64)
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?
            .rows_affected();
        if updated == 0 {
            return Err(RagError::storage(
                BACKEND,
                format!("document '{document_id}' does not exist"),
            ));
        }

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        for chunk in &chunks {
            let embedding = serde_json::to_string(&chunk.embedding).map_err(|e| {
                RagError::storage(BACKEND, format!("failed to encode embedding: {e}"))
            })?;
            sqlx::query(
                "INSERT INTO chunks (id, document_id, document_name, chunk_index, text, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.document_name)
            .bind(chunk.index as i64)
            .bind(&chunk.text)
            .bind(embedding)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        }

        tx.commit().await.map_err(map_err)?;
        debug!(document_id, count = chunks.len(), "stored chunk rows");
        Ok(())
    }

    async fn list_chunks_with_vectors(&self) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, document_name, chunk_index, text, embedding \
             FROM chunks ORDER BY document_id, chunk_index",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let deleted_chunks = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?
            .rows_affected();
        let deleted_documents = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?
            .rows_affected();
        if deleted_documents == 0 {
            return Err(RagError::DocumentNotFound(document_id.to_string()));
        }

        tx.commit().await.map_err(map_err)?;
        debug!(document_id, deleted_chunks, "deleted document rows");
        Ok(deleted_chunks as usize)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            "SELECT id, name, created_at, chunk_count FROM documents ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, name, text, created_at, chunk_count FROM documents WHERE id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let summary = summary_from_row(&row)?;
        Ok(Some(Document {
            id: summary.id,
            name: summary.name,
            text: row.try_get("text").map_err(map_err)?,
            created_at: summary.created_at,
            chunk_count: summary.chunk_count,
        }))
    }

    async fn document_count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(count_from(row.try_get("count").map_err(map_err)?))
    }

    async fn chunk_count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(count_from(row.try_get("count").map_err(map_err)?))
    }
}
