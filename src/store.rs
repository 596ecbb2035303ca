//! Artifact store gateway and semantic index.
//!
//! Maps a collection identifier (derived from a content fingerprint) to a
//! persisted, queryable set of embedded chunks in SQLite. The gateway
//! creates-on-miss and loads-on-hit; collections survive process restarts
//! and are never deleted by this core.
//!
//! "Store unreachable" and "collection not found" are distinct conditions:
//! [`StoreError::Unavailable`] is fatal, [`StoreError::NotFound`] is an
//! ordinary cache miss.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;

use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, Embedder};
use crate::migrate;
use crate::models::Chunk;

/// Store-layer error taxonomy.
#[derive(Debug)]
pub enum StoreError {
    /// The persisted backing store itself is unreachable or broken.
    Unavailable(String),
    /// The requested collection does not exist (an ordinary miss).
    NotFound(String),
    /// Embedding the chunks for a new collection failed.
    Embedding(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "artifact store unavailable: {}", e),
            StoreError::NotFound(id) => write!(f, "collection not found: {}", id),
            StoreError::Embedding(e) => write!(f, "embedding failed during population: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Gateway to the persisted artifact store.
///
/// Constructed once at process start with its embedding provider injected;
/// shared by reference across pipeline stages.
#[derive(Clone)]
pub struct StoreGateway {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl StoreGateway {
    /// Open (and migrate) the backing store. Fails with
    /// [`StoreError::Unavailable`] when the store cannot be opened.
    pub async fn connect(
        db_path: &Path,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        let pool = crate::db::connect(db_path)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        migrate::run_migrations(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool, embedder })
    }

    /// Probe for a persisted collection. Reports `false` for a missing
    /// collection; only a broken store is an error.
    pub async fn exists(&self, collection_id: &str) -> Result<bool, StoreError> {
        let found: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE id = ?")
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(found)
    }

    /// Attach to an existing persisted collection.
    pub async fn load(&self, collection_id: &str) -> Result<SemanticIndex, StoreError> {
        if !self.exists(collection_id).await? {
            return Err(StoreError::NotFound(collection_id.to_string()));
        }
        Ok(SemanticIndex {
            pool: self.pool.clone(),
            collection_id: collection_id.to_string(),
            embedder: Arc::clone(&self.embedder),
        })
    }

    /// Create a new persisted collection and embed + store all chunks.
    ///
    /// Idempotent for the same collection id: the id is derived from the
    /// content fingerprint, so a concurrent or repeated create finds the
    /// collection row already present and returns the existing collection's
    /// handle without touching its chunks (first writer wins).
    pub async fn create_and_populate(
        &self,
        collection_id: &str,
        fingerprint: &str,
        chunks: &[Chunk],
    ) -> Result<SemanticIndex, StoreError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| StoreError::Embedding(e.to_string()))?;
        if vectors.len() != chunks.len() {
            return Err(StoreError::Embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO collections (id, fingerprint, embedding_model, dims, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection_id)
        .bind(fingerprint)
        .bind(self.embedder.model_name())
        .bind(self.embedder.dims() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if inserted.rows_affected() == 0 {
            // Another writer created this collection first; same content,
            // same chunks, so the existing rows stand.
            tx.rollback()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            tracing::info!(collection_id, "collection already present, create is a no-op");
        } else {
            for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO chunks (id, collection_id, chunk_index, text, hash, embedding)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&chunk.id)
                .bind(collection_id)
                .bind(chunk.chunk_index)
                .bind(&chunk.text)
                .bind(&chunk.hash)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
            tx.commit()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            tracing::info!(
                collection_id,
                chunks = chunks.len(),
                "created and populated collection"
            );
        }

        Ok(SemanticIndex {
            pool: self.pool.clone(),
            collection_id: collection_id.to_string(),
            embedder: Arc::clone(&self.embedder),
        })
    }

    /// Inventory of persisted collections (id, chunk count, created_at).
    /// This core never deletes collections; storage lifecycle belongs to
    /// the operator.
    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.created_at, COUNT(k.id) AS chunk_count
            FROM collections c
            LEFT JOIN chunks k ON k.collection_id = c.id
            GROUP BY c.id
            ORDER BY c.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| CollectionInfo {
                id: row.get("id"),
                created_at: row.get("created_at"),
                chunk_count: row.get("chunk_count"),
            })
            .collect())
    }
}

/// Summary row returned by [`StoreGateway::list_collections`].
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub id: String,
    pub created_at: i64,
    pub chunk_count: i64,
}

/// Handle over one persisted collection, cheap to clone and share across
/// pipeline stages within a session.
#[derive(Clone)]
pub struct SemanticIndex {
    pool: SqlitePool,
    collection_id: String,
    embedder: Arc<dyn Embedder>,
}

impl SemanticIndex {
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Retrieve the top-k most relevant chunks for a query by cosine
    /// similarity over the stored embeddings, in rank order.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, collection_id, chunk_index, text, hash, embedding
            FROM chunks
            WHERE collection_id = ?
            "#,
        )
        .bind(&self.collection_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, Chunk)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(&query_vec, &blob_to_vec(&blob));
                let chunk = Chunk {
                    id: row.get("id"),
                    document_id: row.get("collection_id"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    hash: row.get("hash"),
                };
                (similarity, chunk)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }
}
