//! Ingestion pipeline orchestration.
//!
//! Coordinates the full processing flow for one document: blob → extraction
//! → chunking → best-effort embedding → transactional chunk storage →
//! processed flag. Extraction and embedding failures degrade; ingestion
//! always reaches the processed state once chunks are written.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::extract;
use crate::models::{Category, Chunk, Document};
use crate::storage::BlobStore;

/// Run the pipeline for a stored document. Chunk embedding is attempted one
/// chunk at a time; chunks are persisted in a single transaction in strictly
/// increasing index order regardless. Returns the chunk count.
pub async fn process_document(
    config: &Config,
    pool: &SqlitePool,
    store: &BlobStore,
    embedder: Option<&dyn Embedder>,
    document_id: &str,
    file_path: &str,
    mime_type: &str,
) -> Result<usize> {
    let bytes = store
        .get(file_path)
        .with_context(|| format!("document blob missing: {}", file_path))?;

    let text = extract::extract_text(&bytes, mime_type);
    let windows = chunk_text(&text, config.chunking.chunk_size, config.chunking.overlap);

    let mut chunks = Vec::with_capacity(windows.len());
    for (index, content) in windows.into_iter().enumerate() {
        let embedding = match embedder {
            Some(embedder) => embedder.embed(&content).await,
            None => None,
        };
        chunks.push(Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: index as i64,
            content,
            embedding,
        });
    }

    let count = chunks.len();
    replace_chunks(pool, document_id, &chunks).await?;

    sqlx::query("UPDATE documents SET processed = 1 WHERE id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;

    Ok(count)
}

/// Replace a document's chunks and FTS entries in one transaction, inserting
/// in chunk_index order. Re-running ingestion for a document is safe.
async fn replace_chunks(pool: &SqlitePool, document_id: &str, chunks: &[Chunk]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        let blob = chunk.embedding.as_deref().map(embedding::vec_to_blob);
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, content, embedding) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(blob)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO chunks_fts (chunk_id, document_id, content) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Delete a document as one logical unit: blob, then chunks (and FTS rows),
/// then the record. The sequence is not atomic across the blob boundary —
/// a crash mid-sequence can orphan a blob or chunks.
pub async fn delete_document(pool: &SqlitePool, store: &BlobStore, doc: &Document) -> Result<()> {
    store.delete(&doc.file_path)?;

    sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
        .bind(&doc.id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(&doc.id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(&doc.id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn insert_document(pool: &SqlitePool, doc: &Document) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents
            (id, title, file_name, file_path, mime_type, size_bytes, category,
             content_hash, processed, uploaded_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.title)
    .bind(&doc.file_name)
    .bind(&doc.file_path)
    .bind(&doc.mime_type)
    .bind(doc.size_bytes)
    .bind(doc.category.as_str())
    .bind(&doc.content_hash)
    .bind(doc.processed as i64)
    .bind(&doc.uploaded_by)
    .bind(doc.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_document(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, file_name, file_path, mime_type, size_bytes, category,
               content_hash, processed, uploaded_by, created_at
        FROM documents
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| row_to_document(&row)).transpose()
}

pub async fn list_documents(pool: &SqlitePool, categories: &[Category]) -> Result<Vec<Document>> {
    let placeholders = vec!["?"; categories.len()].join(", ");
    let sql = format!(
        r#"
        SELECT id, title, file_name, file_path, mime_type, size_bytes, category,
               content_hash, processed, uploaded_by, created_at
        FROM documents
        WHERE category IN ({})
        ORDER BY created_at DESC, id ASC
        "#,
        placeholders
    );

    let mut q = sqlx::query(&sql);
    for category in categories {
        q = q.bind(category.as_str());
    }
    let rows = q.fetch_all(pool).await?;

    rows.iter().map(row_to_document).collect()
}

pub async fn chunk_count(pool: &SqlitePool, document_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let category: String = row.get("category");
    let processed: i64 = row.get("processed");
    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        file_name: row.get("file_name"),
        file_path: row.get("file_path"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        category: Category::parse(&category)?,
        content_hash: row.get("content_hash"),
        processed: processed != 0,
        uploaded_by: row.get("uploaded_by"),
        created_at: row.get("created_at"),
    })
}
