//! Document registry using SQLite
//!
//! Tracks every PDF handed to `pagetree index`: where the file lives, its
//! content hash, and where its tree index was written once ready.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle of a registered document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploading,
    Indexing,
    Ready,
    Error,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStatus::Uploading => write!(f, "uploading"),
            DocumentStatus::Indexing => write!(f, "indexing"),
            DocumentStatus::Ready => write!(f, "ready"),
            DocumentStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "uploading" => Ok(DocumentStatus::Uploading),
            "indexing" => Ok(DocumentStatus::Indexing),
            "ready" => Ok(DocumentStatus::Ready),
            "error" => Ok(DocumentStatus::Error),
            _ => Err(Error::Config(format!("Invalid document status: {}", s))),
        }
    }
}

/// A registered document record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_path: String,
    pub content_hash: String,
    pub status: String,
    pub index_path: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    pub fn new(filename: String, file_path: String, content_hash: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            filename,
            file_path,
            content_hash,
            status: DocumentStatus::Uploading.to_string(),
            index_path: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Parsed status; unknown values read as `Error`
    pub fn status(&self) -> DocumentStatus {
        self.status.parse().unwrap_or(DocumentStatus::Error)
    }
}

/// Hex blake3 hash of a file's bytes
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Document counts by status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub ready: usize,
    pub indexing: usize,
    pub failed: usize,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the registry configured in `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Open (and create if needed) the database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }
        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='documents'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, file_path, content_hash, status, index_path,
                                   error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.file_path)
        .bind(&doc.content_hash)
        .bind(&doc.status)
        .bind(&doc.index_path)
        .bind(&doc.error_message)
        .bind(&doc.created_at)
        .bind(&doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get document by ID
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// Most recent document with the given content hash
    pub async fn find_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE content_hash = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// List all documents, newest first
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let docs =
            sqlx::query_as::<_, Document>("SELECT * FROM documents ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(docs)
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        index_path: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET status = ?, index_path = ?, error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(index_path)
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Mark a document as being indexed, clearing any earlier outcome
    pub async fn set_indexing(&self, id: &str) -> Result<()> {
        self.update_status(id, DocumentStatus::Indexing, None, None)
            .await
    }

    /// Mark a document as searchable through the index at `index_path`
    pub async fn mark_ready(&self, id: &str, index_path: &Path) -> Result<()> {
        let path = index_path.to_string_lossy();
        self.update_status(id, DocumentStatus::Ready, Some(&path), None)
            .await
    }

    /// Record a failed indexing run
    pub async fn mark_error(&self, id: &str, message: &str) -> Result<()> {
        self.update_status(id, DocumentStatus::Error, None, Some(message))
            .await
    }

    /// Delete a document record. Returns whether a row was removed.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Index path of a document that is ready for search
    pub async fn ready_index_path(&self, id: &str) -> Result<PathBuf> {
        let doc = self
            .get_document(id)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

        match (doc.status(), doc.index_path) {
            (DocumentStatus::Ready, Some(path)) => Ok(PathBuf::from(path)),
            _ => Err(Error::IndexNotReady(id.to_string())),
        }
    }

    /// Document counts by status
    pub async fn stats(&self) -> Result<RegistryStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM documents GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = RegistryStats::default();
        for (status, count) in rows {
            let count = count as usize;
            stats.total += count;
            match status.parse::<DocumentStatus>() {
                Ok(DocumentStatus::Ready) => stats.ready += count,
                Ok(DocumentStatus::Indexing) | Ok(DocumentStatus::Uploading) => {
                    stats.indexing += count
                }
                _ => stats.failed += count,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        (db, tmp)
    }

    fn doc(name: &str, hash: &str) -> Document {
        Document::new(
            name.to_string(),
            format!("/uploads/{}", name),
            hash.to_string(),
        )
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let (db, _tmp) = setup_test_db().await;

        let doc = doc("report.pdf", "hash1");
        db.insert_document(&doc).await.unwrap();
        assert_eq!(
            db.get_document(&doc.id).await.unwrap().unwrap().status(),
            DocumentStatus::Uploading
        );

        db.set_indexing(&doc.id).await.unwrap();
        assert!(matches!(
            db.ready_index_path(&doc.id).await,
            Err(Error::IndexNotReady(_))
        ));

        db.mark_ready(&doc.id, Path::new("/idx/report_structure.json"))
            .await
            .unwrap();
        assert_eq!(
            db.ready_index_path(&doc.id).await.unwrap(),
            PathBuf::from("/idx/report_structure.json")
        );
    }

    #[tokio::test]
    async fn test_error_is_recorded_and_cleared() {
        let (db, _tmp) = setup_test_db().await;
        let doc = doc("broken.pdf", "hash2");
        db.insert_document(&doc).await.unwrap();

        db.mark_error(&doc.id, "extraction failed").await.unwrap();
        let loaded = db.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.status(), DocumentStatus::Error);
        assert_eq!(loaded.error_message.as_deref(), Some("extraction failed"));

        db.set_indexing(&doc.id).await.unwrap();
        let loaded = db.get_document(&doc.id).await.unwrap().unwrap();
        assert!(loaded.error_message.is_none());
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let (db, _tmp) = setup_test_db().await;
        assert!(matches!(
            db.ready_index_path("missing").await,
            Err(Error::DocumentNotFound(_))
        ));
        assert!(matches!(
            db.mark_error("missing", "x").await,
            Err(Error::DocumentNotFound(_))
        ));
        assert!(!db.delete_document("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_hash_and_stats() {
        let (db, _tmp) = setup_test_db().await;
        let a = doc("a.pdf", "same");
        let b = doc("b.pdf", "other");
        db.insert_document(&a).await.unwrap();
        db.insert_document(&b).await.unwrap();
        db.mark_ready(&a.id, Path::new("/idx/a.json")).await.unwrap();
        db.mark_error(&b.id, "boom").await.unwrap();

        assert_eq!(db.find_by_hash("same").await.unwrap().unwrap().id, a.id);
        assert!(db.find_by_hash("none").await.unwrap().is_none());

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.failed, 1);

        assert!(db.delete_document(&b.id).await.unwrap());
        assert_eq!(db.list_documents().await.unwrap().len(), 1);
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!("READY".parse::<DocumentStatus>().unwrap(), DocumentStatus::Ready);
        assert!("bogus".parse::<DocumentStatus>().is_err());
        assert_eq!(DocumentStatus::Indexing.to_string(), "indexing");
    }

    #[test]
    fn test_hash_file_is_stable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x.pdf");
        std::fs::write(&path, b"%PDF-1.5").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_file(&path).unwrap());
        assert_eq!(hash_file(&path).unwrap().len(), 64);
    }
}
