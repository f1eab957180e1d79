//! Face record persistence on SQLite.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use facesearch_core::{Embedding, FaceRecord};
use rusqlite::params;
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS faces (
    id            TEXT PRIMARY KEY,
    directory     TEXT NOT NULL,
    filename      TEXT NOT NULL,
    source        TEXT NOT NULL,
    embedding     BLOB NOT NULL,
    model_version TEXT,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS faces_directory ON faces(directory);
";

const SELECT_COLUMNS: &str =
    "SELECT id, directory, filename, source, embedding, model_version, created_at FROM faces";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Keyed persistence of face records.
#[async_trait]
pub trait FaceStore: Send + Sync {
    /// Insert a record, replacing any existing record with the same id.
    async fn insert(&self, record: &FaceRecord) -> Result<(), StoreError>;

    async fn list_all(&self) -> Result<Vec<FaceRecord>, StoreError>;

    /// Records of one directory, oldest first.
    async fn list_directory(&self, directory: &str) -> Result<Vec<FaceRecord>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Remove every record of `directory`, returning the removed ids.
    async fn delete_directory(&self, directory: &str) -> Result<Vec<String>, StoreError>;

    /// Search candidates: the whole store, or one directory when given.
    async fn candidates(&self, directory: Option<&str>) -> Result<Vec<FaceRecord>, StoreError> {
        match directory.map(str::trim).filter(|d| !d.is_empty()) {
            Some(dir) => self.list_directory(dir).await,
            None => self.list_all().await,
        }
    }
}

/// Row as stored, before the embedding blob and timestamp are decoded.
struct RawRecord {
    id: String,
    directory: String,
    filename: String,
    source: String,
    embedding: Vec<u8>,
    model_version: Option<String>,
    created_at: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            directory: row.get(1)?,
            filename: row.get(2)?,
            source: row.get(3)?,
            embedding: row.get(4)?,
            model_version: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<FaceRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };
        let values = decode_embedding(&self.embedding).ok_or_else(|| {
            corrupt(format!("embedding blob of {} bytes", self.embedding.len()))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt(format!("created_at {:?}: {e}", self.created_at)))?
            .with_timezone(&Utc);

        Ok(FaceRecord {
            id: self.id,
            directory: self.directory,
            filename: self.filename,
            source: self.source,
            embedding: Embedding {
                values,
                model_version: self.model_version,
            },
            created_at,
        })
    }
}

/// Little-endian `f32` bytes.
pub fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`encode_embedding`]; `None` if the length is not a multiple of 4.
pub fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

fn decode_all(rows: Vec<RawRecord>) -> Result<Vec<FaceRecord>, StoreError> {
    rows.into_iter().map(RawRecord::decode).collect()
}

/// [`FaceStore`] backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteFaceStore {
    conn: Connection,
}

impl SqliteFaceStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "could not create database directory");
            }
        }
        let conn = Connection::open(path).await?;
        tracing::info!(path = %path.display(), "opened face database");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(journal_mode = %mode, "sqlite journal mode");
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl FaceStore for SqliteFaceStore {
    async fn insert(&self, record: &FaceRecord) -> Result<(), StoreError> {
        let id = record.id.clone();
        let record = record.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO faces (id, directory, filename, source, embedding, model_version, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                        directory = excluded.directory,
                        filename = excluded.filename,
                        source = excluded.source,
                        embedding = excluded.embedding,
                        model_version = excluded.model_version,
                        created_at = excluded.created_at",
                    params![
                        record.id,
                        record.directory,
                        record.filename,
                        record.source,
                        encode_embedding(&record.embedding.values),
                        record.embedding.model_version,
                        record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                    ],
                )?;
                Ok(())
            })
            .await?;
        tracing::debug!(%id, "stored face record");
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<FaceRecord>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at, id"))?;
                let rows = stmt
                    .query_map([], RawRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        decode_all(rows)
    }

    async fn list_directory(&self, directory: &str) -> Result<Vec<FaceRecord>, StoreError> {
        let directory = directory.trim_matches('/').to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE directory = ?1 ORDER BY created_at, id"
                ))?;
                let rows = stmt
                    .query_map(params![directory], RawRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        decode_all(rows)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let n = self
            .conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))?;
                Ok(n)
            })
            .await?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    async fn delete_directory(&self, directory: &str) -> Result<Vec<String>, StoreError> {
        let directory = directory.trim_matches('/').to_string();
        let ids = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let ids = tx
                    .prepare("SELECT id FROM faces WHERE directory = ?1 ORDER BY id")?
                    .query_map(params![directory], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                tx.execute("DELETE FROM faces WHERE directory = ?1", params![directory])?;
                tx.commit()?;
                Ok(ids)
            })
            .await?;
        tracing::info!(removed = ids.len(), "deleted directory records");
        Ok(ids)
    }
}
