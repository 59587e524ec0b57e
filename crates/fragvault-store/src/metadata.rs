//! File descriptor persistence.
//!
//! The capability is one table wide: insert a descriptor keyed by its
//! file id, load one back, enumerate all. The fragment list is stored as
//! a JSON column so the ordered structure survives without a join table.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

use fragvault_core::types::FileDescriptor;
use fragvault_core::{VaultError, VaultResult};

/// Abstract relational persistence the catalog consumes.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist a descriptor; fails with `MetadataConflict` when the
    /// file id is already present.
    async fn insert(&self, descriptor: &FileDescriptor) -> VaultResult<()>;

    /// Load a descriptor by file id.
    async fn get(&self, file_id: &str) -> VaultResult<FileDescriptor>;

    /// All descriptors, oldest insertion first.
    async fn list(&self) -> VaultResult<Vec<FileDescriptor>>;
}

/// SQLite implementation. rusqlite is synchronous; the connection is
/// shared behind a mutex and statements are short.
pub struct SqliteMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: impl AsRef<std::path::Path>) -> VaultResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| VaultError::Internal(anyhow::anyhow!("opening {}: {e}", path.display())))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(internal)?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "metadata store opened");
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> VaultResult<Self> {
        let conn = Connection::open_in_memory().map_err(internal)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> VaultResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                file_id     TEXT PRIMARY KEY NOT NULL,
                file_name   TEXT NOT NULL,
                file_size   INTEGER NOT NULL,
                note        TEXT,
                fingerprint TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                fragments   TEXT NOT NULL
            )",
            [],
        )
        .map_err(internal)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VaultError::Internal(anyhow::anyhow!("metadata lock poisoned")))
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert(&self, descriptor: &FileDescriptor) -> VaultResult<()> {
        let fragments = serde_json::to_string(&descriptor.fragments)
            .map_err(|e| VaultError::Internal(anyhow::anyhow!("fragment serialization: {e}")))?;

        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO files (file_id, file_name, file_size, note, fingerprint, created_at, fragments)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                descriptor.file_id,
                descriptor.file_name,
                descriptor.file_size as i64,
                descriptor.note,
                descriptor.fingerprint,
                descriptor.created_at.to_rfc3339(),
                fragments,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(VaultError::MetadataConflict {
                    file_id: descriptor.file_id.clone(),
                })
            }
            Err(e) => Err(internal(e)),
        }
    }

    async fn get(&self, file_id: &str) -> VaultResult<FileDescriptor> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT file_id, file_name, file_size, note, fingerprint, created_at, fragments
             FROM files WHERE file_id = ?1",
            rusqlite::params![file_id],
            row_to_descriptor,
        );

        match result {
            Ok(desc) => Ok(desc),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(VaultError::MetadataNotFound {
                file_id: file_id.to_string(),
            }),
            Err(e) => Err(internal(e)),
        }
    }

    async fn list(&self) -> VaultResult<Vec<FileDescriptor>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT file_id, file_name, file_size, note, fingerprint, created_at, fragments
                 FROM files ORDER BY created_at, file_id",
            )
            .map_err(internal)?;

        let rows = stmt
            .query_map([], row_to_descriptor)
            .map_err(internal)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(internal)?;
        Ok(rows)
    }
}

fn row_to_descriptor(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileDescriptor> {
    let created_at: String = row.get(5)?;
    let fragments: String = row.get(6)?;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let fragments = serde_json::from_str(&fragments).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(FileDescriptor {
        file_id: row.get(0)?,
        file_name: row.get(1)?,
        file_size: row.get::<_, i64>(2)? as u64,
        note: row.get(3)?,
        fingerprint: row.get(4)?,
        created_at,
        fragments,
    })
}

fn internal(e: impl std::error::Error + Send + Sync + 'static) -> VaultError {
    VaultError::Internal(anyhow::anyhow!(e))
}
