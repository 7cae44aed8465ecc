use super::{Catalog, FileRecord, NewFileRecord};
use crate::error::{UploadError, UploadResult};
use crate::file::{Disk, OwnerId, Visibility};
use crate::logger::{LogLevel, LOGGER};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS file_records (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    id            TEXT NOT NULL UNIQUE,
    owner_id      TEXT NOT NULL,
    name          TEXT NOT NULL,
    original_name TEXT NOT NULL,
    path          TEXT NOT NULL,
    directory     TEXT NOT NULL,
    disk          TEXT NOT NULL,
    size          INTEGER NOT NULL,
    mime_type     TEXT NOT NULL,
    visibility    TEXT NOT NULL,
    metadata      TEXT,
    width         INTEGER,
    height        INTEGER,
    content_hash  TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_records_hash ON file_records (content_hash, owner_id);
";

const COLUMNS: &str = "id, owner_id, name, original_name, path, directory, disk, size, mime_type, \
                       visibility, metadata, width, height, content_hash, created_at, updated_at";

/// SQLite-backed catalog
///
/// Content hashes are indexed but not unique: concurrent uploads of the same
/// bytes may both persist.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    pub fn open(path: impl AsRef<Path>) -> UploadResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> UploadResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> UploadResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let id: String = row.get(0)?;
    let disk: String = row.get(6)?;
    let size: i64 = row.get(7)?;
    let visibility: String = row.get(9)?;
    let metadata: Option<String> = row.get(10)?;

    Ok(FileRecord {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e.to_string()))?,
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        original_name: row.get(3)?,
        path: row.get(4)?,
        directory: row.get(5)?,
        disk: disk
            .parse::<Disk>()
            .map_err(|e| conversion_error(6, e.to_string()))?,
        size: u64::try_from(size).map_err(|e| conversion_error(7, e.to_string()))?,
        mime_type: row.get(8)?,
        visibility: visibility
            .parse::<Visibility>()
            .map_err(|e| conversion_error(9, e.to_string()))?,
        metadata: metadata
            .map(|m| serde_json::from_str(&m))
            .transpose()
            .map_err(|e| conversion_error(10, e.to_string()))?,
        width: row.get(11)?,
        height: row.get(12)?,
        content_hash: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl Catalog for SqliteCatalog {
    fn create(&self, record: NewFileRecord) -> UploadResult<FileRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let metadata = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let size = i64::try_from(record.size)
            .map_err(|e| UploadError::Catalog(format!("File too large: {}", e)))?;

        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO file_records ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                COLUMNS
            ),
            params![
                id.to_string(),
                record.owner_id.as_str(),
                record.name,
                record.original_name,
                record.path,
                record.directory,
                record.disk.as_str(),
                size,
                record.mime_type,
                record.visibility.as_str(),
                metadata,
                record.width,
                record.height,
                record.content_hash,
                now,
                now,
            ],
        )?;
        let stored = tx.query_row(
            &format!("SELECT {} FROM file_records WHERE id = ?1", COLUMNS),
            params![id.to_string()],
            row_to_record,
        )?;
        tx.commit()?;

        LOGGER.log(
            LogLevel::Debug,
            &format!("Inserted catalog record {} ({})", stored.id, stored.path),
            "catalog::sqlite",
        );
        Ok(stored)
    }

    fn find(&self, id: Uuid) -> UploadResult<Option<FileRecord>> {
        let conn = self.conn.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM file_records WHERE id = ?1", COLUMNS),
                params![id.to_string()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn find_by_hash(
        &self,
        content_hash: &str,
        owner: Option<&OwnerId>,
    ) -> UploadResult<Option<FileRecord>> {
        let conn = self.conn.lock()?;
        let record = match owner {
            Some(owner) => conn
                .query_row(
                    &format!(
                        "SELECT {} FROM file_records WHERE content_hash = ?1 AND owner_id = ?2 \
                         ORDER BY seq LIMIT 1",
                        COLUMNS
                    ),
                    params![content_hash, owner.as_str()],
                    row_to_record,
                )
                .optional()?,
            None => conn
                .query_row(
                    &format!(
                        "SELECT {} FROM file_records WHERE content_hash = ?1 ORDER BY seq LIMIT 1",
                        COLUMNS
                    ),
                    params![content_hash],
                    row_to_record,
                )
                .optional()?,
        };
        Ok(record)
    }

    fn count(&self) -> UploadResult<usize> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM file_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
