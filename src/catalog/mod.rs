//! Catalog of stored files
//!
//! The pipeline reads the catalog for duplicate detection and writes one
//! record per successful upload. Implementations must make
//! [`Catalog::create`] atomic: either the full record is visible afterwards
//! or nothing is.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

use crate::error::UploadResult;
use crate::file::{Disk, OwnerId, Visibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields of a record about to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFileRecord {
    pub owner_id: OwnerId,
    /// Stored filename
    pub name: String,
    pub original_name: String,
    pub path: String,
    pub directory: String,
    pub disk: Disk,
    pub size: u64,
    pub mime_type: String,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// A persisted catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub name: String,
    pub original_name: String,
    pub path: String,
    pub directory: String,
    pub disk: Disk,
    pub size: u64,
    pub mime_type: String,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Assign identity and timestamps to a new record
    pub fn from_new(record: NewFileRecord, id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: record.owner_id,
            name: record.name,
            original_name: record.original_name,
            path: record.path,
            directory: record.directory,
            disk: record.disk,
            size: record.size,
            mime_type: record.mime_type,
            visibility: record.visibility,
            metadata: record.metadata,
            width: record.width,
            height: record.height,
            content_hash: record.content_hash,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Repository for catalog records
pub trait Catalog: Send + Sync {
    /// Persist a record in a single atomic transaction
    fn create(&self, record: NewFileRecord) -> UploadResult<FileRecord>;

    fn find(&self, id: Uuid) -> UploadResult<Option<FileRecord>>;

    /// Oldest record with `content_hash`, restricted to `owner` when given
    fn find_by_hash(&self, content_hash: &str, owner: Option<&OwnerId>)
        -> UploadResult<Option<FileRecord>>;

    fn count(&self) -> UploadResult<usize>;
}

#[cfg(test)]
pub(crate) fn sample_record(owner: &str, name: &str, hash: Option<&str>) -> NewFileRecord {
    NewFileRecord {
        owner_id: OwnerId::new(owner),
        name: name.to_string(),
        original_name: "original.jpg".to_string(),
        path: format!("uploads/{}", name),
        directory: "uploads".to_string(),
        disk: Disk::Local,
        size: 2048,
        mime_type: "image/jpeg".to_string(),
        visibility: Visibility::Private,
        metadata: Some(serde_json::json!({ "formatted_size": "2 KB" })),
        width: Some(640),
        height: Some(480),
        content_hash: hash.map(str::to_string),
    }
}

/// Catalog whose every call fails, as a dropped database connection would
#[cfg(test)]
pub(crate) struct UnavailableCatalog;

#[cfg(test)]
impl Catalog for UnavailableCatalog {
    fn create(&self, _record: NewFileRecord) -> UploadResult<FileRecord> {
        Err(crate::error::UploadError::Catalog("connection refused".to_string()))
    }

    fn find(&self, _id: Uuid) -> UploadResult<Option<FileRecord>> {
        Err(crate::error::UploadError::Catalog("connection refused".to_string()))
    }

    fn find_by_hash(
        &self,
        _content_hash: &str,
        _owner: Option<&OwnerId>,
    ) -> UploadResult<Option<FileRecord>> {
        Err(crate::error::UploadError::Catalog("connection refused".to_string()))
    }

    fn count(&self) -> UploadResult<usize> {
        Err(crate::error::UploadError::Catalog("connection refused".to_string()))
    }
}
