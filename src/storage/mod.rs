//! Storage abstraction the pipeline writes through
//!
//! Disks are addressed by [`Disk`]. Local-driver disks are written directly
//! with [`StorageBackend::write`]; object-storage disks go through an
//! [`ObjectUploader`], which owns progress reporting.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │       StoreFileStep          │
//! └──────┬───────────────┬───────┘
//!        │ local driver  │ object storage
//! ┌──────▼──────┐  ┌─────▼──────────┐
//! │StorageBackend│  │ObjectUploader  │──► ProgressSink
//! └─────────────┘  └────────────────┘
//! ```

pub mod local;
pub mod memory;

pub use local::LocalStorage;
pub use memory::{MemoryObjectUploader, MemoryStorage};

use crate::error::UploadResult;
use crate::file::{Disk, OwnerId, UploadedFile, Visibility};
use chrono::Duration;

/// Join a directory prefix and a filename into a storage path
pub fn join_path(directory: &str, filename: &str) -> String {
    let directory = directory.trim_matches('/');
    if directory.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", directory, filename)
    }
}

/// Storage reachable by disk identifier
pub trait StorageBackend: Send + Sync {
    /// Write `contents` to `directory/filename` on `disk`
    ///
    /// Returns the stored path, or `None` when the driver refused the write.
    fn write(
        &self,
        disk: Disk,
        directory: &str,
        filename: &str,
        contents: &[u8],
        visibility: Visibility,
    ) -> UploadResult<Option<String>>;

    fn exists(&self, disk: Disk, path: &str) -> UploadResult<bool>;

    /// Delete an object, returning whether anything was removed
    fn delete(&self, disk: Disk, path: &str) -> UploadResult<bool>;

    /// Public URL of an object
    fn url(&self, disk: Disk, path: &str) -> UploadResult<String>;

    /// Time-limited URL of a private object
    fn signed_url(&self, disk: Disk, path: &str, expires_in: Duration) -> UploadResult<String>;
}

/// Arguments for a progress-tracked object-storage upload
#[derive(Debug, Clone, Copy)]
pub struct ObjectUploadRequest<'a> {
    pub file: &'a UploadedFile,
    pub disk: Disk,
    pub directory: &'a str,
    pub filename: &'a str,
    pub owner_id: &'a OwnerId,
    pub session_id: Option<&'a str>,
    pub visibility: Visibility,
}

/// Outcome of an object-storage upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUpload {
    pub path: String,
    pub url: String,
    pub etag: Option<String>,
}

/// Uploads to object-storage disks while reporting progress to subscribers
///
/// Blocks until the upload finishes. An interrupted or timed-out transfer
/// must surface as `Err`.
pub trait ObjectUploader: Send + Sync {
    fn upload_with_progress(&self, request: ObjectUploadRequest<'_>) -> UploadResult<ObjectUpload>;
}
