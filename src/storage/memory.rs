use super::{join_path, ObjectUpload, ObjectUploadRequest, ObjectUploader, StorageBackend};
use crate::error::{UploadError, UploadResult};
use crate::events::{progress_figures, NoopProgressSink, ProgressSink, UploadPhase, UploadProgressEvent};
use crate::file::{Disk, Visibility};
use crate::hash::{HashAlgorithm, HashInfo};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// An object held by an in-memory backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub contents: Vec<u8>,
    pub visibility: Visibility,
}

/// In-process storage backend for development and tests
///
/// Can be switched to refuse writes (`write` returns `Ok(None)`) or to fail
/// them with an error, mirroring the two failure shapes real drivers have.
pub struct MemoryStorage {
    base_url: String,
    objects: Mutex<HashMap<(Disk, String), StoredObject>>,
    refuse_writes: AtomicBool,
    write_error: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_base_url("https://files.test")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
            refuse_writes: AtomicBool::new(false),
            write_error: Mutex::new(None),
        }
    }

    /// Make every subsequent write return `Ok(None)`
    pub fn set_refuse_writes(&self, refuse: bool) {
        self.refuse_writes.store(refuse, Ordering::Relaxed);
    }

    /// Make every subsequent write fail with `message`
    pub fn set_write_error(&self, message: Option<&str>) {
        if let Ok(mut error) = self.write_error.lock() {
            *error = message.map(str::to_string);
        }
    }

    pub fn get(&self, disk: Disk, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(&(disk, path.to_string())).cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn write(
        &self,
        disk: Disk,
        directory: &str,
        filename: &str,
        contents: &[u8],
        visibility: Visibility,
    ) -> UploadResult<Option<String>> {
        if let Some(message) = self.write_error.lock()?.clone() {
            return Err(UploadError::Storage(message));
        }
        if self.refuse_writes.load(Ordering::Relaxed) {
            return Ok(None);
        }

        let path = join_path(directory, filename);
        self.objects.lock()?.insert(
            (disk, path.clone()),
            StoredObject {
                contents: contents.to_vec(),
                visibility,
            },
        );
        Ok(Some(path))
    }

    fn exists(&self, disk: Disk, path: &str) -> UploadResult<bool> {
        Ok(self.objects.lock()?.contains_key(&(disk, path.to_string())))
    }

    fn delete(&self, disk: Disk, path: &str) -> UploadResult<bool> {
        Ok(self.objects.lock()?.remove(&(disk, path.to_string())).is_some())
    }

    fn url(&self, disk: Disk, path: &str) -> UploadResult<String> {
        Ok(format!("{}/{}/{}", self.base_url, disk, path))
    }

    fn signed_url(&self, disk: Disk, path: &str, expires_in: Duration) -> UploadResult<String> {
        let expires = (Utc::now() + expires_in).timestamp();
        Ok(format!("{}?expires={}", self.url(disk, path)?, expires))
    }
}

/// In-process object-storage uploader
///
/// Streams the file in `chunk_size` pieces, publishing a progress event per
/// chunk plus preparing/finalizing/completed events, and returns an ETag
/// derived from the content.
pub struct MemoryObjectUploader {
    base_url: String,
    chunk_size: usize,
    sink: Arc<dyn ProgressSink>,
    objects: Mutex<HashMap<(Disk, String), StoredObject>>,
    upload_error: Mutex<Option<String>>,
}

impl MemoryObjectUploader {
    pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            base_url: "https://objects.test".to_string(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            sink,
            objects: Mutex::new(HashMap::new()),
            upload_error: Mutex::new(None),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Make every subsequent upload fail with `message` (e.g. a timeout)
    pub fn set_upload_error(&self, message: Option<&str>) {
        if let Ok(mut error) = self.upload_error.lock() {
            *error = message.map(str::to_string);
        }
    }

    pub fn get(&self, disk: Disk, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(&(disk, path.to_string())).cloned())
    }

    fn publish(
        &self,
        request: &ObjectUploadRequest<'_>,
        started: Instant,
        bytes_uploaded: u64,
        total_bytes: u64,
        phase: UploadPhase,
    ) {
        let (percentage, speed_bps, eta_seconds) =
            progress_figures(bytes_uploaded, total_bytes, started.elapsed().as_secs_f64());
        self.sink.publish(UploadProgressEvent {
            owner_id: request.owner_id.clone(),
            session_id: request.session_id.map(str::to_string),
            disk: request.disk,
            filename: request.filename.to_string(),
            bytes_uploaded,
            total_bytes,
            percentage,
            speed_bps,
            eta_seconds,
            phase,
            timestamp: Utc::now().to_rfc3339(),
        });
    }
}

impl Default for MemoryObjectUploader {
    fn default() -> Self {
        Self::new(Arc::new(NoopProgressSink))
    }
}

impl ObjectUploader for MemoryObjectUploader {
    fn upload_with_progress(&self, request: ObjectUploadRequest<'_>) -> UploadResult<ObjectUpload> {
        let started = Instant::now();
        let total = request.file.size();
        self.publish(&request, started, 0, total, UploadPhase::Preparing);

        if let Some(message) = self.upload_error.lock()?.clone() {
            self.publish(&request, started, 0, total, UploadPhase::Failed);
            return Err(UploadError::Storage(message));
        }

        let contents = match request.file.read_bytes() {
            Ok(contents) => contents,
            Err(e) => {
                self.publish(&request, started, 0, total, UploadPhase::Failed);
                return Err(e.into());
            }
        };
        let mut uploaded = 0u64;
        for chunk in contents.chunks(self.chunk_size) {
            uploaded += chunk.len() as u64;
            self.publish(&request, started, uploaded, total, UploadPhase::Uploading);
        }
        self.publish(&request, started, uploaded, total, UploadPhase::Finalizing);

        // S3-style ETags are quoted 32-char hex digests
        let digest = HashInfo::from_bytes(HashAlgorithm::Sha256, &contents).value;
        let etag = format!("\"{}\"", &digest[..32]);

        let path = join_path(request.directory, request.filename);
        self.objects.lock()?.insert(
            (request.disk, path.clone()),
            StoredObject {
                contents,
                visibility: request.visibility,
            },
        );
        self.publish(&request, started, uploaded, total, UploadPhase::Completed);

        Ok(ObjectUpload {
            url: format!("{}/{}/{}", self.base_url, request.disk, path),
            path,
            etag: Some(etag),
        })
    }
}
