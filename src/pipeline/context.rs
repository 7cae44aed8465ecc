use crate::config::PipelineConfiguration;
use crate::file::{Disk, OwnerId, UploadedFile};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Key/value map accumulated across steps
pub type Metadata = BTreeMap<String, Value>;

pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_DIRECTORY: &str = "uploads";

/// Immutable snapshot of one upload's inputs and accumulated state
///
/// Every `with_*` method returns a new context and leaves `self` untouched.
/// Maps sit behind `Arc`, so contexts derived from one another share every
/// map they did not change.
///
/// # Example
/// ```
/// use upload_pipeline::file::{Disk, OwnerId, UploadedFile};
/// use upload_pipeline::pipeline::UploadContext;
///
/// let file = UploadedFile::from_bytes("cat.png", "image/png", vec![0u8; 128]);
/// let context = UploadContext::builder(file, OwnerId::new("user-1"))
///     .disk(Disk::Public)
///     .max_size_bytes(1024)
///     .build();
///
/// let next = context.with_metadata("file_hash", "abc".into());
/// assert!(context.get_metadata("file_hash").is_none());
/// assert_eq!(next.get_metadata("file_hash").unwrap(), "abc");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UploadContext {
    file: Arc<UploadedFile>,
    owner: OwnerId,
    disk: Disk,
    directory: String,
    is_public: bool,
    randomize_filename: bool,
    extract_metadata: bool,
    check_duplicates: bool,
    max_size_bytes: u64,
    allowed_mime_types: Arc<BTreeSet<String>>,
    metadata: Arc<Metadata>,
    configuration: Arc<PipelineConfiguration>,
    session_id: Option<String>,
    processing_state: Arc<Metadata>,
}

impl UploadContext {
    pub fn builder(file: UploadedFile, owner: OwnerId) -> UploadContextBuilder {
        UploadContextBuilder::new(file, owner)
    }

    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn disk(&self) -> Disk {
        self.disk
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn randomize_filename(&self) -> bool {
        self.randomize_filename
    }

    pub fn extract_metadata(&self) -> bool {
        self.extract_metadata
    }

    pub fn check_duplicates(&self) -> bool {
        self.check_duplicates
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Empty means unrestricted
    pub fn allowed_mime_types(&self) -> &BTreeSet<String> {
        &self.allowed_mime_types
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// String metadata value, `None` when absent or not a string
    pub fn get_metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn configuration(&self) -> &PipelineConfiguration {
        &self.configuration
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Session id for log lines
    pub fn session_label(&self) -> &str {
        self.session_id.as_deref().unwrap_or("-")
    }

    pub fn processing_state(&self) -> &Metadata {
        &self.processing_state
    }

    pub fn get_processing_state(&self, key: &str) -> Option<&Value> {
        self.processing_state.get(key)
    }

    pub fn with_metadata(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.metadata).insert(key.into(), value);
        next
    }

    /// Fold a metadata delta in; later keys overwrite earlier ones
    pub fn with_metadata_map(&self, delta: &Metadata) -> Self {
        if delta.is_empty() {
            return self.clone();
        }
        let mut next = self.clone();
        let metadata = Arc::make_mut(&mut next.metadata);
        for (key, value) in delta {
            metadata.insert(key.clone(), value.clone());
        }
        next
    }

    pub fn with_configuration(&self, configuration: PipelineConfiguration) -> Self {
        let mut next = self.clone();
        next.configuration = Arc::new(configuration);
        next
    }

    pub fn with_processing_state(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.processing_state).insert(key.into(), value);
        next
    }

    #[cfg(test)]
    pub(crate) fn shares_metadata_with(&self, other: &UploadContext) -> bool {
        Arc::ptr_eq(&self.metadata, &other.metadata)
    }
}

/// Builder for [`UploadContext`]
#[derive(Debug)]
pub struct UploadContextBuilder {
    file: UploadedFile,
    owner: OwnerId,
    disk: Disk,
    directory: String,
    is_public: bool,
    randomize_filename: bool,
    extract_metadata: bool,
    check_duplicates: bool,
    max_size_bytes: u64,
    allowed_mime_types: BTreeSet<String>,
    metadata: Metadata,
    configuration: PipelineConfiguration,
    session_id: Option<String>,
}

impl UploadContextBuilder {
    pub fn new(file: UploadedFile, owner: OwnerId) -> Self {
        Self {
            file,
            owner,
            disk: Disk::Local,
            directory: DEFAULT_DIRECTORY.to_string(),
            is_public: false,
            randomize_filename: true,
            extract_metadata: true,
            check_duplicates: true,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            allowed_mime_types: BTreeSet::new(),
            metadata: Metadata::new(),
            configuration: PipelineConfiguration::default(),
            session_id: None,
        }
    }

    pub fn disk(mut self, disk: Disk) -> Self {
        self.disk = disk;
        self
    }

    pub fn directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn randomize_filename(mut self, randomize: bool) -> Self {
        self.randomize_filename = randomize;
        self
    }

    pub fn extract_metadata(mut self, extract: bool) -> Self {
        self.extract_metadata = extract;
        self
    }

    pub fn check_duplicates(mut self, check: bool) -> Self {
        self.check_duplicates = check;
        self
    }

    pub fn max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    pub fn allowed_mime_types<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_mime_types = mime_types.into_iter().map(Into::into).collect();
        self
    }

    /// Seed metadata, e.g. dimensions extracted before the upload
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn configuration(mut self, configuration: PipelineConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn build(self) -> UploadContext {
        UploadContext {
            file: Arc::new(self.file),
            owner: self.owner,
            disk: self.disk,
            directory: self.directory,
            is_public: self.is_public,
            randomize_filename: self.randomize_filename,
            extract_metadata: self.extract_metadata,
            check_duplicates: self.check_duplicates,
            max_size_bytes: self.max_size_bytes,
            allowed_mime_types: Arc::new(self.allowed_mime_types),
            metadata: Arc::new(self.metadata),
            configuration: Arc::new(self.configuration),
            session_id: self.session_id,
            processing_state: Arc::new(Metadata::new()),
        }
    }
}
