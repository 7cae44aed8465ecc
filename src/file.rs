use crate::error::{UploadError, UploadResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Opaque identity of the uploader
///
/// Used for record ownership, duplicate scoping and storage-path scoping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Named storage target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disk {
    Local,
    Public,
    Spaces,
    S3,
    R2,
}

/// Underlying driver a disk is backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskDriver {
    Local,
    ObjectStorage,
}

impl Disk {
    pub const ALL: [Disk; 5] = [Disk::Local, Disk::Public, Disk::Spaces, Disk::S3, Disk::R2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Disk::Local => "local",
            Disk::Public => "public",
            Disk::Spaces => "spaces",
            Disk::S3 => "s3",
            Disk::R2 => "r2",
        }
    }

    pub fn driver(&self) -> DiskDriver {
        match self {
            Disk::Local | Disk::Public => DiskDriver::Local,
            Disk::Spaces | Disk::S3 | Disk::R2 => DiskDriver::ObjectStorage,
        }
    }

    pub fn is_object_storage(&self) -> bool {
        self.driver() == DiskDriver::ObjectStorage
    }
}

impl fmt::Display for Disk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disk {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Disk::ALL
            .into_iter()
            .find(|disk| disk.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UploadError::UnknownDisk(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn from_public_flag(is_public: bool) -> Self {
        if is_public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(UploadError::ConfigError(format!(
                "Unknown visibility: {}",
                other
            ))),
        }
    }
}

/// Where the uploaded bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Memory(Arc<[u8]>),
    Path(PathBuf),
}

/// Handle to an uploaded binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    original_name: String,
    size: u64,
    mime_type: String,
    extension: Option<String>,
    source: FileSource,
}

impl UploadedFile {
    /// Create a file handle over in-memory contents
    pub fn from_bytes(
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        let original_name = original_name.into();
        let contents: Vec<u8> = contents.into();
        Self {
            extension: extension_of(&original_name),
            size: contents.len() as u64,
            mime_type: mime_type.into(),
            source: FileSource::Memory(Arc::from(contents)),
            original_name,
        }
    }

    /// Create a file handle over a file on disk (e.g. a spooled temp upload)
    ///
    /// The original name defaults to the path's file name.
    pub fn from_path(path: impl AsRef<Path>, mime_type: impl Into<String>) -> UploadResult<Self> {
        let path = path.as_ref();
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| UploadError::InvalidPath(path.display().to_string()))?;
        let size = std::fs::metadata(path)?.len();

        Ok(Self {
            extension: extension_of(&original_name),
            size,
            mime_type: mime_type.into(),
            source: FileSource::Path(path.to_path_buf()),
            original_name,
        })
    }

    /// Override the client-supplied original name
    pub fn with_original_name(mut self, original_name: impl Into<String>) -> Self {
        self.original_name = original_name.into();
        self.extension = extension_of(&self.original_name);
        self
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Original name without its extension
    pub fn stem(&self) -> &str {
        match self.original_name.rfind('.') {
            Some(idx) if idx > 0 => &self.original_name[..idx],
            _ => &self.original_name,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Declared MIME type, as sent by the client
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Lowercase extension without the dot
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Open a streaming reader over the contents
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            FileSource::Path(path) => Ok(Box::new(File::open(path)?)),
        }
    }

    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
            FileSource::Path(path) => std::fs::read(path),
        }
    }
}

fn extension_of(name: &str) -> Option<String> {
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(name[idx + 1..].to_ascii_lowercase())
}
