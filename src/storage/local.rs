use super::{join_path, StorageBackend};
use crate::error::{UploadError, UploadResult};
use crate::file::{Disk, Visibility};
use crate::logger::{LogLevel, LOGGER};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Component, Path, PathBuf};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Filesystem-backed storage, one subdirectory per disk
///
/// Public URLs are `<base_url>/<disk>/<path>`. Signed URLs append an
/// `expires` unix timestamp and an HMAC-SHA256 `signature` over
/// `disk:path:expires`, checked by [`LocalStorage::verify_signature`].
pub struct LocalStorage {
    root: PathBuf,
    base_url: Url,
    signing_key: Vec<u8>,
}

impl LocalStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        base_url: &str,
        signing_key: impl Into<Vec<u8>>,
    ) -> UploadResult<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| UploadError::ConfigError(format!("Invalid base URL '{}': {}", base_url, e)))?;

        Ok(Self {
            root: root.into(),
            base_url,
            signing_key: signing_key.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute filesystem location of `path` on `disk`
    pub fn full_path(&self, disk: Disk, path: &str) -> UploadResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(UploadError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(disk.as_str()).join(relative))
    }

    fn signature(&self, disk: Disk, path: &str, expires: i64) -> UploadResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| UploadError::Internal(format!("Invalid signing key: {}", e)))?;
        mac.update(format!("{}:{}:{}", disk, path, expires).as_bytes());
        Ok(mac)
    }

    /// Check a signed URL's `expires` and `signature` parameters
    pub fn verify_signature(&self, disk: Disk, path: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        match self.signature(disk, path, expires) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

impl StorageBackend for LocalStorage {
    fn write(
        &self,
        disk: Disk,
        directory: &str,
        filename: &str,
        contents: &[u8],
        visibility: Visibility,
    ) -> UploadResult<Option<String>> {
        let path = join_path(directory, filename);
        let full_path = self.full_path(disk, &path)?;

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, contents)?;

        LOGGER.log(
            LogLevel::Debug,
            &format!(
                "Wrote {} bytes to {} ({} on disk '{}')",
                contents.len(),
                full_path.display(),
                visibility,
                disk
            ),
            "storage::local",
        );

        Ok(Some(path))
    }

    fn exists(&self, disk: Disk, path: &str) -> UploadResult<bool> {
        Ok(self.full_path(disk, path)?.is_file())
    }

    fn delete(&self, disk: Disk, path: &str) -> UploadResult<bool> {
        let full_path = self.full_path(disk, path)?;
        if !full_path.is_file() {
            return Ok(false);
        }
        std::fs::remove_file(full_path)?;
        Ok(true)
    }

    fn url(&self, disk: Disk, path: &str) -> UploadResult<String> {
        self.full_path(disk, path)?;
        let url = self
            .base_url
            .join(&format!("{}/{}", disk, path))
            .map_err(|e| UploadError::InvalidPath(format!("{}: {}", path, e)))?;
        Ok(url.to_string())
    }

    fn signed_url(&self, disk: Disk, path: &str, expires_in: Duration) -> UploadResult<String> {
        let mut url = Url::parse(&self.url(disk, path)?)
            .map_err(|e| UploadError::Internal(e.to_string()))?;
        let expires = (Utc::now() + expires_in).timestamp();
        let signature = hex::encode(self.signature(disk, path, expires)?.finalize().into_bytes());

        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.to_string())
    }
}
