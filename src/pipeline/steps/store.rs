use crate::config::ConfigOption;
use crate::error::{StepError, UploadResult};
use crate::file::{Disk, Visibility};
use crate::logger::{LogLevel, LOGGER};
use crate::pipeline::base;
use crate::pipeline::{Metadata, StepResult, UploadContext, UploadStep};
use crate::storage::{ObjectUploadRequest, ObjectUploader, StorageBackend};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Replace anything outside `[A-Za-z0-9._-]` with `_`
///
/// Runs of `_` collapse to one and leading/trailing `_` are dropped. An
/// empty result becomes `file`.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Where and how a file ended up
struct StoredFile {
    path: String,
    url: String,
    etag: Option<String>,
}

/// Step that writes the upload to its disk
///
/// Local-driver disks are written directly; object-storage disks go through
/// the progress-reporting uploader.
///
/// # Context Outputs
/// - `stored_path`, `filename`, `url` - required by the persist step
/// - `disk`, `visibility`, `processed_at`
/// - `etag` - object storage only
pub struct StoreFileStep {
    storage: Arc<dyn StorageBackend>,
    uploader: Arc<dyn ObjectUploader>,
}

impl StoreFileStep {
    pub const NAME: &'static str = "process_file";

    pub fn new(storage: Arc<dyn StorageBackend>, uploader: Arc<dyn ObjectUploader>) -> Self {
        Self { storage, uploader }
    }

    /// Filename the upload is stored under
    pub fn target_filename(&self, context: &UploadContext) -> String {
        let config = &context.configuration().store;
        if let Some(forced) = &config.force_filename {
            return forced.clone();
        }

        let file = context.file();
        let extension = file.extension().filter(|_| config.preserve_extension);
        let stem = if config
            .randomize_filename
            .unwrap_or(context.randomize_filename())
        {
            Uuid::new_v4().simple().to_string()
        } else if config.sanitize_filename {
            sanitize_filename(file.stem())
        } else {
            file.stem().to_string()
        };

        match extension {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem,
        }
    }

    /// A forced filename must be one plain path segment
    fn check_forced_filename(context: &UploadContext) -> Result<(), StepError> {
        match &context.configuration().store.force_filename {
            Some(name) if name.trim().is_empty() || name.contains(['/', '\\']) || name == ".." => {
                Err(StepError::configuration(format!(
                    "force_filename '{}' is not a plain filename",
                    name
                )))
            }
            _ => Ok(()),
        }
    }

    fn url_for(&self, disk: Disk, path: &str, visibility: Visibility) -> UploadResult<String> {
        match visibility {
            Visibility::Public => self.storage.url(disk, path),
            Visibility::Private => self.storage.signed_url(disk, path, Duration::hours(1)),
        }
    }

    fn store(
        &self,
        context: &UploadContext,
        filename: &str,
        visibility: Visibility,
    ) -> UploadResult<Option<StoredFile>> {
        let disk = context.disk();

        if disk.is_object_storage() {
            let upload = self.uploader.upload_with_progress(ObjectUploadRequest {
                file: context.file(),
                disk,
                directory: context.directory(),
                filename,
                owner_id: context.owner(),
                session_id: context.session_id(),
                visibility,
            })?;
            if upload.path.is_empty() {
                return Ok(None);
            }
            let url = match visibility {
                Visibility::Public => upload.url,
                Visibility::Private => self.url_for(disk, &upload.path, visibility)?,
            };
            return Ok(Some(StoredFile {
                path: upload.path,
                url,
                etag: upload.etag,
            }));
        }

        let contents = context.file().read_bytes()?;
        let path = self
            .storage
            .write(disk, context.directory(), filename, &contents, visibility)?;
        match path {
            Some(path) if !path.is_empty() => {
                let url = self.url_for(disk, &path, visibility)?;
                Ok(Some(StoredFile {
                    path,
                    url,
                    etag: None,
                }))
            }
            _ => Ok(None),
        }
    }
}

impl UploadStep for StoreFileStep {
    fn execute(&self, context: &UploadContext) -> StepResult {
        let disk = context.disk();
        let visibility = Visibility::from_public_flag(context.is_public());
        if let Err(e) = Self::check_forced_filename(context) {
            return base::failure(Self::NAME, context, "Invalid store configuration", vec![e]);
        }
        let filename = self.target_filename(context);

        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Storing '{}' as '{}' on disk '{}' (session: {})",
                context.file().original_name(),
                filename,
                disk,
                context.session_label()
            ),
            "pipeline::store",
        );

        let stored = match self.store(context, &filename, visibility) {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                let message = format!("Failed to store file on disk '{}'", disk);
                return base::failure(
                    Self::NAME,
                    context,
                    message.clone(),
                    vec![StepError::storage(message)],
                );
            }
            Err(e) => {
                return base::failure(
                    Self::NAME,
                    context,
                    format!("Failed to store file on disk '{}'", disk),
                    vec![StepError::storage(e.to_string())],
                );
            }
        };

        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Stored '{}' at {} (session: {})",
                filename,
                stored.path,
                context.session_label()
            ),
            "pipeline::store",
        );

        let mut delta = Metadata::new();
        delta.insert("stored_path".to_string(), stored.path.into());
        delta.insert("filename".to_string(), filename.into());
        delta.insert("url".to_string(), stored.url.into());
        delta.insert("disk".to_string(), disk.as_str().into());
        delta.insert("visibility".to_string(), visibility.as_str().into());
        delta.insert("processed_at".to_string(), Utc::now().to_rfc3339().into());
        if let Some(etag) = stored.etag {
            delta.insert("etag".to_string(), etag.into());
        }

        base::success(context, "File stored", delta)
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Writes the file to the configured disk"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn configuration_options(&self) -> Vec<ConfigOption> {
        vec![
            ConfigOption::boolean(
                "randomize_filename",
                true,
                "Store under a random name instead of the original",
            ),
            ConfigOption::boolean(
                "sanitize_filename",
                true,
                "Replace unsafe characters in kept filenames",
            ),
            ConfigOption::boolean(
                "preserve_extension",
                true,
                "Keep the original extension on the stored name",
            ),
            ConfigOption::string("force_filename", "Exact filename to store under"),
        ]
    }
}
