use crate::catalog::{Catalog, FileRecord};
use crate::config::{ConfigOption, DuplicateAction, DuplicateScope};
use crate::error::StepError;
use crate::file::Visibility;
use crate::hash::{HashAlgorithm, HashInfo};
use crate::logger::{LogLevel, LOGGER};
use crate::pipeline::base;
use crate::pipeline::steps::store::sanitize_filename;
use crate::pipeline::{Metadata, StepResult, UploadContext, UploadStep};
use crate::storage::StorageBackend;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Step that hashes the upload and looks for an identical file in the catalog
///
/// Only runs when the context asks for duplicate checks.
///
/// # Context Outputs
/// - `file_hash`, `hash_algorithm` - persisted with the record
/// - `duplicate_of` - id of the matching record (skip / rename)
/// - configuration `store.force_filename` - set on rename
pub struct DuplicateDetectionStep {
    catalog: Arc<dyn Catalog>,
    storage: Arc<dyn StorageBackend>,
}

impl DuplicateDetectionStep {
    pub const NAME: &'static str = "duplicate_detection";

    pub fn new(catalog: Arc<dyn Catalog>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { catalog, storage }
    }

    fn compute_hash(&self, context: &UploadContext, algorithm: HashAlgorithm) -> Result<HashInfo, String> {
        let reader = context.file().open().map_err(|e| e.to_string())?;
        HashInfo::from_reader(algorithm, reader).map_err(|e| e.to_string())
    }

    /// URL of an existing record, signed when it's private
    fn existing_url(&self, record: &FileRecord) -> Option<String> {
        let url = match record.visibility {
            Visibility::Public => self.storage.url(record.disk, &record.path),
            Visibility::Private => {
                self.storage
                    .signed_url(record.disk, &record.path, Duration::hours(1))
            }
        };
        match url {
            Ok(url) => Some(url),
            Err(e) => {
                LOGGER.log(
                    LogLevel::Warn,
                    &format!("Could not resolve URL for record {}: {}", record.id, e),
                    "pipeline::duplicate",
                );
                None
            }
        }
    }
}

/// Filename for a renamed duplicate: `<stem>_copy_<timestamp>_<suffix>.<ext>`
///
/// The random suffix keeps copies made within the same second apart.
pub fn duplicate_filename(context: &UploadContext) -> String {
    let file = context.file();
    let stem = sanitize_filename(file.stem());
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..8];
    match file.extension() {
        Some(ext) => format!("{}_copy_{}_{}.{}", stem, timestamp, suffix, ext),
        None => format!("{}_copy_{}_{}", stem, timestamp, suffix),
    }
}

impl UploadStep for DuplicateDetectionStep {
    fn execute(&self, context: &UploadContext) -> StepResult {
        let config = &context.configuration().duplicates;

        let hash = match self.compute_hash(context, config.algorithm) {
            Ok(hash) => hash,
            Err(e) => {
                return base::failure(
                    Self::NAME,
                    context,
                    "Could not compute file hash",
                    vec![StepError::hashing(e)],
                );
            }
        };

        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Computed {} hash {} for '{}' (session: {})",
                hash.algorithm,
                hash.value,
                context.file().original_name(),
                context.session_label()
            ),
            "pipeline::duplicate",
        );

        let owner = match config.scope {
            DuplicateScope::User => Some(context.owner()),
            DuplicateScope::Global => None,
        };
        let existing = match self.catalog.find_by_hash(&hash.value, owner) {
            Ok(existing) => existing,
            Err(e) => {
                return base::failure(
                    Self::NAME,
                    context,
                    "Could not check for duplicate files",
                    vec![StepError::catalog(e.to_string())],
                );
            }
        };

        let mut delta = Metadata::new();
        delta.insert("file_hash".to_string(), hash.value.clone().into());
        delta.insert("hash_algorithm".to_string(), hash.algorithm.as_str().into());

        let Some(existing) = existing else {
            return base::success(context, "No duplicate found", delta);
        };

        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Upload '{}' duplicates record {} ({:?}) (session: {})",
                context.file().original_name(),
                existing.id,
                config.action_on_duplicate,
                context.session_label()
            ),
            "pipeline::duplicate",
        );
        delta.insert("duplicate_of".to_string(), existing.id.to_string().into());

        match config.action_on_duplicate {
            DuplicateAction::Reject => {
                let error = StepError::DuplicateDetected {
                    record_id: existing.id,
                    filename: existing.name.clone(),
                    path: existing.path.clone(),
                    url: self.existing_url(&existing),
                };
                base::failure(
                    Self::NAME,
                    context,
                    "This file has already been uploaded",
                    vec![error],
                )
            }
            DuplicateAction::Skip => {
                let url = self.existing_url(&existing);
                StepResult::finished("File already exists, using existing upload", delta)
                    .with_artifact(
                        existing.path.clone(),
                        url,
                        existing.name.clone(),
                        existing.size,
                        existing.mime_type.clone(),
                    )
                    .with_record(existing)
            }
            DuplicateAction::Rename => {
                let filename = duplicate_filename(context);
                let mut configuration = context.configuration().clone();
                configuration.store.force_filename = Some(filename.clone());
                delta.insert("renamed_to".to_string(), filename.into());

                base::success(
                    &context.with_configuration(configuration),
                    "Duplicate found, storing under a new name",
                    delta,
                )
            }
        }
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Detects files already in the catalog by content hash"
    }

    fn priority(&self) -> i32 {
        25
    }

    fn can_handle(&self, context: &UploadContext) -> bool {
        context.check_duplicates() && context.configuration().is_step_enabled(self.name())
    }

    fn configuration_options(&self) -> Vec<ConfigOption> {
        vec![
            ConfigOption::choice(
                "algorithm",
                HashAlgorithm::ALL.iter().map(|a| a.as_str()).collect(),
                HashAlgorithm::default().as_str(),
                "Digest used to fingerprint file contents",
            ),
            ConfigOption::choice(
                "scope",
                vec!["user", "global"],
                "user",
                "Compare against the uploader's files or every file",
            ),
            ConfigOption::choice(
                "action_on_duplicate",
                vec!["reject", "skip", "rename"],
                "reject",
                "What to do when an identical file already exists",
            ),
        ]
    }
}
