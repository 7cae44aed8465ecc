use crate::catalog::{Catalog, NewFileRecord};
use crate::config::ConfigOption;
use crate::error::StepError;
use crate::file::Visibility;
use crate::logger::{LogLevel, LOGGER};
use crate::pipeline::base;
use crate::pipeline::{StepResult, UploadContext, UploadStep};
use serde_json::Value;
use std::sync::Arc;

/// Metadata keys that are stored as record columns or only matter in flight
const TRANSIENT_KEYS: [&str; 9] = [
    "stored_path",
    "url",
    "filename",
    "disk",
    "visibility",
    "file_hash",
    "hash_algorithm",
    "width",
    "height",
];

const REQUIRED_KEYS: [&str; 3] = ["stored_path", "filename", "url"];

/// Step that writes the catalog record for a stored file and ends the chain
pub struct PersistRecordStep {
    catalog: Arc<dyn Catalog>,
}

impl PersistRecordStep {
    pub const NAME: &'static str = "save_to_database";

    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    fn dimension(context: &UploadContext, key: &str) -> Option<u32> {
        context
            .get_metadata(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    fn metadata_blob(context: &UploadContext) -> Option<Value> {
        if !context.configuration().persist.store_metadata || !context.extract_metadata() {
            return None;
        }
        let blob: serde_json::Map<String, Value> = context
            .metadata()
            .iter()
            .filter(|(key, _)| !TRANSIENT_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Some(Value::Object(blob))
    }
}

impl UploadStep for PersistRecordStep {
    fn execute(&self, context: &UploadContext) -> StepResult {
        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| context.get_metadata_str(key).map_or(true, str::is_empty))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return base::failure(
                Self::NAME,
                context,
                "Missing required file information",
                vec![StepError::MissingMetadata { keys: missing }],
            );
        }

        // Checked above
        let path = context.get_metadata_str("stored_path").unwrap_or_default().to_string();
        let filename = context.get_metadata_str("filename").unwrap_or_default().to_string();
        let url = context.get_metadata_str("url").unwrap_or_default().to_string();

        let file = context.file();
        let record = NewFileRecord {
            owner_id: context.owner().clone(),
            name: filename.clone(),
            original_name: file.original_name().to_string(),
            path: path.clone(),
            directory: context.directory().to_string(),
            disk: context.disk(),
            size: file.size(),
            mime_type: file.mime_type().to_string(),
            visibility: Visibility::from_public_flag(context.is_public()),
            metadata: Self::metadata_blob(context),
            width: Self::dimension(context, "width"),
            height: Self::dimension(context, "height"),
            content_hash: context.get_metadata_str("file_hash").map(str::to_string),
        };

        let record = match self.catalog.create(record) {
            Ok(record) => record,
            Err(e) => {
                return base::failure(
                    Self::NAME,
                    context,
                    "Failed to save file record",
                    vec![StepError::catalog(e.to_string())],
                );
            }
        };

        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Saved record {} for '{}' (session: {})",
                record.id,
                path,
                context.session_label()
            ),
            "pipeline::persist",
        );

        StepResult::finished("File uploaded successfully", context.metadata().clone())
            .with_artifact(path, Some(url), filename, file.size(), file.mime_type())
            .with_record(record)
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Saves the catalog record for the stored file"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn configuration_options(&self) -> Vec<ConfigOption> {
        vec![ConfigOption::boolean(
            "store_metadata",
            true,
            "Attach collected metadata to the record",
        )]
    }
}
