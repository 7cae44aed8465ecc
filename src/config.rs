use crate::error::{UploadError, UploadResult};
use crate::hash::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Typed configuration threaded through the pipeline in the upload context
///
/// Every section is defaulted, so a partial JSON document only overrides
/// the keys it names.
///
/// # Example
/// ```
/// use upload_pipeline::config::{DuplicateAction, PipelineConfiguration};
///
/// let config = PipelineConfiguration::from_json_str(
///     r#"{ "duplicates": { "action_on_duplicate": "skip" } }"#,
/// ).unwrap();
/// assert_eq!(config.duplicates.action_on_duplicate, DuplicateAction::Skip);
/// assert!(config.validate.validate_size);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfiguration {
    /// Names of steps switched off for this upload
    pub disabled_steps: BTreeSet<String>,
    pub validate: ValidateConfig,
    pub duplicates: DuplicateConfig,
    pub store: StoreConfig,
    pub persist: PersistConfig,
}

impl PipelineConfiguration {
    pub fn from_json_str(json: &str) -> UploadResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| UploadError::ConfigError(format!("Invalid pipeline configuration: {}", e)))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> UploadResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn is_step_enabled(&self, step_name: &str) -> bool {
        !self.disabled_steps.contains(step_name)
    }

    pub fn disable_step(mut self, step_name: impl Into<String>) -> Self {
        self.disabled_steps.insert(step_name.into());
        self
    }

    pub fn enable_step(mut self, step_name: &str) -> Self {
        self.disabled_steps.remove(step_name);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    pub validate_size: bool,
    pub validate_mime_type: bool,
    pub validate_extension: bool,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            validate_size: true,
            validate_mime_type: true,
            validate_extension: true,
        }
    }
}

/// Which catalog records count as duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateScope {
    /// Only the uploader's own files
    #[default]
    User,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateAction {
    #[default]
    Reject,
    Skip,
    Rename,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    pub algorithm: HashAlgorithm,
    pub scope: DuplicateScope,
    pub action_on_duplicate: DuplicateAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Overrides the context's `randomize_filename` flag when set
    pub randomize_filename: Option<bool>,
    pub sanitize_filename: bool,
    pub preserve_extension: bool,
    /// Exact filename to store under, set by duplicate renaming
    pub force_filename: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            randomize_filename: None,
            sanitize_filename: true,
            preserve_extension: true,
            force_filename: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Attach the accumulated metadata blob to the catalog record
    pub store_metadata: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            store_metadata: true,
        }
    }
}

/// Value type of a declared configuration option
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptionKind {
    Boolean,
    String,
    Choice { values: Vec<&'static str> },
}

/// A configuration key a step recognizes, for introspection by UI layers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigOption {
    pub key: &'static str,
    pub kind: OptionKind,
    pub default: serde_json::Value,
    pub description: &'static str,
}

impl ConfigOption {
    pub fn boolean(key: &'static str, default: bool, description: &'static str) -> Self {
        Self {
            key,
            kind: OptionKind::Boolean,
            default: serde_json::Value::Bool(default),
            description,
        }
    }

    pub fn choice(
        key: &'static str,
        values: Vec<&'static str>,
        default: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            kind: OptionKind::Choice { values },
            default: serde_json::Value::String(default.to_string()),
            description,
        }
    }

    pub fn string(key: &'static str, description: &'static str) -> Self {
        Self {
            key,
            kind: OptionKind::String,
            default: serde_json::Value::Null,
            description,
        }
    }
}
