use crate::config::ConfigOption;
use crate::error::StepError;
use crate::logger::{LogLevel, LOGGER};
use crate::pipeline::base::{self, format_bytes};
use crate::pipeline::{Metadata, StepResult, UploadContext, UploadStep};
use chrono::Utc;

/// Extensions of the image types the catalog supports
pub const SUPPORTED_EXTENSIONS: [&str; 9] =
    ["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "avif", "ico"];

/// Step that checks size, MIME type and extension before anything is stored
///
/// Every enabled check runs; all violations are reported together.
///
/// # Context Outputs
/// - `validated_at` - RFC 3339 timestamp
/// - `formatted_size` - e.g. `2 MB`
/// - `mime_type`
/// - `extension`
pub struct ValidateStep;

impl ValidateStep {
    pub const NAME: &'static str = "validate_file";

    pub fn new() -> Self {
        Self
    }

    fn violations(&self, context: &UploadContext) -> Vec<StepError> {
        let config = &context.configuration().validate;
        let file = context.file();
        let mut errors = Vec::new();

        if config.validate_size && !base::is_size_within_limit(context) {
            errors.push(StepError::validation(format!(
                "File size ({}) exceeds the maximum allowed size of {}",
                format_bytes(file.size()),
                format_bytes(context.max_size_bytes())
            )));
        }

        if config.validate_mime_type && !base::is_mime_type_allowed(context) {
            errors.push(StepError::validation(format!(
                "File type '{}' is not allowed",
                file.mime_type()
            )));
        }

        if config.validate_extension {
            match file.extension() {
                Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext) => {}
                Some(ext) => errors.push(StepError::validation(format!(
                    "File extension '{}' is not allowed",
                    ext
                ))),
                None => errors.push(StepError::validation("File has no extension")),
            }
        }

        errors
    }
}

impl Default for ValidateStep {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadStep for ValidateStep {
    fn execute(&self, context: &UploadContext) -> StepResult {
        let file = context.file();
        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Validating '{}' ({}, {}) (session: {})",
                file.original_name(),
                format_bytes(file.size()),
                file.mime_type(),
                context.session_label()
            ),
            "pipeline::validate",
        );

        let errors = self.violations(context);
        if !errors.is_empty() {
            return base::failure(Self::NAME, context, "File validation failed", errors);
        }

        let mut delta = Metadata::new();
        delta.insert("validated_at".to_string(), Utc::now().to_rfc3339().into());
        delta.insert("formatted_size".to_string(), format_bytes(file.size()).into());
        delta.insert("mime_type".to_string(), file.mime_type().into());
        delta.insert(
            "extension".to_string(),
            file.extension().map(serde_json::Value::from).unwrap_or_default(),
        );

        base::success(context, "File validation passed", delta)
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Checks file size, MIME type and extension against the upload limits"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn configuration_options(&self) -> Vec<ConfigOption> {
        vec![
            ConfigOption::boolean("validate_size", true, "Reject files larger than the size limit"),
            ConfigOption::boolean(
                "validate_mime_type",
                true,
                "Reject MIME types outside the allowed list",
            ),
            ConfigOption::boolean(
                "validate_extension",
                true,
                "Reject extensions that are not supported image types",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfiguration;
    use crate::file::{OwnerId, UploadedFile};

    const MB: u64 = 1024 * 1024;

    fn context(name: &str, mime: &str, size: u64, allowed: &[&str]) -> UploadContext {
        let file = UploadedFile::from_bytes(name, mime, vec![0u8; size as usize]);
        UploadContext::builder(file, OwnerId::new("u1"))
            .max_size_bytes(5 * MB)
            .allowed_mime_types(allowed.iter().copied())
            .build()
    }

    #[test]
    fn test_valid_file_passes() {
        let context = context("photo.jpg", "image/jpeg", 2 * MB, &["image/jpeg", "image/png"]);
        let result = ValidateStep::new().execute(&context);

        assert!(result.success);
        assert!(result.errors.is_empty());
        assert!(result.should_continue());
        assert_eq!(result.metadata["formatted_size"], "2 MB");
        assert_eq!(result.metadata["mime_type"], "image/jpeg");
        assert_eq!(result.metadata["extension"], "jpg");
        assert!(result.metadata.contains_key("validated_at"));

        let next = result.context.unwrap();
        assert_eq!(next.get_metadata("extension").unwrap(), "jpg");
    }

    #[test]
    fn test_all_violations_are_collected() {
        let context = context("report.pdf", "application/pdf", 10 * MB, &["image/jpeg", "image/png"]);
        let result = ValidateStep::new().execute(&context);

        assert!(!result.success);
        assert!(result.is_terminal());
        assert_eq!(result.errors.len(), 3);
        assert_eq!(
            result.errors[0].to_string(),
            "File size (10 MB) exceeds the maximum allowed size of 5 MB"
        );
        assert_eq!(result.errors[1].to_string(), "File type 'application/pdf' is not allowed");
        assert_eq!(result.errors[2].to_string(), "File extension 'pdf' is not allowed");
    }

    #[test]
    fn test_disabled_checks_are_not_counted() {
        let mut config = PipelineConfiguration::default();
        config.validate.validate_extension = false;
        let context = context("report.pdf", "application/pdf", 10 * MB, &["image/jpeg"])
            .with_configuration(config);

        let result = ValidateStep::new().execute(&context);
        assert_eq!(result.errors.len(), 2);

        let mut config = PipelineConfiguration::default();
        config.validate = crate::config::ValidateConfig {
            validate_size: false,
            validate_mime_type: false,
            validate_extension: false,
        };
        let context = context.with_configuration(config);
        assert!(ValidateStep::new().execute(&context).success);
    }

    #[test]
    fn test_any_type_wildcard_accepts_every_type() {
        let jpeg = context("photo.jpg", "image/jpeg", 10, &["*/*"]);
        assert!(ValidateStep::new().execute(&jpeg).success);

        // Only the extension check stops a PDF here
        let result = ValidateStep::new().execute(&context("scan.pdf", "application/pdf", 10, &["*/*"]));
        assert_eq!(
            result.errors,
            vec![StepError::validation("File extension 'pdf' is not allowed")]
        );
    }

    #[test]
    fn test_missing_extension() {
        let context = context("README", "image/png", 10, &[]);
        let result = ValidateStep::new().execute(&context);

        assert_eq!(result.errors, vec![StepError::validation("File has no extension")]);
    }

    #[test]
    fn test_can_handle_respects_disable_flag() {
        let step = ValidateStep::new();
        let context = context("photo.jpg", "image/jpeg", 10, &[]);
        assert!(step.can_handle(&context));

        let disabled = context
            .with_configuration(PipelineConfiguration::default().disable_step(ValidateStep::NAME));
        assert!(!step.can_handle(&disabled));
    }

    #[test]
    fn test_declares_options() {
        let keys: Vec<&str> = ValidateStep::new()
            .configuration_options()
            .iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["validate_size", "validate_mime_type", "validate_extension"]);
    }
}
