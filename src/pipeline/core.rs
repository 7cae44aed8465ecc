use super::context::{Metadata, UploadContext};
use crate::catalog::FileRecord;
use crate::config::ConfigOption;
use crate::error::StepError;
use std::time::Duration;

/// A single step in the upload pipeline
///
/// Steps receive the current context and return a [`StepResult`]. They never
/// fail with `Err`: expected failures (validation, duplicates, storage) are
/// failed results, and a panic means a bug.
///
/// # Example
/// ```
/// use upload_pipeline::pipeline::{base, Metadata, StepResult, UploadContext, UploadStep};
///
/// struct TagStep;
///
/// impl UploadStep for TagStep {
///     fn execute(&self, context: &UploadContext) -> StepResult {
///         let mut delta = Metadata::new();
///         delta.insert("tagged".to_string(), true.into());
///         base::success(context, "Tagged upload", delta)
///     }
///
///     fn name(&self) -> &str {
///         "tag"
///     }
///
///     fn description(&self) -> &str {
///         "Marks every upload as tagged"
///     }
///
///     fn priority(&self) -> i32 {
///         60
///     }
/// }
/// ```
pub trait UploadStep: Send + Sync {
    fn execute(&self, context: &UploadContext) -> StepResult;

    /// Unique name, also the key that disables the step in configuration
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Lower runs earlier
    fn priority(&self) -> i32;

    /// Whether this step applies to `context`
    ///
    /// The default only checks that the step has not been disabled.
    fn can_handle(&self, context: &UploadContext) -> bool {
        context.configuration().is_step_enabled(self.name())
    }

    /// Configuration keys this step recognizes
    fn configuration_options(&self) -> Vec<ConfigOption> {
        Vec::new()
    }
}

/// Outcome of one step
///
/// A result carrying a context is a continuation; one without is terminal
/// and ends the chain whether it succeeded or not.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub success: bool,
    pub message: String,
    /// Catalog entry, set only when the chain ends on a stored record
    pub record: Option<FileRecord>,
    pub path: Option<String>,
    pub url: Option<String>,
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub metadata: Metadata,
    pub errors: Vec<StepError>,
    pub context: Option<UploadContext>,
}

impl StepResult {
    fn bare(success: bool, message: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            success,
            message: message.into(),
            record: None,
            path: None,
            url: None,
            filename: None,
            size: None,
            mime_type: None,
            metadata,
            errors: Vec::new(),
            context: None,
        }
    }

    /// Successful result that hands `context` to the next step
    pub fn proceed(context: UploadContext, message: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            context: Some(context),
            ..Self::bare(true, message, metadata)
        }
    }

    /// Successful result that ends the chain
    pub fn finished(message: impl Into<String>, metadata: Metadata) -> Self {
        Self::bare(true, message, metadata)
    }

    pub fn failed(message: impl Into<String>, errors: Vec<StepError>) -> Self {
        Self {
            errors,
            ..Self::bare(false, message, Metadata::new())
        }
    }

    pub fn with_record(mut self, record: FileRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Attach final artifact descriptors
    pub fn with_artifact(
        mut self,
        path: impl Into<String>,
        url: Option<String>,
        filename: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        self.path = Some(path.into());
        self.url = url;
        self.filename = Some(filename.into());
        self.size = Some(size);
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Success with a continuation context
    pub fn should_continue(&self) -> bool {
        self.success && self.context.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.context.is_none()
    }
}

/// Timing record of one executed step
#[derive(Debug, Clone, PartialEq)]
pub struct StepTrace {
    pub step_name: String,
    pub success: bool,
    pub duration: Duration,
}

/// A full pipeline execution: the outcome plus what ran
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub pipeline_name: String,
    pub outcome: StepResult,
    pub steps: Vec<StepTrace>,
    pub total_duration: Duration,
}

impl PipelineRun {
    pub fn executed_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step_name.as_str()).collect()
    }

    /// The step that failed (if any)
    pub fn failed_step(&self) -> Option<&StepTrace> {
        self.steps.iter().find(|s| !s.success)
    }
}
