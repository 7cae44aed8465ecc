use super::context::{Metadata, UploadContext};
use super::core::{PipelineRun, StepResult, StepTrace, UploadStep};
use super::registry::{StepRegistry, StepServices};
use crate::error::UploadResult;
use crate::logger::{LogLevel, LOGGER};
use std::sync::Arc;
use std::time::Instant;

/// Pipeline executor that runs the registry's applicable steps in order
///
/// A failed result stops the chain and is returned as-is. A successful
/// result with a context continues; one without ends the chain.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use upload_pipeline::catalog::MemoryCatalog;
/// use upload_pipeline::file::{OwnerId, UploadedFile};
/// use upload_pipeline::pipeline::{Pipeline, StepServices, UploadContext};
/// use upload_pipeline::storage::{MemoryObjectUploader, MemoryStorage};
///
/// let services = StepServices::new(
///     Arc::new(MemoryStorage::new()),
///     Arc::new(MemoryObjectUploader::default()),
///     Arc::new(MemoryCatalog::new()),
/// );
/// let pipeline = Pipeline::builder("uploads", services).default_steps().build();
///
/// let file = UploadedFile::from_bytes("cat.png", "image/png", vec![0u8; 256]);
/// let context = UploadContext::builder(file, OwnerId::new("user-1")).build();
///
/// let result = pipeline.execute(&context);
/// assert!(result.success);
/// assert!(result.record.is_some());
/// ```
pub struct Pipeline {
    name: String,
    registry: StepRegistry,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, registry: StepRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
        }
    }

    /// Create a new pipeline builder
    pub fn builder(name: impl Into<String>, services: StepServices) -> PipelineBuilder {
        PipelineBuilder::new(name, services)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StepRegistry {
        &mut self.registry
    }

    /// Run the pipeline and return the final result
    pub fn execute(&self, context: &UploadContext) -> StepResult {
        self.execute_with_report(context).outcome
    }

    /// Run the pipeline and return the final result with per-step timings
    pub fn execute_with_report(&self, context: &UploadContext) -> PipelineRun {
        let steps = self.registry.applicable_steps(context);
        LOGGER.log(
            LogLevel::Info,
            &format!(
                "Starting pipeline '{}' with {} steps (session: {})",
                self.name,
                steps.len(),
                context.session_label()
            ),
            "pipeline",
        );

        let pipeline_start = Instant::now();
        let mut traces = Vec::with_capacity(steps.len());
        let mut current = context.clone();
        let mut last: Option<StepResult> = None;

        for (index, step) in steps.iter().enumerate() {
            let step_name = step.name();
            LOGGER.log(
                LogLevel::Info,
                &format!(
                    "Executing step {}/{}: {} (session: {})",
                    index + 1,
                    steps.len(),
                    step_name,
                    context.session_label()
                ),
                "pipeline",
            );

            let step_start = Instant::now();
            let result = step.execute(&current);
            let duration = step_start.elapsed();
            traces.push(StepTrace {
                step_name: step_name.to_string(),
                success: result.success,
                duration,
            });

            if !result.success {
                LOGGER.log(
                    LogLevel::Error,
                    &format!(
                        "Pipeline '{}' stopped at step '{}': {} (session: {})",
                        self.name,
                        step_name,
                        result.message,
                        context.session_label()
                    ),
                    "pipeline",
                );
                return self.finish(result, traces, pipeline_start, context);
            }

            LOGGER.log(
                LogLevel::Info,
                &format!(
                    "Step '{}' completed successfully in {:.2}s (session: {})",
                    step_name,
                    duration.as_secs_f64(),
                    context.session_label()
                ),
                "pipeline",
            );

            if result.is_terminal() {
                return self.finish(result, traces, pipeline_start, context);
            }
            if let Some(next) = &result.context {
                current = next.with_metadata_map(&result.metadata);
            }
            last = Some(result);
        }

        let outcome = last.unwrap_or_else(|| {
            StepResult::proceed(context.clone(), "No applicable steps", Metadata::new())
        });
        self.finish(outcome, traces, pipeline_start, context)
    }

    fn finish(
        &self,
        outcome: StepResult,
        steps: Vec<StepTrace>,
        pipeline_start: Instant,
        context: &UploadContext,
    ) -> PipelineRun {
        let total_duration = pipeline_start.elapsed();
        if outcome.success {
            LOGGER.log(
                LogLevel::Info,
                &format!(
                    "Pipeline '{}' completed successfully in {:.2}s (session: {})",
                    self.name,
                    total_duration.as_secs_f64(),
                    context.session_label()
                ),
                "pipeline",
            );
        }

        PipelineRun {
            pipeline_name: self.name.clone(),
            outcome,
            steps,
            total_duration,
        }
    }
}

/// Builder for constructing pipelines
pub struct PipelineBuilder {
    name: String,
    registry: StepRegistry,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>, services: StepServices) -> Self {
        Self {
            name: name.into(),
            registry: StepRegistry::new(services),
        }
    }

    /// Register the four built-in steps
    ///
    /// Steps added afterwards with a built-in step's name replace it.
    pub fn default_steps(mut self) -> Self {
        self.registry.register_default_steps();
        self
    }

    /// Add a step to the pipeline
    pub fn add_step<S: UploadStep + 'static>(mut self, step: S) -> Self {
        self.registry.register_step(Arc::new(step));
        self
    }

    /// Add a step built from the shared services
    pub fn add_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&StepServices) -> UploadResult<Arc<dyn UploadStep>> + Send + Sync + 'static,
    {
        self.registry.register(name, factory);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.name, self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::config::PipelineConfiguration;
    use crate::error::StepError;
    use crate::file::{OwnerId, UploadedFile};
    use crate::pipeline::base;
    use crate::storage::{MemoryObjectUploader, MemoryStorage};
    use serde_json::json;

    // Test step that records its name and continues
    struct MarkStep {
        name: &'static str,
        priority: i32,
    }

    impl UploadStep for MarkStep {
        fn execute(&self, context: &UploadContext) -> StepResult {
            let mut delta = Metadata::new();
            delta.insert(self.name.to_string(), json!("executed"));
            base::success(context, "marked", delta)
        }

        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "marks the context"
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    // Test step that fails
    struct FailStep;

    impl UploadStep for FailStep {
        fn execute(&self, context: &UploadContext) -> StepResult {
            base::failure("fail", context, "Step failed", vec![StepError::validation("no")])
        }

        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn priority(&self) -> i32 {
            20
        }
    }

    // Test step that ends the chain, echoing what it saw
    struct FinishStep;

    impl UploadStep for FinishStep {
        fn execute(&self, context: &UploadContext) -> StepResult {
            StepResult::finished("done", context.metadata().clone())
        }

        fn name(&self) -> &str {
            "finish"
        }

        fn description(&self) -> &str {
            "ends the chain"
        }

        fn priority(&self) -> i32 {
            30
        }
    }

    fn services() -> StepServices {
        StepServices::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryObjectUploader::default()),
            Arc::new(MemoryCatalog::new()),
        )
    }

    fn context() -> UploadContext {
        let file = UploadedFile::from_bytes("a.png", "image/png", vec![0u8; 4]);
        UploadContext::builder(file, OwnerId::new("u1"))
            .session_id("session-123")
            .build()
    }

    #[test]
    fn test_empty_pipeline_is_neutral_success() {
        let pipeline = Pipeline::builder("empty", services()).build();
        let context = context();
        let run = pipeline.execute_with_report(&context);

        assert!(run.outcome.success);
        assert_eq!(run.outcome.context.as_ref(), Some(&context));
        assert_eq!(run.executed_steps(), 0);
    }

    #[test]
    fn test_metadata_threads_between_steps() {
        let pipeline = Pipeline::builder("test-pipeline", services())
            .add_step(MarkStep { name: "first", priority: 10 })
            .add_step(FinishStep)
            .build();

        let run = pipeline.execute_with_report(&context());
        assert!(run.outcome.success);
        assert!(run.outcome.is_terminal());
        assert_eq!(run.outcome.metadata["first"], "executed");
        assert_eq!(run.step_names(), vec!["first", "finish"]);
    }

    #[test]
    fn test_failure_stops_chain() {
        let pipeline = Pipeline::builder("test-pipeline", services())
            .add_step(MarkStep { name: "first", priority: 10 })
            .add_step(FailStep)
            .add_step(MarkStep { name: "third", priority: 40 })
            .build();

        let run = pipeline.execute_with_report(&context());
        assert!(!run.outcome.success);
        assert_eq!(run.outcome.message, "Step failed");
        assert_eq!(run.executed_steps(), 2);
        assert_eq!(run.failed_step().unwrap().step_name, "fail");
    }

    #[test]
    fn test_terminal_success_skips_later_steps() {
        let pipeline = Pipeline::builder("test-pipeline", services())
            .add_step(FinishStep)
            .add_step(MarkStep { name: "later", priority: 99 })
            .build();

        let run = pipeline.execute_with_report(&context());
        assert!(run.outcome.success);
        assert_eq!(run.step_names(), vec!["finish"]);
    }

    #[test]
    fn test_last_continuation_is_returned() {
        let pipeline = Pipeline::builder("test-pipeline", services())
            .add_step(MarkStep { name: "first", priority: 10 })
            .add_step(MarkStep { name: "second", priority: 20 })
            .build();

        let result = pipeline.execute(&context());
        assert!(result.should_continue());
        let context = result.context.unwrap();
        assert_eq!(context.get_metadata_str("first"), Some("executed"));
        assert_eq!(context.get_metadata_str("second"), Some("executed"));
    }

    #[test]
    fn test_disabled_step_is_not_run() {
        let pipeline = Pipeline::builder("test-pipeline", services())
            .add_step(MarkStep { name: "first", priority: 10 })
            .add_step(FailStep)
            .build();

        let context =
            context().with_configuration(PipelineConfiguration::default().disable_step("fail"));
        let run = pipeline.execute_with_report(&context);

        assert!(run.outcome.success);
        assert_eq!(run.step_names(), vec!["first"]);
    }

    #[test]
    fn test_default_steps_keep_custom_steps() {
        let pipeline = Pipeline::builder("uploads", services())
            .add_step(MarkStep { name: "tag", priority: 60 })
            .default_steps()
            .build();

        let names: Vec<String> = pipeline
            .registry()
            .all_steps()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "validate_file",
                "duplicate_detection",
                "process_file",
                "tag",
                "save_to_database"
            ]
        );
    }

    #[test]
    fn test_steps_added_after_build_are_run() {
        let mut pipeline = Pipeline::builder("test-pipeline", services())
            .add_step(MarkStep { name: "first", priority: 10 })
            .build();
        assert_eq!(pipeline.execute_with_report(&context()).step_names(), vec!["first"]);

        pipeline.registry_mut().register_step(Arc::new(FinishStep));
        let run = pipeline.execute_with_report(&context());
        assert_eq!(run.step_names(), vec!["first", "finish"]);
        assert!(run.outcome.is_terminal());
    }
}
