use super::context::UploadContext;
use super::core::UploadStep;
use super::steps::{DuplicateDetectionStep, PersistRecordStep, StoreFileStep, ValidateStep};
use crate::catalog::Catalog;
use crate::config::ConfigOption;
use crate::error::UploadResult;
use crate::logger::{LogLevel, LOGGER};
use crate::storage::{ObjectUploader, StorageBackend};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Collaborators handed to step factories
#[derive(Clone)]
pub struct StepServices {
    pub storage: Arc<dyn StorageBackend>,
    pub object_uploader: Arc<dyn ObjectUploader>,
    pub catalog: Arc<dyn Catalog>,
}

impl StepServices {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        object_uploader: Arc<dyn ObjectUploader>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            storage,
            object_uploader,
            catalog,
        }
    }
}

/// Builds one step from the shared services
pub type StepFactory =
    Box<dyn Fn(&StepServices) -> UploadResult<Arc<dyn UploadStep>> + Send + Sync>;

/// Declared options of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSchema {
    pub name: String,
    pub description: String,
    pub priority: i32,
    pub options: Vec<ConfigOption>,
}

/// Name-keyed set of available steps
///
/// Steps come from registered factories. Factories run lazily the first time
/// steps are requested and the result is cached until [`reset`](Self::reset).
/// A factory that fails is logged and left out.
pub struct StepRegistry {
    services: StepServices,
    factories: Vec<(String, StepFactory)>,
    steps: OnceCell<BTreeMap<String, Arc<dyn UploadStep>>>,
}

impl StepRegistry {
    /// Empty registry
    pub fn new(services: StepServices) -> Self {
        Self {
            services,
            factories: Vec::new(),
            steps: OnceCell::new(),
        }
    }

    /// Registry holding the four built-in steps
    pub fn with_default_steps(services: StepServices) -> Self {
        let mut registry = Self::new(services);
        registry.register_default_steps();
        registry
    }

    /// Register the four built-in steps
    pub fn register_default_steps(&mut self) {
        self.register(ValidateStep::NAME, |_| Ok(Arc::new(ValidateStep::new())));
        self.register(DuplicateDetectionStep::NAME, |services| {
            Ok(Arc::new(DuplicateDetectionStep::new(
                services.catalog.clone(),
                services.storage.clone(),
            )))
        });
        self.register(StoreFileStep::NAME, |services| {
            Ok(Arc::new(StoreFileStep::new(
                services.storage.clone(),
                services.object_uploader.clone(),
            )))
        });
        self.register(PersistRecordStep::NAME, |services| {
            Ok(Arc::new(PersistRecordStep::new(services.catalog.clone())))
        });
    }

    pub fn with_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&StepServices) -> UploadResult<Arc<dyn UploadStep>> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Add a factory; a step with the same name as an earlier one replaces it
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&StepServices) -> UploadResult<Arc<dyn UploadStep>> + Send + Sync + 'static,
    {
        self.factories.push((name.into(), Box::new(factory)));
        self.reset();
    }

    /// Add an already-built step
    pub fn register_step(&mut self, step: Arc<dyn UploadStep>) {
        let name = step.name().to_string();
        self.register(name, move |_| Ok(step.clone()));
    }

    /// Drop cached steps so the next lookup runs every factory again
    pub fn reset(&mut self) {
        self.steps = OnceCell::new();
    }

    pub fn services(&self) -> &StepServices {
        &self.services
    }

    fn steps(&self) -> &BTreeMap<String, Arc<dyn UploadStep>> {
        self.steps.get_or_init(|| self.discover())
    }

    fn discover(&self) -> BTreeMap<String, Arc<dyn UploadStep>> {
        let mut steps: BTreeMap<String, Arc<dyn UploadStep>> = BTreeMap::new();

        for (factory_name, factory) in &self.factories {
            let step = match factory(&self.services) {
                Ok(step) => step,
                Err(e) => {
                    LOGGER.log(
                        LogLevel::Warn,
                        &format!("Skipping step '{}': {}", factory_name, e),
                        "pipeline::registry",
                    );
                    continue;
                }
            };

            let name = step.name().to_string();
            if steps.insert(name.clone(), step).is_some() {
                LOGGER.log(
                    LogLevel::Warn,
                    &format!("Step '{}' registered twice, keeping the later one", name),
                    "pipeline::registry",
                );
            }
        }

        LOGGER.log(
            LogLevel::Debug,
            &format!("Registered {} upload steps", steps.len()),
            "pipeline::registry",
        );
        steps
    }

    /// Every step, by ascending priority (ties broken by name)
    pub fn all_steps(&self) -> Vec<Arc<dyn UploadStep>> {
        let mut steps: Vec<_> = self.steps().values().cloned().collect();
        steps.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        steps
    }

    /// Steps that can handle `context`, in execution order
    pub fn applicable_steps(&self, context: &UploadContext) -> Vec<Arc<dyn UploadStep>> {
        self.all_steps()
            .into_iter()
            .filter(|step| step.can_handle(context))
            .collect()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn UploadStep>> {
        self.steps().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.steps().len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps().is_empty()
    }

    /// Declared options of every step, in execution order
    pub fn configuration_schema(&self) -> Vec<StepSchema> {
        self.all_steps()
            .iter()
            .map(|step| StepSchema {
                name: step.name().to_string(),
                description: step.description().to_string(),
                priority: step.priority(),
                options: step.configuration_options(),
            })
            .collect()
    }
}
