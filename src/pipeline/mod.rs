//! Upload processing pipeline
//!
//! An upload is described by an immutable [`UploadContext`]. The
//! [`StepRegistry`] holds the available [`UploadStep`]s, and the [`Pipeline`]
//! runs the ones that apply, in priority order, feeding each step's context
//! and metadata to the next. The first failure or the first successful result
//! without a continuation context ends the run.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use upload_pipeline::catalog::{Catalog, MemoryCatalog};
//! use upload_pipeline::config::{DuplicateAction, PipelineConfiguration};
//! use upload_pipeline::file::{Disk, OwnerId, UploadedFile};
//! use upload_pipeline::pipeline::{Pipeline, StepServices, UploadContext};
//! use upload_pipeline::storage::{MemoryObjectUploader, MemoryStorage};
//!
//! let catalog = Arc::new(MemoryCatalog::new());
//! let services = StepServices::new(
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(MemoryObjectUploader::default()),
//!     catalog.clone(),
//! );
//! let pipeline = Pipeline::builder("uploads", services).default_steps().build();
//!
//! let mut config = PipelineConfiguration::default();
//! config.duplicates.action_on_duplicate = DuplicateAction::Skip;
//!
//! let upload = || {
//!     let file = UploadedFile::from_bytes("cat.png", "image/png", b"png bytes".to_vec());
//!     UploadContext::builder(file, OwnerId::new("user-1"))
//!         .disk(Disk::Public)
//!         .public(true)
//!         .configuration(config.clone())
//!         .build()
//! };
//!
//! let first = pipeline.execute(&upload());
//! let second = pipeline.execute(&upload());
//!
//! assert_eq!(first.record.map(|r| r.id), second.record.map(|r| r.id));
//! assert_eq!(catalog.count().unwrap(), 1);
//! ```

pub mod base;
pub mod context;
pub mod core;
pub mod executor;
pub mod registry;
pub mod steps;

// Re-export main types
pub use context::{Metadata, UploadContext, UploadContextBuilder};
pub use core::{PipelineRun, StepResult, StepTrace, UploadStep};
pub use executor::{Pipeline, PipelineBuilder};
pub use registry::{StepFactory, StepRegistry, StepSchema, StepServices};
