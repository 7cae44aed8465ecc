pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod file;
pub mod hash;
pub mod logger;
pub mod pipeline;
pub mod storage;

pub use config::PipelineConfiguration;
pub use error::{StepError, UploadError, UploadResult};
pub use file::{Disk, OwnerId, UploadedFile, Visibility};
pub use pipeline::{Pipeline, StepResult, StepServices, UploadContext, UploadStep};
