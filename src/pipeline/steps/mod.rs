//! Built-in upload steps, in the order they run:
//! 1. ValidateStep (10) - size, MIME type and extension checks
//! 2. DuplicateDetectionStep (25) - content hash lookup in the catalog
//! 3. StoreFileStep (50) - write to a local disk or object storage
//! 4. PersistRecordStep (90) - save the catalog record

pub mod duplicate;
pub mod persist;
pub mod store;
pub mod validate;

pub use duplicate::DuplicateDetectionStep;
pub use persist::PersistRecordStep;
pub use store::StoreFileStep;
pub use validate::ValidateStep;
