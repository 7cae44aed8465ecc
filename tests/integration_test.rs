use std::sync::Arc;
use tempfile::TempDir;
use upload_pipeline::catalog::{Catalog, MemoryCatalog, SqliteCatalog};
use upload_pipeline::config::{DuplicateAction, PipelineConfiguration};
use upload_pipeline::events::{CollectingProgressSink, UploadPhase};
use upload_pipeline::file::{Disk, OwnerId, UploadedFile, Visibility};
use upload_pipeline::pipeline::steps::{PersistRecordStep, StoreFileStep};
use upload_pipeline::pipeline::{Pipeline, StepServices, UploadContext};
use upload_pipeline::storage::{LocalStorage, MemoryObjectUploader, MemoryStorage, StorageBackend};
use upload_pipeline::StepError;
use url::Url;

const MB: usize = 1024 * 1024;

struct Harness {
    storage: Arc<MemoryStorage>,
    catalog: Arc<MemoryCatalog>,
    sink: Arc<CollectingProgressSink>,
    pipeline: Pipeline,
}

fn harness() -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let sink = Arc::new(CollectingProgressSink::new());
    let uploader = Arc::new(MemoryObjectUploader::new(sink.clone()).with_chunk_size(MB));
    let services = StepServices::new(storage.clone(), uploader, catalog.clone());

    Harness {
        storage,
        catalog,
        sink,
        pipeline: Pipeline::builder("uploads", services)
            .default_steps()
            .build(),
    }
}

fn image_upload(config: PipelineConfiguration) -> UploadContext {
    let file = UploadedFile::from_bytes("photo.jpg", "image/jpeg", b"the same jpeg bytes".to_vec());
    UploadContext::builder(file, OwnerId::new("user-1"))
        .disk(Disk::Public)
        .public(true)
        .configuration(config)
        .build()
}

fn with_action(action: DuplicateAction) -> PipelineConfiguration {
    let mut config = PipelineConfiguration::default();
    config.duplicates.action_on_duplicate = action;
    config
}

/// 2 MB JPEG onto a local disk with a randomized name, end to end
#[test]
fn test_local_upload_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(
        LocalStorage::new(temp_dir.path(), "https://cdn.example.com/files", b"secret".to_vec())
            .unwrap(),
    );
    let catalog = Arc::new(MemoryCatalog::new());
    let services = StepServices::new(
        storage.clone(),
        Arc::new(MemoryObjectUploader::default()),
        catalog.clone(),
    );
    let pipeline = Pipeline::builder("uploads", services).default_steps().build();

    let file = UploadedFile::from_bytes("Summer Photo.jpg", "image/jpeg", vec![0xFFu8; 2 * MB]);
    let context = UploadContext::builder(file, OwnerId::new("user-1"))
        .disk(Disk::Local)
        .allowed_mime_types(["image/jpeg", "image/png"])
        .session_id("session-1")
        .build();

    let run = pipeline.execute_with_report(&context);
    let result = run.outcome;
    assert!(result.success, "{}", result.message);
    assert!(result.errors.is_empty());
    assert_eq!(
        run.steps.iter().map(|s| s.step_name.as_str()).collect::<Vec<_>>(),
        vec!["validate_file", "duplicate_detection", "process_file", "save_to_database"]
    );

    let record = result.record.unwrap();
    assert_ne!(record.name, "Summer Photo.jpg");
    assert!(record.name.ends_with(".jpg"));
    assert_eq!(record.original_name, "Summer Photo.jpg");
    assert_eq!(record.size, (2 * MB) as u64);
    assert_eq!(record.visibility, Visibility::Private);
    assert!(record.content_hash.is_some());
    assert_eq!(catalog.count().unwrap(), 1);

    // The bytes are on disk under the record's path
    let on_disk = storage.full_path(Disk::Local, &record.path).unwrap();
    assert_eq!(std::fs::metadata(on_disk).unwrap().len(), (2 * MB) as u64);

    // Private files get a signed URL that verifies
    let url = Url::parse(result.url.as_deref().unwrap()).unwrap();
    let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
    let expires: i64 = query["expires"].parse().unwrap();
    assert!(storage.verify_signature(Disk::Local, &record.path, expires, &query["signature"]));
    assert!(!storage.verify_signature(Disk::Local, "uploads/other.jpg", expires, &query["signature"]));
}

/// 10 MB PDF against a 5 MB image-only policy fails with every violation
#[test]
fn test_validation_failure_reports_all_errors() {
    let h = harness();
    let file = UploadedFile::from_bytes("report.pdf", "application/pdf", vec![0u8; 10 * MB]);
    let context = UploadContext::builder(file, OwnerId::new("user-1"))
        .max_size_bytes((5 * MB) as u64)
        .allowed_mime_types(["image/jpeg", "image/png"])
        .build();

    let run = h.pipeline.execute_with_report(&context);
    assert!(!run.outcome.success);
    assert_eq!(run.outcome.message, "File validation failed");
    assert_eq!(run.outcome.errors.len(), 3);
    assert!(run.outcome.record.is_none());
    assert_eq!(run.executed_steps(), 1);
    assert_eq!(run.failed_step().unwrap().step_name, "validate_file");
    assert_eq!(h.catalog.count().unwrap(), 0);
    assert!(h.storage.is_empty());
}

#[test]
fn test_duplicate_is_rejected() {
    let h = harness();
    let first = h.pipeline.execute(&image_upload(with_action(DuplicateAction::Reject)));
    let first = first.record.unwrap();

    let second = h.pipeline.execute(&image_upload(with_action(DuplicateAction::Reject)));
    assert!(!second.success);
    assert_eq!(second.message, "This file has already been uploaded");
    match &second.errors[..] {
        [StepError::DuplicateDetected {
            record_id,
            filename,
            url,
            ..
        }] => {
            assert_eq!(*record_id, first.id);
            assert_eq!(filename, &first.name);
            assert_eq!(url.as_deref(), Some(h.storage.url(Disk::Public, &first.path).unwrap().as_str()));
        }
        other => panic!("unexpected errors: {:?}", other),
    }
    assert_eq!(h.catalog.count().unwrap(), 1);
    assert_eq!(h.storage.len(), 1);
}

#[test]
fn test_duplicate_skip_returns_existing_record() {
    let h = harness();
    let first = h.pipeline.execute(&image_upload(with_action(DuplicateAction::Skip)));
    let second = h.pipeline.execute(&image_upload(with_action(DuplicateAction::Skip)));

    assert!(second.success);
    assert_eq!(second.record, first.record);
    assert_eq!(second.path, first.path);
    assert_eq!(h.catalog.count().unwrap(), 1);
    assert_eq!(h.storage.len(), 1);
}

#[test]
fn test_duplicate_rename_stores_a_copy() {
    let h = harness();
    let first = h
        .pipeline
        .execute(&image_upload(with_action(DuplicateAction::Rename)))
        .record
        .unwrap();
    let second = h
        .pipeline
        .execute(&image_upload(with_action(DuplicateAction::Rename)))
        .record
        .unwrap();
    let third = h
        .pipeline
        .execute(&image_upload(with_action(DuplicateAction::Rename)))
        .record
        .unwrap();

    assert_ne!(first.id, second.id);
    assert!(second.name.starts_with("photo_copy_"));
    assert!(second.name.ends_with(".jpg"));
    assert_eq!(first.content_hash, second.content_hash);

    // Copies made within the same second still get their own artifact
    assert_ne!(second.path, third.path);
    assert_eq!(second.content_hash, third.content_hash);
    assert_eq!(h.catalog.count().unwrap(), 3);
    assert_eq!(h.storage.len(), 3);
}

#[test]
fn test_disabled_store_step_leaves_persist_without_metadata() {
    let h = harness();
    let config = PipelineConfiguration::default().disable_step(StoreFileStep::NAME);
    let result = h.pipeline.execute(&image_upload(config.clone()));

    assert!(!result.success);
    assert_eq!(result.message, "Missing required file information");
    assert_eq!(
        result.errors,
        vec![StepError::MissingMetadata {
            keys: vec!["stored_path".to_string(), "filename".to_string(), "url".to_string()],
        }]
    );
    assert!(h.storage.is_empty());
    assert_eq!(h.catalog.count().unwrap(), 0);

    // With persistence off as well the chain ends on the last continuation
    let result = h
        .pipeline
        .execute(&image_upload(config.disable_step(PersistRecordStep::NAME)));
    assert!(result.success);
    assert!(result.should_continue());
    assert!(result.record.is_none());
    assert!(result.context.unwrap().get_metadata("file_hash").is_some());
}

#[test]
fn test_object_storage_upload_publishes_progress() {
    let h = harness();
    let file = UploadedFile::from_bytes("big.png", "image/png", vec![1u8; 3 * MB]);
    let context = UploadContext::builder(file, OwnerId::new("user-7"))
        .disk(Disk::S3)
        .public(true)
        .randomize_filename(false)
        .session_id("abc")
        .build();

    let result = h.pipeline.execute(&context);
    assert!(result.success, "{}", result.message);
    let record = result.record.unwrap();
    assert_eq!(record.disk, Disk::S3);
    assert_eq!(record.name, "big.png");
    assert_eq!(result.url.as_deref(), Some("https://objects.test/s3/uploads/big.png"));

    let events = h.sink.events_for(&OwnerId::new("user-7"), Some("abc"));
    assert!(events.iter().all(|e| e.channel() == "uploads.user-7.abc"));
    let uploading: Vec<_> = events
        .iter()
        .filter(|e| e.phase == UploadPhase::Uploading)
        .collect();
    assert_eq!(uploading.len(), 3);
    assert_eq!(uploading.last().unwrap().bytes_uploaded, (3 * MB) as u64);
    assert_eq!(events.last().unwrap().phase, UploadPhase::Completed);
    assert_eq!(events.last().unwrap().percentage, 100.0);
}

#[test]
fn test_json_configuration_drives_pipeline() {
    let h = harness();
    let config = PipelineConfiguration::from_json_str(
        r#"{ "disabled_steps": ["duplicate_detection"], "store": { "randomize_filename": false } }"#,
    )
    .unwrap();

    let first = h.pipeline.execute(&image_upload(config.clone())).record.unwrap();
    let second = h.pipeline.execute(&image_upload(config)).record.unwrap();

    // Without duplicate detection the same name is simply written again
    assert_eq!(first.name, "photo.jpg");
    assert_eq!(second.name, "photo.jpg");
    assert!(first.content_hash.is_none());
    assert_eq!(h.catalog.count().unwrap(), 2);
}

#[test]
fn test_sqlite_catalog_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("catalog.db");
    let source_path = temp_dir.path().join("scan.png");
    std::fs::write(&source_path, vec![9u8; 4096]).unwrap();

    let record_id = {
        let catalog = Arc::new(SqliteCatalog::open(&db_path).unwrap());
        let services = StepServices::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryObjectUploader::default()),
            catalog.clone(),
        );
        let pipeline = Pipeline::builder("uploads", services).default_steps().build();

        let file = UploadedFile::from_path(&source_path, "image/png").unwrap();
        let context = UploadContext::builder(file, OwnerId::new("user-1"))
            .metadata("width", 64.into())
            .metadata("height", 32.into())
            .build();

        let result = pipeline.execute(&context);
        assert!(result.success, "{}", result.message);

        // A second identical upload is caught through the SQLite hash lookup
        let file = UploadedFile::from_path(&source_path, "image/png").unwrap();
        let again = pipeline.execute(&UploadContext::builder(file, OwnerId::new("user-1")).build());
        assert!(!again.success);

        result.record.unwrap().id
    };

    let catalog = SqliteCatalog::open(&db_path).unwrap();
    let record = catalog.find(record_id).unwrap().unwrap();
    assert_eq!(record.original_name, "scan.png");
    assert_eq!(record.size, 4096);
    assert_eq!(record.width, Some(64));
    assert_eq!(record.height, Some(32));
    assert_eq!(catalog.count().unwrap(), 1);
}
