use super::{Catalog, FileRecord, NewFileRecord};
use crate::error::UploadResult;
use crate::file::OwnerId;
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

/// Mutex-guarded in-process catalog
///
/// Records are kept in insertion order, so "oldest match" is the first hit.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    records: Mutex<Vec<FileRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FileRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl Catalog for MemoryCatalog {
    fn create(&self, record: NewFileRecord) -> UploadResult<FileRecord> {
        let record = FileRecord::from_new(record, Uuid::new_v4(), Utc::now());
        self.records.lock()?.push(record.clone());
        Ok(record)
    }

    fn find(&self, id: Uuid) -> UploadResult<Option<FileRecord>> {
        Ok(self.records.lock()?.iter().find(|r| r.id == id).cloned())
    }

    fn find_by_hash(
        &self,
        content_hash: &str,
        owner: Option<&OwnerId>,
    ) -> UploadResult<Option<FileRecord>> {
        Ok(self
            .records
            .lock()?
            .iter()
            .filter(|r| r.content_hash.as_deref() == Some(content_hash))
            .find(|r| owner.map_or(true, |owner| &r.owner_id == owner))
            .cloned())
    }

    fn count(&self) -> UploadResult<usize> {
        Ok(self.records.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sample_record;

    #[test]
    fn test_create_and_find() {
        let catalog = MemoryCatalog::new();
        let record = catalog.create(sample_record("u1", "a.jpg", Some("h1"))).unwrap();

        assert_eq!(catalog.count().unwrap(), 1);
        assert_eq!(catalog.find(record.id).unwrap(), Some(record.clone()));
        assert_eq!(record.created_at, record.updated_at);
        assert!(catalog.find(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_find_by_hash_scoping() {
        let catalog = MemoryCatalog::new();
        let first = catalog.create(sample_record("u1", "a.jpg", Some("h1"))).unwrap();
        catalog.create(sample_record("u1", "b.jpg", Some("h1"))).unwrap();
        catalog.create(sample_record("u2", "c.jpg", None)).unwrap();

        let owner1 = OwnerId::new("u1");
        let owner2 = OwnerId::new("u2");
        assert_eq!(catalog.find_by_hash("h1", Some(&owner1)).unwrap().unwrap().id, first.id);
        assert!(catalog.find_by_hash("h1", Some(&owner2)).unwrap().is_none());
        assert_eq!(catalog.find_by_hash("h1", None).unwrap().unwrap().id, first.id);
        assert!(catalog.find_by_hash("missing", None).unwrap().is_none());
    }
}
