use super::{Record, RecordStore, StoreError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};

/// In-memory record store on a lock-free concurrent map.
///
/// Not durable; used for tests and single-process demos.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, Record>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn put(&self, record: Record) -> Result<(), StoreError> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn insert_if_absent(&self, record: Record) -> Result<bool, StoreError> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(true)
            }
        }
    }

    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    fn update(&self, id: &str, changes: Map<String, Value>) -> Result<Record, StoreError> {
        // get_mut holds the shard lock for the whole merge
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.apply(changes);
        Ok(record.clone())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(id).is_some())
    }
}
