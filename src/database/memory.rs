//! In-memory repository used by tests.
use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::{Entity, Field, Repository, StoreError};

/// Map-backed repository enforcing the same uniqueness as the schema.
#[derive(Debug)]
pub struct MemoryRepository<E> {
    records: Mutex<BTreeMap<String, E>>,
}

impl<E> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<E: Entity> MemoryRepository<E> {
    pub fn with(records: impl IntoIterator<Item = E>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|r| (r.id().to_owned(), r))
                    .collect(),
            ),
        }
    }

    /// Every record, keyed by id.
    pub fn snapshot(&self) -> BTreeMap<String, E> {
        self.records.lock().unwrap().clone()
    }

    fn violates(records: &BTreeMap<String, E>, record: &E) -> Option<Field> {
        E::UNIQUE_FIELDS.iter().copied().find(|field| {
            let value = record.field(*field).unwrap_or_default();
            !value.is_empty()
                && records.values().any(|other| {
                    other.id() != record.id()
                        && other.field(*field) == Some(value)
                })
        })
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    async fn insert(&self, record: &E) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(record.id()) {
            return Err(StoreError::Conflict { field: Field::Id });
        }
        if let Some(field) = Self::violates(&records, record) {
            return Err(StoreError::Conflict { field });
        }
        records.insert(record.id().to_owned(), record.clone());
        Ok(())
    }

    async fn find_by_field(
        &self,
        field: Field,
        value: &str,
    ) -> Result<Option<E>, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .find(|r| r.field(field) == Some(value))
            .cloned())
    }

    async fn update(&self, record: &E) -> Result<bool, StoreError> {
        let mut records = self.records.lock().unwrap();
        if let Some(field) = Self::violates(&records, record) {
            return Err(StoreError::Conflict { field });
        }
        match records.get_mut(record.id()) {
            Some(current) => {
                *current = record.clone();
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().unwrap().remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<E>, StoreError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }
}
