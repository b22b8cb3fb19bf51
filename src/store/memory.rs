//! In-memory [`DocumentStore`] for tests.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Unique indexes
//! are recorded but not enforced.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::StoreError;

use super::{
    validate_collection, validate_field, Document, DocumentStore, DropOutcome, IndexOutcome,
    IndexSpec,
};

#[derive(Default)]
struct Collection {
    docs: Vec<Document>,
    indexes: HashSet<String>,
}

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Collection>> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Collection>> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Names of the indexes on `collection`, sorted.
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .get(collection)
            .map(|c| c.indexes.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn field_str<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    field
        .split('.')
        .try_fold(doc, |cur, key| cur.get(key))
        .and_then(|v| v.as_str())
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_many(&self, collection: &str, docs: &[Document]) -> Result<usize, StoreError> {
        validate_collection(collection)?;
        self.write()
            .entry(collection.to_string())
            .or_default()
            .docs
            .extend(docs.iter().cloned());
        Ok(docs.len())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        validate_collection(collection)?;
        Ok(self
            .read()
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default())
    }

    async fn find_by(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        validate_collection(collection)?;
        validate_field(field)?;
        Ok(self
            .read()
            .get(collection)
            .map(|c| {
                c.docs
                    .iter()
                    .filter(|d| field_str(d, field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        validate_collection(collection)?;
        Ok(self
            .read()
            .get(collection)
            .map(|c| c.docs.len() as u64)
            .unwrap_or(0))
    }

    async fn update_one_upsert(
        &self,
        collection: &str,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        validate_collection(collection)?;
        let mut guard = self.write();
        let coll = guard.entry(collection.to_string()).or_default();
        match coll.docs.iter().position(|d| field_str(d, "id") == Some(id)) {
            Some(i) => coll.docs[i] = doc.clone(),
            None => coll.docs.push(doc.clone()),
        }
        Ok(())
    }

    async fn delete_many(&self, collection: &str) -> Result<u64, StoreError> {
        validate_collection(collection)?;
        Ok(self
            .write()
            .get_mut(collection)
            .map(|c| std::mem::take(&mut c.docs).len() as u64)
            .unwrap_or(0))
    }

    async fn drop_collection(&self, collection: &str) -> Result<DropOutcome, StoreError> {
        validate_collection(collection)?;
        Ok(match self.write().remove(collection) {
            Some(_) => DropOutcome::Dropped,
            None => DropOutcome::Missing,
        })
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexOutcome, StoreError> {
        validate_collection(&spec.collection)?;
        validate_field(&spec.field)?;
        let mut guard = self.write();
        let coll = guard.entry(spec.collection.clone()).or_default();
        Ok(if coll.indexes.insert(spec.name()) {
            IndexOutcome::Created
        } else {
            IndexOutcome::AlreadyExists
        })
    }
}
