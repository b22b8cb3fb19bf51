//! Document-store abstraction.
//!
//! The [`DocumentStore`] trait is the narrow set of collection operations the
//! pipeline needs: bulk insert, full scans, single-field lookup, upsert by
//! `id`, clear, drop, and single-field index creation. Documents are plain
//! JSON objects.
//!
//! Two backends:
//! - [`SqliteStore`](sqlite::SqliteStore) — one SQLite file per database name,
//!   one table of JSON bodies per collection.
//! - [`InMemoryStore`](memory::InMemoryStore) — for tests and dry runs against a missing database.
//!
//! Stores are constructed by the caller and passed by reference; nothing in
//! this crate holds a global connection.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

pub const WORDS: &str = "words";
pub const SENTENCES: &str = "sentences";
pub const METADATA: &str = "metadata";

/// A stored document.
pub type Document = Value;

/// Outcome of dropping a collection. A missing collection is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped,
    Missing,
}

/// Outcome of creating an index. An index that already exists is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    AlreadyExists,
}

/// Ascending single-field index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub collection: String,
    pub field: String,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(collection: &str, field: &str, unique: bool) -> Self {
        Self {
            collection: collection.to_string(),
            field: field.to_string(),
            unique,
        }
    }

    /// Stable index name, e.g. `idx_words_lexicalForm`.
    pub fn name(&self) -> String {
        format!("idx_{}_{}", self.collection, self.field.replace('.', "_"))
    }
}

/// The indexes every populated database carries.
pub fn standard_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::new(WORDS, "id", true),
        IndexSpec::new(WORDS, "lexicalForm", false),
        IndexSpec::new(WORDS, "dateModified", false),
        IndexSpec::new(SENTENCES, "id", true),
        IndexSpec::new(SENTENCES, "text", false),
        IndexSpec::new(SENTENCES, "sourceEntryIds", false),
    ]
}

/// Collection names are plain identifiers.
pub(crate) fn validate_collection(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Field paths are dot-separated identifiers.
pub(crate) fn validate_field(field: &str) -> Result<(), StoreError> {
    let valid = !field.is_empty()
        && field
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(field.to_string()))
    }
}

/// Abstract document store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_many`](DocumentStore::insert_many) | Append documents |
/// | [`find_all`](DocumentStore::find_all) | Every document, insertion order |
/// | [`find_by`](DocumentStore::find_by) | Documents whose string field equals a value |
/// | [`count`](DocumentStore::count) | Number of documents |
/// | [`update_one_upsert`](DocumentStore::update_one_upsert) | Replace by `id`, insert if absent |
/// | [`delete_many`](DocumentStore::delete_many) | Remove all documents, keep indexes |
/// | [`drop_collection`](DocumentStore::drop_collection) | Remove documents and indexes |
/// | [`create_index`](DocumentStore::create_index) | Single-field ascending index |
///
/// Reads of a collection that does not exist return nothing rather than failing.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert documents; returns the number inserted.
    async fn insert_many(&self, collection: &str, docs: &[Document]) -> Result<usize, StoreError>;

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    async fn find_by(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: &str) -> Result<u64, StoreError>;

    /// Replace the document whose `id` equals `id`, or insert `doc` if none does.
    async fn update_one_upsert(
        &self,
        collection: &str,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError>;

    /// Delete every document; returns the number removed.
    async fn delete_many(&self, collection: &str) -> Result<u64, StoreError>;

    async fn drop_collection(&self, collection: &str) -> Result<DropOutcome, StoreError>;

    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexOutcome, StoreError>;
}

/// Create every standard index, treating "already exists" as success.
///
/// Returns the number of indexes newly created. Any other failure is returned.
pub async fn ensure_standard_indexes(store: &dyn DocumentStore) -> Result<usize, StoreError> {
    let mut created = 0;
    for spec in standard_indexes() {
        match store.create_index(&spec).await? {
            IndexOutcome::Created => created += 1,
            IndexOutcome::AlreadyExists => {
                tracing::debug!(index = %spec.name(), "index already exists");
            }
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_names_are_stable() {
        assert_eq!(IndexSpec::new(WORDS, "lexicalForm", false).name(), "idx_words_lexicalForm");
        assert_eq!(IndexSpec::new(WORDS, "senses.gloss", false).name(), "idx_words_senses_gloss");
    }

    #[test]
    fn name_validation() {
        assert!(validate_collection("words").is_ok());
        assert!(validate_collection("words; DROP TABLE x").is_err());
        assert!(validate_collection("1words").is_err());
        assert!(validate_field("senses.gloss").is_ok());
        assert!(validate_field("a..b").is_err());
        assert!(validate_field("a'b").is_err());
    }
}
