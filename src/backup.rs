//! Snapshot and restore of the `words` and `sentences` collections.
//!
//! A snapshot is a set of files sharing one timestamp:
//!
//! ```text
//! <backup.dir>/words_2024-05-01T10-22-03-117Z.json
//! <backup.dir>/sentences_2024-05-01T10-22-03-117Z.json
//! <backup.dir>/words_2024-05-01T11-00-40-002Z_before-rollback.json
//! ```
//!
//! Each file is a JSON array of full documents. Timestamps are UTC with the
//! `:` and `.` separators replaced, so they are filesystem-safe and sort
//! lexically in time order.
//!
//! Restore always writes a `before-rollback` snapshot of the current state
//! first, then clears both collections (keeping indexes), reloads the
//! selected files, and recreates the standard indexes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::error::BackupError;
use crate::reuse::PriorSnapshot;
use crate::store::{ensure_standard_indexes, Document, DocumentStore, SENTENCES, WORDS};

/// Collections covered by a snapshot, in write order.
pub const SNAPSHOT_COLLECTIONS: [&str; 2] = [WORDS, SENTENCES];

/// Label of the safety snapshot taken before every restore.
pub const BEFORE_ROLLBACK: &str = "before-rollback";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// Filesystem-safe, sortable UTC timestamp, e.g. `2024-05-01T10-22-03-117Z`.
pub fn timestamp_now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Which snapshot to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSelector {
    Timestamp(String),
    /// 1-based position in the newest-first listing.
    Index(usize),
}

impl SnapshotSelector {
    /// A bare integer selects by index, anything else by timestamp.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<usize>() {
            Ok(index) => SnapshotSelector::Index(index),
            Err(_) => SnapshotSelector::Timestamp(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for SnapshotSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSelector::Timestamp(ts) => f.write_str(ts),
            SnapshotSelector::Index(i) => write!(f, "#{}", i),
        }
    }
}

/// Files on disk sharing one timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSet {
    pub timestamp: String,
    pub label: Option<String>,
    /// collection name → file
    pub files: BTreeMap<String, PathBuf>,
}

impl SnapshotSet {
    pub fn covers(&self, collection: &str) -> bool {
        self.files.contains_key(collection)
    }
}

/// A snapshot just written, with the documents it holds.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub timestamp: String,
    pub words: Vec<Document>,
    pub sentences: Vec<Document>,
    pub files: Vec<PathBuf>,
}

impl Snapshot {
    /// Reuse lookup built from the snapshotted documents.
    pub fn prior(&self) -> PriorSnapshot {
        PriorSnapshot::from_documents(&self.words, &self.sentences)
    }
}

#[derive(Debug)]
pub struct RestoreReport {
    pub restored: SnapshotSet,
    pub safety: Snapshot,
    pub words: usize,
    pub sentences: usize,
    pub indexes_created: usize,
}

pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot every non-empty collection. Collections that are missing or
    /// empty produce no file.
    pub async fn snapshot(
        &self,
        store: &dyn DocumentStore,
        label: Option<&str>,
    ) -> Result<Snapshot> {
        self.write_snapshot(store, label, false).await
    }

    async fn write_snapshot(
        &self,
        store: &dyn DocumentStore,
        label: Option<&str>,
        include_empty: bool,
    ) -> Result<Snapshot> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create backup directory: {}", self.dir.display()))?;

        let timestamp = self.fresh_timestamp().await?;
        let label = label.map(sanitize_label);
        let mut snapshot = Snapshot {
            timestamp: timestamp.clone(),
            ..Snapshot::default()
        };

        for collection in SNAPSHOT_COLLECTIONS {
            let docs = store
                .find_all(collection)
                .await
                .with_context(|| format!("Failed to read collection '{}' for backup", collection))?;

            if docs.is_empty() && !include_empty {
                info!(collection, "collection empty, nothing to back up");
            } else {
                let path = self.dir.join(file_name(collection, &timestamp, label.as_deref()));
                let body = serde_json::to_vec_pretty(&docs)?;
                std::fs::write(&path, body)
                    .map_err(|source| BackupError::Io {
                        path: path.clone(),
                        source,
                    })?;
                info!(collection, documents = docs.len(), file = %path.display(), "backup written");
                snapshot.files.push(path);
            }

            if collection == WORDS {
                snapshot.words = docs;
            } else {
                snapshot.sentences = docs;
            }
        }

        Ok(snapshot)
    }

    /// A timestamp not already used by a file in the backup directory.
    async fn fresh_timestamp(&self) -> Result<String> {
        loop {
            let ts = timestamp_now();
            if !self.list()?.iter().any(|set| set.timestamp == ts) {
                return Ok(ts);
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
    }

    /// Snapshots on disk, newest first. A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<SnapshotSet>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(BackupError::Io {
                    path: self.dir.clone(),
                    source,
                }
                .into())
            }
        };

        let mut sets: BTreeMap<String, SnapshotSet> = BTreeMap::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((collection, timestamp, label)) = parse_file_name(name) else {
                continue;
            };
            let set = sets.entry(timestamp.to_string()).or_insert_with(|| SnapshotSet {
                timestamp: timestamp.to_string(),
                label: None,
                files: BTreeMap::new(),
            });
            if set.label.is_none() {
                set.label = label.map(str::to_string);
            }
            set.files.insert(collection.to_string(), path.clone());
        }

        Ok(sets.into_values().rev().collect())
    }

    /// Resolve a selector against the current listing.
    pub fn resolve(&self, selector: &SnapshotSelector) -> Result<SnapshotSet> {
        let sets = self.list()?;
        let found = match selector {
            SnapshotSelector::Timestamp(ts) => sets
                .into_iter()
                .find(|set| &set.timestamp == ts)
                .ok_or_else(|| BackupError::NotFound(ts.clone()))?,
            SnapshotSelector::Index(index) => {
                if sets.is_empty() {
                    return Err(BackupError::NoSnapshots(self.dir.clone()).into());
                }
                let available = sets.len();
                if *index == 0 || *index > available {
                    return Err(BackupError::IndexOutOfRange {
                        index: *index,
                        available,
                    }
                    .into());
                }
                sets.into_iter()
                    .nth(index - 1)
                    .ok_or(BackupError::IndexOutOfRange {
                        index: *index,
                        available,
                    })?
            }
        };
        Ok(found)
    }

    /// Read the documents of `set` for `collection`; an uncovered collection
    /// reads as empty.
    pub fn load(&self, set: &SnapshotSet, collection: &str) -> Result<Vec<Document>> {
        let Some(path) = set.files.get(collection) else {
            return Ok(Vec::new());
        };
        let raw = std::fs::read(path).map_err(|source| BackupError::Io {
            path: path.clone(),
            source,
        })?;
        let docs: Vec<Document> = serde_json::from_slice(&raw).map_err(|source| BackupError::Json {
            path: path.clone(),
            source,
        })?;
        Ok(docs)
    }

    /// Reuse lookup from the snapshot files with the given timestamp.
    pub fn load_prior(&self, timestamp: &str) -> Result<PriorSnapshot> {
        let set = self.resolve(&SnapshotSelector::Timestamp(timestamp.to_string()))?;
        let words = self.load(&set, WORDS)?;
        let sentences = self.load(&set, SENTENCES)?;
        Ok(PriorSnapshot::from_documents(&words, &sentences))
    }

    /// Restore the selected snapshot into `store`.
    ///
    /// The selection is resolved and its files parsed before anything is
    /// written, so a bad selector or an unreadable file leaves the store and
    /// the backup directory untouched.
    pub async fn restore(
        &self,
        store: &dyn DocumentStore,
        selector: &SnapshotSelector,
    ) -> Result<RestoreReport> {
        let set = self.resolve(selector)?;
        let words = self.load(&set, WORDS)?;
        let sentences = self.load(&set, SENTENCES)?;

        let safety = self
            .write_snapshot(store, Some(BEFORE_ROLLBACK), true)
            .await
            .context("Failed to write before-rollback snapshot")?;
        info!(timestamp = %safety.timestamp, "saved current state before restore");

        for (collection, docs) in [(WORDS, &words), (SENTENCES, &sentences)] {
            let removed = store.delete_many(collection).await?;
            if !set.covers(collection) {
                warn!(collection, timestamp = %set.timestamp, "snapshot has no file for collection, leaving it empty");
            }
            if !docs.is_empty() {
                store.insert_many(collection, docs).await?;
            }
            info!(collection, removed, restored = docs.len(), "collection restored");
        }

        let indexes_created = ensure_standard_indexes(store)
            .await
            .context("Failed to recreate indexes after restore")?;

        Ok(RestoreReport {
            restored: set,
            safety,
            words: words.len(),
            sentences: sentences.len(),
            indexes_created,
        })
    }
}

fn file_name(collection: &str, timestamp: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{}_{}_{}.json", collection, timestamp, label),
        None => format!("{}_{}.json", collection, timestamp),
    }
}

/// Split `<collection>_<timestamp>[_<label>].json`.
fn parse_file_name(name: &str) -> Option<(&str, &str, Option<&str>)> {
    let stem = name.strip_suffix(".json")?;
    let (collection, rest) = stem.split_once('_')?;
    if !SNAPSHOT_COLLECTIONS.contains(&collection) {
        return None;
    }
    let (timestamp, label) = match rest.split_once('_') {
        Some((ts, label)) => (ts, Some(label)),
        None => (rest, None),
    };
    if !timestamp.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some((collection, timestamp, label))
}

/// Labels become part of a file name; keep them to `[A-Za-z0-9-]`.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, IndexSpec};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn timestamps_are_filesystem_safe() {
        let ts = timestamp_now();
        assert_eq!(ts.len(), "2024-05-01T10-22-03-117Z".len());
        assert!(!ts.contains(':') && !ts.contains('.') && !ts.contains('_'));
    }

    #[test]
    fn file_names_round_trip_through_parser() {
        let ts = "2024-05-01T10-22-03-117Z";
        assert_eq!(
            parse_file_name(&file_name("words", ts, None)),
            Some(("words", ts, None))
        );
        assert_eq!(
            parse_file_name(&file_name("sentences", ts, Some(BEFORE_ROLLBACK))),
            Some(("sentences", ts, Some(BEFORE_ROLLBACK)))
        );
        assert_eq!(parse_file_name("notes_2024.json"), None);
        assert_eq!(parse_file_name("words_latest.json"), None);
        assert_eq!(parse_file_name("words_2024.txt"), None);
    }

    #[test]
    fn selector_parsing() {
        assert_eq!(SnapshotSelector::parse("2"), SnapshotSelector::Index(2));
        assert_eq!(
            SnapshotSelector::parse("2024-05-01T10-22-03-117Z"),
            SnapshotSelector::Timestamp("2024-05-01T10-22-03-117Z".into())
        );
    }

    #[test]
    fn labels_are_sanitized() {
        assert_eq!(sanitize_label("pre release/v2"), "pre-release-v2");
    }

    #[tokio::test]
    async fn empty_collections_produce_no_files() {
        let tmp = TempDir::new().unwrap();
        let manager = BackupManager::new(tmp.path().join("backups"));
        let store = InMemoryStore::new();
        let snapshot = manager.snapshot(&store, None).await.unwrap();
        assert!(snapshot.files.is_empty());
        assert!(manager.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_groups_by_timestamp_newest_first() {
        let tmp = TempDir::new().unwrap();
        let manager = BackupManager::new(tmp.path());
        let store = InMemoryStore::new();
        store.insert_many(WORDS, &[json!({"id": "w1"})]).await.unwrap();

        let first = manager.snapshot(&store, None).await.unwrap();
        store.insert_many(SENTENCES, &[json!({"id": "s1"})]).await.unwrap();
        let second = manager.snapshot(&store, Some("manual")).await.unwrap();

        let sets = manager.list().unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].timestamp, second.timestamp);
        assert_eq!(sets[0].label.as_deref(), Some("manual"));
        assert!(sets[0].covers(WORDS) && sets[0].covers(SENTENCES));
        assert_eq!(sets[1].timestamp, first.timestamp);
        assert!(sets[1].covers(WORDS) && !sets[1].covers(SENTENCES));

        let by_index = manager.resolve(&SnapshotSelector::Index(2)).unwrap();
        assert_eq!(by_index.timestamp, first.timestamp);
    }

    #[tokio::test]
    async fn bad_selectors_are_typed_errors() {
        let tmp = TempDir::new().unwrap();
        let manager = BackupManager::new(tmp.path());
        let err = manager.resolve(&SnapshotSelector::Index(1)).unwrap_err();
        assert!(matches!(err.downcast_ref::<BackupError>(), Some(BackupError::NoSnapshots(_))));

        let store = InMemoryStore::new();
        store.insert_many(WORDS, &[json!({"id": "w1"})]).await.unwrap();
        manager.snapshot(&store, None).await.unwrap();

        let err = manager.resolve(&SnapshotSelector::Index(3)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackupError>(),
            Some(BackupError::IndexOutOfRange { index: 3, available: 1 })
        ));
        let err = manager
            .resolve(&SnapshotSelector::Timestamp("1999-01-01T00-00-00-000Z".into()))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BackupError>(), Some(BackupError::NotFound(_))));
    }

    #[tokio::test]
    async fn restore_tolerates_existing_indexes() {
        let tmp = TempDir::new().unwrap();
        let manager = BackupManager::new(tmp.path());
        let store = InMemoryStore::new();
        store.insert_many(WORDS, &[json!({"id": "w1"})]).await.unwrap();
        store.create_index(&IndexSpec::new(WORDS, "id", true)).await.unwrap();
        let snapshot = manager.snapshot(&store, None).await.unwrap();

        let report = manager
            .restore(&store, &SnapshotSelector::Timestamp(snapshot.timestamp.clone()))
            .await
            .unwrap();
        assert_eq!(report.words, 1);
        assert_eq!(report.indexes_created, 5);
        assert_eq!(store.find_all(WORDS).await.unwrap(), vec![json!({"id": "w1"})]);
    }

    #[tokio::test]
    async fn corrupt_snapshot_file_aborts_before_mutation() {
        let tmp = TempDir::new().unwrap();
        let manager = BackupManager::new(tmp.path());
        std::fs::write(tmp.path().join("words_2024-01-01T00-00-00-000Z.json"), b"{oops").unwrap();

        let store = InMemoryStore::new();
        store.insert_many(WORDS, &[json!({"id": "live"})]).await.unwrap();
        let err = manager
            .restore(&store, &SnapshotSelector::Index(1))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BackupError>(), Some(BackupError::Json { .. })));
        assert_eq!(store.count(WORDS).await.unwrap(), 1);
        assert_eq!(manager.list().unwrap().len(), 1);
    }
}
