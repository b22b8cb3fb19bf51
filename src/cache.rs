//! Content-addressed on-disk embedding cache.
//!
//! Layout: `<root>/<category>/<sha256(text)>.json`, each file holding
//! `{"text": ..., "embedding": [...]}`. Entries are never evicted. A file
//! that cannot be read or parsed is reported as [`CacheLookup::Unreadable`]
//! and treated like a miss: the text is re-embedded and the file rewritten.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::EmbedError;
use crate::fingerprint::fingerprint;

/// Cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Words,
    Sentences,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 2] = [CacheCategory::Words, CacheCategory::Sentences];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Words => "words",
            CacheCategory::Sentences => "sentences",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    text: String,
    embedding: Vec<f32>,
}

/// Result of reading one cache slot.
#[derive(Debug, PartialEq)]
pub enum CacheLookup {
    Hit(Vec<f32>),
    Miss,
    /// The file exists but could not be used; carries the reason.
    Unreadable(String),
}

/// Where a resolved vector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Cache,
    Provider,
}

pub struct EmbeddingCache {
    root: PathBuf,
}

impl EmbeddingCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the slot for `text` under `category`.
    pub fn entry_path(&self, category: CacheCategory, text: &str) -> PathBuf {
        self.root
            .join(category.as_str())
            .join(format!("{}.json", fingerprint(text)))
    }

    pub fn lookup(&self, category: CacheCategory, text: &str) -> CacheLookup {
        let path = self.entry_path(category, text);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheLookup::Miss,
            Err(e) => return CacheLookup::Unreadable(e.to_string()),
        };
        match serde_json::from_str::<CacheFile>(&raw) {
            Ok(file) if file.text == text => CacheLookup::Hit(file.embedding),
            Ok(_) => CacheLookup::Unreadable("stored text does not match key".to_string()),
            Err(e) => CacheLookup::Unreadable(e.to_string()),
        }
    }

    pub fn store(&self, category: CacheCategory, text: &str, vector: &[f32]) -> Result<(), EmbedError> {
        let path = self.entry_path(category, text);
        let io_err = |source: std::io::Error| EmbedError::Cache {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_json::to_vec(&CacheFile {
            text: text.to_string(),
            embedding: vector.to_vec(),
        })
        .map_err(|e| io_err(e.into()))?;
        std::fs::write(&path, body).map_err(io_err)?;
        Ok(())
    }

    /// Return the cached vector for `text`, or embed it with `provider` and
    /// cache the result.
    ///
    /// Vectors whose length differs from the provider's dimensionality are
    /// never cached, and cached vectors of the wrong length are recomputed.
    pub async fn get_or_compute(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
        category: CacheCategory,
    ) -> Result<(Vec<f32>, CacheSource), EmbedError> {
        let expected = provider.is_enabled().then(|| provider.dims());

        match self.lookup(category, text) {
            CacheLookup::Hit(vector) if expected.map_or(true, |d| d == vector.len()) => {
                debug!(%category, "embedding cache hit");
                return Ok((vector, CacheSource::Cache));
            }
            CacheLookup::Hit(vector) => {
                warn!(
                    %category,
                    cached = vector.len(),
                    expected = ?expected,
                    "cached embedding has wrong dimensions, recomputing"
                );
            }
            CacheLookup::Unreadable(reason) => {
                warn!(%category, %reason, "unreadable cache entry, recomputing");
            }
            CacheLookup::Miss => {}
        }

        if !provider.is_enabled() {
            return Err(EmbedError::Disabled);
        }

        let vector = crate::embedding::embed_one(provider, text)
            .await
            .map_err(EmbedError::Provider)?;
        if vector.len() != provider.dims() {
            return Err(EmbedError::DimensionMismatch {
                expected: provider.dims(),
                actual: vector.len(),
            });
        }

        self.store(category, text, &vector)?;
        Ok((vector, CacheSource::Provider))
    }

    /// Number of cached files per category.
    pub fn stats(&self) -> Vec<(CacheCategory, usize)> {
        CacheCategory::ALL
            .iter()
            .map(|&category| {
                let count = std::fs::read_dir(self.root.join(category.as_str()))
                    .map(|entries| {
                        entries
                            .filter_map(|e| e.ok())
                            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                            .count()
                    })
                    .unwrap_or(0);
                (category, count)
            })
            .collect()
    }
}
