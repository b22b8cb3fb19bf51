//! Embedding reuse across ingestion runs.
//!
//! A [`PriorSnapshot`] holds the word and sentence documents from an earlier
//! state of the database (a backup taken just before the drop, another
//! database, or a snapshot on disk). The [`ReuseResolver`] decides per record
//! whether the prior embedding still applies:
//!
//! - **words**: same `id`, prior embedding present, and identical
//!   `dateModified`;
//! - **sentences**: same `id` and prior embedding present. The id is the
//!   fingerprint of the text, so equal ids already mean equal text.
//!
//! Anything else goes through the [`EmbeddingCache`]. A provider failure is
//! logged against the record and leaves it without an embedding.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::cache::{CacheCategory, CacheSource, EmbeddingCache};
use crate::embedding::EmbeddingProvider;
use crate::models::{Entry, PackedEmbedding, SentenceDocument, WordDocument};
use crate::store::Document;

/// Prior word and sentence documents, keyed by id.
#[derive(Debug, Default)]
pub struct PriorSnapshot {
    words: HashMap<String, WordDocument>,
    sentences: HashMap<String, SentenceDocument>,
}

impl PriorSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build lookups from raw documents. Documents that do not decode or have
    /// no id are skipped.
    pub fn from_documents(words: &[Document], sentences: &[Document]) -> Self {
        let mut snapshot = Self::default();
        for doc in words {
            match serde_json::from_value::<WordDocument>(doc.clone()) {
                Ok(word) => {
                    if let Some(id) = word.entry.id.clone() {
                        snapshot.words.insert(id, word);
                    }
                }
                Err(e) => warn!(error = %e, "skipping undecodable prior word document"),
            }
        }
        for doc in sentences {
            match serde_json::from_value::<SentenceDocument>(doc.clone()) {
                Ok(sentence) => {
                    snapshot.sentences.insert(sentence.id.clone(), sentence);
                }
                Err(e) => warn!(error = %e, "skipping undecodable prior sentence document"),
            }
        }
        snapshot
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.sentences.is_empty()
    }

    /// Prior embedding for `entry` if it is still valid.
    ///
    /// `dateModified` must be identical on both sides; absent on both counts
    /// as identical.
    pub fn reusable_word(&self, entry: &Entry) -> Option<&PackedEmbedding> {
        let id = entry.id.as_deref()?;
        let prior = self.words.get(id)?;
        if prior.entry.date_modified != entry.date_modified {
            return None;
        }
        prior.embedding.as_ref()
    }

    /// Prior embedding for `sentence` if one exists.
    pub fn reusable_sentence(&self, sentence: &SentenceDocument) -> Option<&PackedEmbedding> {
        self.sentences.get(&sentence.id)?.embedding.as_ref()
    }
}

/// Running counters for one upload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReuseStats {
    /// Carried forward from the prior snapshot.
    pub reused: u64,
    /// Served from the on-disk cache.
    pub cached: u64,
    /// Newly computed by the provider.
    pub computed: u64,
    /// Left without an embedding.
    pub failed: u64,
}

pub struct ReuseResolver<'a> {
    prior: &'a PriorSnapshot,
    cache: &'a EmbeddingCache,
    provider: &'a dyn EmbeddingProvider,
    stats: ReuseStats,
}

impl<'a> ReuseResolver<'a> {
    pub fn new(
        prior: &'a PriorSnapshot,
        cache: &'a EmbeddingCache,
        provider: &'a dyn EmbeddingProvider,
    ) -> Self {
        Self {
            prior,
            cache,
            provider,
            stats: ReuseStats::default(),
        }
    }

    pub fn stats(&self) -> ReuseStats {
        self.stats
    }

    pub async fn resolve_word(&mut self, entry: &Entry) -> Option<PackedEmbedding> {
        if let Some(packed) = self.prior.reusable_word(entry) {
            debug!(entry_id = ?entry.id, "reusing prior word embedding");
            self.stats.reused += 1;
            return Some(packed.clone());
        }
        let record = entry.id.as_deref().unwrap_or("<no id>");
        self.compute(&entry.text_to_embed(), CacheCategory::Words, record)
            .await
    }

    pub async fn resolve_sentence(&mut self, sentence: &SentenceDocument) -> Option<PackedEmbedding> {
        if let Some(packed) = self.prior.reusable_sentence(sentence) {
            debug!(sentence_id = %sentence.id, "reusing prior sentence embedding");
            self.stats.reused += 1;
            return Some(packed.clone());
        }
        self.compute(&sentence.text_to_embed(), CacheCategory::Sentences, &sentence.id)
            .await
    }

    async fn compute(
        &mut self,
        text: &str,
        category: CacheCategory,
        record: &str,
    ) -> Option<PackedEmbedding> {
        match self.cache.get_or_compute(self.provider, text, category).await {
            Ok((vector, source)) => {
                match source {
                    CacheSource::Cache => self.stats.cached += 1,
                    CacheSource::Provider => self.stats.computed += 1,
                }
                Some(PackedEmbedding::pack(&vector))
            }
            Err(e) => {
                let e = anyhow::Error::new(e);
                warn!(%category, record, error = format!("{:#}", e), "embedding failed, storing record without one");
                self.stats.failed += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingProvider;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(id: &str, modified: &str) -> Entry {
        Entry {
            id: Some(id.to_string()),
            date_created: None,
            date_modified: Some(modified.to_string()),
            guid: None,
            lexical_form: Some(format!("form-{}", id)),
            traits: Default::default(),
            senses: Vec::new(),
        }
    }

    fn prior_word(id: &str, modified: &str, embedding: Option<&PackedEmbedding>) -> Document {
        serde_json::to_value(WordDocument {
            entry: entry(id, modified),
            embedding: embedding.cloned(),
            created_at: None,
            updated_at: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn unchanged_word_reuses_without_provider_or_cache() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path());
        let provider = CountingProvider::new(4);
        let packed = PackedEmbedding::pack(&[9.0, 8.0, 7.0, 6.0]);
        let prior = PriorSnapshot::from_documents(&[prior_word("a", "2024-01-01", Some(&packed))], &[]);

        let mut resolver = ReuseResolver::new(&prior, &cache, &provider);
        let got = resolver.resolve_word(&entry("a", "2024-01-01")).await;
        assert_eq!(got.as_ref().map(PackedEmbedding::as_bytes), Some(packed.as_bytes()));
        assert_eq!(provider.calls(), 0);
        assert_eq!(cache.stats()[0].1, 0);
        assert_eq!(resolver.stats().reused, 1);
    }

    #[tokio::test]
    async fn changed_timestamp_forces_recompute() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path());
        let provider = CountingProvider::new(4);
        let packed = PackedEmbedding::pack(&[9.0, 8.0, 7.0, 6.0]);
        let prior = PriorSnapshot::from_documents(&[prior_word("a", "2024-01-01", Some(&packed))], &[]);

        let mut resolver = ReuseResolver::new(&prior, &cache, &provider);
        let got = resolver.resolve_word(&entry("a", "2024-02-01")).await.unwrap();
        assert_eq!(provider.calls(), 1);
        assert_ne!(got, packed);
        assert_eq!(resolver.stats().computed, 1);
    }

    #[tokio::test]
    async fn missing_timestamp_on_both_sides_reuses() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path());
        let provider = CountingProvider::new(4);
        let packed = PackedEmbedding::pack(&[1.0, 2.0, 3.0, 4.0]);
        let mut undated = entry("a", "unused");
        undated.date_modified = None;
        let doc = serde_json::to_value(WordDocument {
            entry: undated.clone(),
            embedding: Some(packed.clone()),
            created_at: None,
            updated_at: None,
        })
        .unwrap();
        let prior = PriorSnapshot::from_documents(&[doc], &[]);

        let mut resolver = ReuseResolver::new(&prior, &cache, &provider);
        let got = resolver.resolve_word(&undated).await;
        assert_eq!(got, Some(packed));
        assert_eq!(provider.calls(), 0);
        assert_eq!(resolver.stats().reused, 1);

        // Dated on one side only is a change.
        let mut resolver = ReuseResolver::new(&prior, &cache, &provider);
        resolver.resolve_word(&entry("a", "2024-01-01")).await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(resolver.stats().reused, 0);
    }

    #[tokio::test]
    async fn prior_without_embedding_is_not_reused() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path());
        let provider = CountingProvider::new(4);
        let prior = PriorSnapshot::from_documents(&[prior_word("a", "2024-01-01", None)], &[]);

        let mut resolver = ReuseResolver::new(&prior, &cache, &provider);
        assert!(resolver.resolve_word(&entry("a", "2024-01-01")).await.is_some());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn sentence_reuse_keys_on_id_only() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path());
        let provider = CountingProvider::new(4);
        let packed = PackedEmbedding::pack(&[1.0, 1.0, 1.0, 1.0]);
        let prior_sentence = json!({
            "id": "abc",
            "text": "old",
            "translation": "different translation",
            "sourceEntryIds": ["x"],
            "source": null,
            "embedding": serde_json::to_value(&packed).unwrap(),
            "createdAt": null,
            "updatedAt": null
        });
        let prior = PriorSnapshot::from_documents(&[], &[prior_sentence]);
        let sentence = SentenceDocument {
            id: "abc".into(),
            text: "old".into(),
            translation: Some("new translation".into()),
            source_entry_ids: vec!["y".into()],
            source: None,
            embedding: None,
            created_at: None,
            updated_at: None,
        };

        let mut resolver = ReuseResolver::new(&prior, &cache, &provider);
        assert_eq!(resolver.resolve_sentence(&sentence).await, Some(packed));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn provider_failure_is_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path());
        let provider = CountingProvider::new(4).failing_on("form-bad");
        let prior = PriorSnapshot::empty();

        let mut resolver = ReuseResolver::new(&prior, &cache, &provider);
        assert!(resolver.resolve_word(&entry("bad", "t")).await.is_none());
        assert!(resolver.resolve_word(&entry("good", "t")).await.is_some());
        assert_eq!(
            resolver.stats(),
            ReuseStats {
                reused: 0,
                cached: 0,
                computed: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn undecodable_prior_documents_are_skipped() {
        let prior = PriorSnapshot::from_documents(
            &[json!({"id": "a", "embedding": "***not base64***"}), json!({"lexicalForm": "no id"})],
            &[json!({"text": "missing id"})],
        );
        assert!(prior.is_empty());
    }
}
