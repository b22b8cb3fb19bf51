//! Upload pipeline orchestration.
//!
//! Sequences one `lexi upload` run:
//!
//! ```text
//! parse LIFT → extract entries → format sources
//!   → confirm → (snapshot) → drop collections
//!   → resolve word embeddings → insert words
//!   → derive sentences → resolve sentence embeddings → insert sentences
//!   → standard indexes → last_upload metadata
//! ```
//!
//! Parse and store failures abort the run. Per-record embedding failures are
//! logged and the record is stored without an embedding. There is no
//! automatic rollback; the snapshot taken with `--backup` is the way back.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::backup::BackupManager;
use crate::cache::EmbeddingCache;
use crate::confirm::Confirmation;
use crate::embedding::EmbeddingProvider;
use crate::extract::extract_entries;
use crate::format::SourceFormatter;
use crate::lift::parse_lift_file;
use crate::models::{Entry, SentenceDocument, WordDocument};
use crate::progress::{ProgressReporter, UploadProgressEvent};
use crate::reuse::{PriorSnapshot, ReuseResolver, ReuseStats};
use crate::sentences::derive_sentences;
use crate::store::{
    ensure_standard_indexes, Document, DocumentStore, DropOutcome, METADATA, SENTENCES, WORDS,
};

/// Id of the metadata document describing the most recent upload.
pub const LAST_UPLOAD_ID: &str = "last_upload";

const INSERT_BATCH: usize = 500;
const PROGRESS_EVERY: u64 = 100;

/// What happens to the existing collections before the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Snapshot `words` and `sentences`, reuse from the snapshot, then drop.
    Backup,
    /// Drop without a snapshot.
    NoBackup,
    /// Drop without a snapshot, `metadata` included.
    Clean,
}

/// Collaborators for one run. Everything is constructed by the caller.
pub struct UploadContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub provider: &'a dyn EmbeddingProvider,
    pub cache: &'a EmbeddingCache,
    pub backups: &'a BackupManager,
    pub formatter: &'a SourceFormatter,
    pub progress: &'a dyn ProgressReporter,
}

pub struct UploadOptions {
    pub mode: UploadMode,
    /// Explicit reuse source (another database or a snapshot on disk).
    /// Takes precedence over the snapshot taken in [`UploadMode::Backup`].
    pub reuse: Option<PriorSnapshot>,
    pub confirmation: Confirmation,
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub source_file: String,
    pub words: usize,
    pub sentences: usize,
    pub word_embeddings: ReuseStats,
    pub sentence_embeddings: ReuseStats,
    /// Timestamp of the snapshot taken before the drop, if any.
    pub backup: Option<String>,
    pub dry_run: bool,
}

impl UploadReport {
    pub fn totals(&self) -> ReuseStats {
        let (w, s) = (self.word_embeddings, self.sentence_embeddings);
        ReuseStats {
            reused: w.reused + s.reused,
            cached: w.cached + s.cached,
            computed: w.computed + s.computed,
            failed: w.failed + s.failed,
        }
    }

    /// Plain `key: value` lines for stdout, ending in `ok`.
    pub fn summary_lines(&self) -> Vec<String> {
        let totals = self.totals();
        let mut lines = vec![format!(
            "upload {}{}",
            self.source_file,
            if self.dry_run { " (dry-run)" } else { "" }
        )];
        if let Some(ts) = &self.backup {
            lines.push(format!("  backup: {}", ts));
        }
        lines.push(format!("  words: {}", self.words));
        lines.push(format!("  sentences: {}", self.sentences));
        if self.dry_run {
            lines.push(format!("  embeddings reusable: {}", totals.reused));
            lines.push(format!("  embeddings to compute: {}", totals.computed));
        } else {
            lines.push(format!("  embeddings reused: {}", totals.reused));
            lines.push(format!("  embeddings from cache: {}", totals.cached));
            lines.push(format!("  embeddings computed: {}", totals.computed));
            lines.push(format!("  embeddings failed: {}", totals.failed));
        }
        lines.push("ok".to_string());
        lines
    }
}

/// Parse, extract and format the entries of a LIFT file.
///
/// Entries repeating an earlier id are dropped with a warning; the unique
/// index on `words.id` would reject them anyway.
pub fn load_entries(path: &Path, formatter: &SourceFormatter) -> Result<Vec<Entry>> {
    if !path.exists() {
        bail!("Source file not found: {}", path.display());
    }
    let tree = parse_lift_file(path)?;
    let entries = extract_entries(&tree)
        .with_context(|| format!("Failed to extract entries from {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(entries.len());
    for mut entry in entries {
        if let Some(id) = &entry.id {
            if !seen.insert(id.clone()) {
                warn!(entry_id = %id, "duplicate entry id, keeping the first occurrence");
                continue;
            }
        }
        formatter.format_entry(&mut entry);
        kept.push(entry);
    }
    info!(entries = kept.len(), file = %path.display(), "entries extracted");
    Ok(kept)
}

pub async fn run_upload(
    ctx: &UploadContext<'_>,
    source: &Path,
    options: UploadOptions,
) -> Result<UploadReport> {
    let entries = load_entries(source, ctx.formatter)?;
    let sentences = derive_sentences(&entries);
    let mut report = UploadReport {
        source_file: source.display().to_string(),
        words: entries.len(),
        sentences: sentences.len(),
        dry_run: options.dry_run,
        ..UploadReport::default()
    };

    if options.dry_run {
        let prior = match options.reuse {
            Some(prior) => prior,
            None if options.mode == UploadMode::Backup => prior_from_store(ctx.store).await?,
            None => PriorSnapshot::empty(),
        };
        plan(&prior, &entries, &sentences, &mut report);
        return Ok(report);
    }

    options.confirmation.confirm(&format!(
        "Replace the words and sentences collections with {} entries from {}",
        entries.len(),
        source.display()
    ))?;

    let snapshot = match options.mode {
        UploadMode::Backup => {
            let snapshot = ctx
                .backups
                .snapshot(ctx.store, None)
                .await
                .context("Backup before upload failed")?;
            if !snapshot.files.is_empty() {
                report.backup = Some(snapshot.timestamp.clone());
            }
            Some(snapshot)
        }
        UploadMode::NoBackup | UploadMode::Clean => None,
    };
    let prior = match (options.reuse, &snapshot) {
        (Some(prior), _) => prior,
        (None, Some(snapshot)) => snapshot.prior(),
        (None, None) => PriorSnapshot::empty(),
    };
    info!(
        prior_words = prior.word_count(),
        prior_sentences = prior.sentence_count(),
        "reuse lookup ready"
    );

    let mut targets = vec![WORDS, SENTENCES];
    if options.mode == UploadMode::Clean {
        targets.push(METADATA);
    }
    for collection in targets {
        match ctx.store.drop_collection(collection).await? {
            DropOutcome::Dropped => info!(collection, "collection dropped"),
            DropOutcome::Missing => info!(collection, "collection did not exist"),
        }
    }

    let now = Utc::now().to_rfc3339();

    // Words are fully stored before sentences are derived and embedded.
    let mut resolver = ReuseResolver::new(&prior, ctx.cache, ctx.provider);
    let total = entries.len() as u64;
    let mut word_docs = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let embedding = resolver.resolve_word(entry).await;
        let doc = WordDocument {
            entry: entry.clone(),
            embedding,
            created_at: Some(now.clone()),
            updated_at: Some(now.clone()),
        };
        word_docs.push(serde_json::to_value(&doc)?);
        report_embedding(ctx.progress, WORDS, i as u64 + 1, total, resolver.stats().reused);
    }
    report.word_embeddings = resolver.stats();
    insert_batched(ctx, WORDS, &word_docs).await?;

    let mut resolver = ReuseResolver::new(&prior, ctx.cache, ctx.provider);
    let total = sentences.len() as u64;
    let mut sentence_docs = Vec::with_capacity(sentences.len());
    for (i, mut sentence) in sentences.into_iter().enumerate() {
        sentence.embedding = resolver.resolve_sentence(&sentence).await;
        sentence.created_at = Some(now.clone());
        sentence.updated_at = Some(now.clone());
        sentence_docs.push(serde_json::to_value(&sentence)?);
        report_embedding(ctx.progress, SENTENCES, i as u64 + 1, total, resolver.stats().reused);
    }
    report.sentence_embeddings = resolver.stats();
    insert_batched(ctx, SENTENCES, &sentence_docs).await?;

    let created = ensure_standard_indexes(ctx.store)
        .await
        .context("Failed to create standard indexes")?;
    info!(created, "standard indexes ensured");

    record_last_upload(ctx.store, &report).await?;
    Ok(report)
}

/// Reuse lookup from the current contents of the store, read-only.
pub async fn prior_from_store(store: &dyn DocumentStore) -> Result<PriorSnapshot> {
    let words = store.find_all(WORDS).await?;
    let sentences = store.find_all(SENTENCES).await?;
    Ok(PriorSnapshot::from_documents(&words, &sentences))
}

/// Dry-run accounting: what would be reused and what would be computed.
fn plan(
    prior: &PriorSnapshot,
    entries: &[Entry],
    sentences: &[SentenceDocument],
    report: &mut UploadReport,
) {
    let reusable = entries
        .iter()
        .filter(|e| prior.reusable_word(e).is_some())
        .count() as u64;
    report.word_embeddings = ReuseStats {
        reused: reusable,
        computed: entries.len() as u64 - reusable,
        ..ReuseStats::default()
    };

    let reusable = sentences
        .iter()
        .filter(|s| prior.reusable_sentence(s).is_some())
        .count() as u64;
    report.sentence_embeddings = ReuseStats {
        reused: reusable,
        computed: sentences.len() as u64 - reusable,
        ..ReuseStats::default()
    };
}

fn report_embedding(progress: &dyn ProgressReporter, collection: &str, n: u64, total: u64, reused: u64) {
    if n % PROGRESS_EVERY == 0 || n == total {
        progress.report(UploadProgressEvent::Embedding {
            collection: collection.to_string(),
            n,
            total,
            reused,
        });
    }
}

async fn insert_batched(ctx: &UploadContext<'_>, collection: &str, docs: &[Document]) -> Result<()> {
    let mut inserted = 0u64;
    for batch in docs.chunks(INSERT_BATCH) {
        inserted += ctx
            .store
            .insert_many(collection, batch)
            .await
            .with_context(|| format!("Failed to insert into '{}'", collection))? as u64;
    }
    info!(collection, inserted, "documents inserted");
    ctx.progress.report(UploadProgressEvent::Inserted {
        collection: collection.to_string(),
        count: inserted,
    });
    Ok(())
}

async fn record_last_upload(store: &dyn DocumentStore, report: &UploadReport) -> Result<()> {
    let totals = report.totals();
    let doc = json!({
        "id": LAST_UPLOAD_ID,
        "sourceFile": report.source_file,
        "completedAt": Utc::now().to_rfc3339(),
        "backup": report.backup,
        "words": report.words,
        "sentences": report.sentences,
        "embeddingsReused": totals.reused,
        "embeddingsCached": totals.cached,
        "embeddingsComputed": totals.computed,
        "embeddingsFailed": totals.failed,
    });
    store
        .update_one_upsert(METADATA, LAST_UPLOAD_ID, &doc)
        .await
        .context("Failed to record upload metadata")?;
    Ok(())
}
