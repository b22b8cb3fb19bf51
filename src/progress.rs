//! Upload progress reporting.
//!
//! Reports how far `lexi upload` has got through embedding and inserting each
//! collection. Progress is emitted on **stderr** so the stdout summary stays
//! parseable for scripts.

use std::io::Write;

/// A single progress event for an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadProgressEvent {
    /// `n` of `total` records have an embedding decision.
    Embedding {
        collection: String,
        n: u64,
        total: u64,
        reused: u64,
    },
    /// Documents written to a collection.
    Inserted { collection: String, count: u64 },
}

/// Reports upload progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: UploadProgressEvent);
}

/// Human-friendly progress on stderr: "upload words  embedding  1,234 / 5,000 (1,100 reused)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: UploadProgressEvent) {
        let line = match &event {
            UploadProgressEvent::Embedding {
                collection,
                n,
                total,
                reused,
            } => format!(
                "upload {}  embedding  {} / {} ({} reused)\n",
                collection,
                format_number(*n),
                format_number(*total),
                format_number(*reused)
            ),
            UploadProgressEvent::Inserted { collection, count } => {
                format!("upload {}  inserted  {} documents\n", collection, format_number(*count))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &UploadProgressEvent) -> serde_json::Value {
        match event {
            UploadProgressEvent::Embedding {
                collection,
                n,
                total,
                reused,
            } => serde_json::json!({
                "event": "progress",
                "collection": collection,
                "phase": "embedding",
                "n": n,
                "total": total,
                "reused": reused
            }),
            UploadProgressEvent::Inserted { collection, count } => serde_json::json!({
                "event": "progress",
                "collection": collection,
                "phase": "inserted",
                "count": count
            }),
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: UploadProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: UploadProgressEvent) {}
}

/// `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    /// Human when stderr is a TTY, otherwise off.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Collapse `Auto` based on whether stderr is a TTY.
    pub fn resolve(self) -> Self {
        match self {
            ProgressMode::Auto if atty::is(atty::Stream::Stderr) => ProgressMode::Human,
            ProgressMode::Auto => ProgressMode::Off,
            other => other,
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self.resolve() {
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
            _ => Box::new(NoProgress),
        }
    }
}
