//! Typed errors for the failure classes callers branch on.
//!
//! Everything else travels as `anyhow::Error`. Messages leave out their
//! source; print with `{:#}` to see the whole chain.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to produce an embedding for one text.
///
/// Always recoverable at the batch level: the orchestrator logs it against
/// the record and moves on.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("embedding provider failed")]
    Provider(#[source] anyhow::Error),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("failed to write cache entry {path}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Document-store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid collection or field name: {0}")]
    InvalidName(String),

    #[error("document serialization failed")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error")]
    Backend(#[from] sqlx::Error),
}

/// Backup listing / restore failures.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("no backup found for timestamp {0}")]
    NotFound(String),

    #[error("backup index {index} out of range (1..={available})")]
    IndexOutOfRange { index: usize, available: usize },

    #[error("no backups found in {0}")]
    NoSnapshots(PathBuf),

    #[error("backup I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup file {path} is not a JSON array of documents")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
