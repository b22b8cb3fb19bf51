//! # lift-ingest
//!
//! Batch ingestion of LIFT dictionary exports into a document store, with
//! embedding reuse across runs and file-based backup/restore.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │ LIFT XML │──▶│ Extract + │──▶│ Reuse / Cache │──▶│  Store   │
//! │  (lift)  │   │  Format   │   │  / Provider   │   │ (SQLite) │
//! └──────────┘   └───────────┘   └──────────────┘   └────┬─────┘
//!                                                        │
//!                                     ┌──────────────────┘
//!                                     ▼
//!                               ┌───────────┐
//!                               │  Backups  │
//!                               │ (JSON)    │
//!                               └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexi init
//! lexi upload ./dictionary.lift --no-backup --yes
//! lexi upload ./dictionary.lift --backup       # reuses unchanged embeddings
//! lexi backups
//! lexi restore 1
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Entry, word and sentence documents, packed embeddings |
//! | [`lift`] | LIFT XML → generic document tree |
//! | [`extract`] | Document tree → [`models::Entry`] |
//! | [`format`] | Contributor-abbreviation expansion |
//! | [`fingerprint`] | Content ids for sentences |
//! | [`sentences`] | Sentence derivation and deduplication |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`cache`] | On-disk embedding cache |
//! | [`reuse`] | Carry-forward of prior embeddings |
//! | [`store`] | Document store trait and backends |
//! | [`db`] | SQLite connection |
//! | [`backup`] | Snapshot / list / restore |
//! | [`confirm`] | Operator confirmation |
//! | [`progress`] | Progress reporting on stderr |
//! | [`ingest`] | Upload orchestration |
//! | [`error`] | Typed error enums |

pub mod backup;
pub mod cache;
pub mod config;
pub mod confirm;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod format;
pub mod ingest;
pub mod lift;
pub mod models;
pub mod progress;
pub mod reuse;
pub mod sentences;
pub mod store;

#[cfg(test)]
mod testing;
