//! # lexi
//!
//! Command-line front end for the LIFT dictionary ingestion pipeline.
//!
//! ## Usage
//!
//! ```bash
//! lexi --config ./config/lexi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexi init` | Create the database and standard indexes |
//! | `lexi upload <FILE>` | Replace words and sentences from a LIFT file |
//! | `lexi backup` | Snapshot words and sentences to the backup directory |
//! | `lexi backups` | List snapshots, newest first |
//! | `lexi restore <TS\|N>` | Restore a snapshot by timestamp or 1-based index |
//! | `lexi cache stats` | Cached embeddings per category |
//! | `lexi status` | Document counts and the last upload record |
//!
//! ## Examples
//!
//! ```bash
//! # First load, nothing to back up yet
//! lexi upload ./dictionary.lift --no-backup --yes
//!
//! # Re-ingest, reusing embeddings of unchanged entries
//! lexi upload ./dictionary.lift --backup
//!
//! # Undo the last upload
//! lexi restore 1
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lift_ingest::backup::{BackupManager, SnapshotSelector};
use lift_ingest::cache::EmbeddingCache;
use lift_ingest::config::{self, Config};
use lift_ingest::confirm::Confirmation;
use lift_ingest::db;
use lift_ingest::embedding::create_provider;
use lift_ingest::format::SourceFormatter;
use lift_ingest::ingest::{self, UploadContext, UploadMode, UploadOptions, LAST_UPLOAD_ID};
use lift_ingest::progress::ProgressMode;
use lift_ingest::reuse::PriorSnapshot;
use lift_ingest::store::{
    ensure_standard_indexes, DocumentStore, InMemoryStore, SqliteStore, METADATA, SENTENCES, WORDS,
};

const DEFAULT_CONFIG: &str = "./config/lexi.toml";

/// lexi: ingest LIFT dictionaries into a document store with reusable
/// embeddings and file-based backups.
#[derive(Parser)]
#[command(
    name = "lexi",
    about = "Ingest LIFT dictionary exports with embedding reuse and backup/restore",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Without it, `./config/lexi.toml`
    /// is used when present, otherwise built-in defaults under `./data`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress output on stderr.
    #[arg(long, global = true, value_enum, default_value = "auto")]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database file and the standard indexes. Idempotent.
    Init {
        /// Database name (defaults to `db.default_name`).
        #[arg(long)]
        db: Option<String>,
    },

    /// Replace the words and sentences collections from a LIFT file.
    ///
    /// One of `--backup`, `--no-backup` or `--clean` is required.
    #[command(group(
        ArgGroup::new("mode")
            .required(true)
            .args(["backup", "no_backup", "clean"])
    ))]
    #[command(group(
        ArgGroup::new("reuse")
            .required(false)
            .args(["reuse_from_db", "reuse_from_snapshot"])
    ))]
    Upload {
        /// LIFT file to ingest.
        file: PathBuf,

        #[arg(long)]
        db: Option<String>,

        /// Snapshot the current collections first and reuse their embeddings.
        #[arg(long)]
        backup: bool,

        /// Drop the current collections without a snapshot.
        #[arg(long)]
        no_backup: bool,

        /// Like `--no-backup`, and drop the metadata collection too.
        #[arg(long)]
        clean: bool,

        /// Reuse embeddings from another database.
        #[arg(long, value_name = "NAME")]
        reuse_from_db: Option<String>,

        /// Reuse embeddings from the snapshot with this timestamp.
        #[arg(long, value_name = "TIMESTAMP")]
        reuse_from_snapshot: Option<String>,

        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,

        /// Report what would happen without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Snapshot the words and sentences collections.
    Backup {
        #[arg(long)]
        db: Option<String>,

        /// Appended to the snapshot file names.
        #[arg(long)]
        label: Option<String>,
    },

    /// List snapshots, newest first.
    Backups {
        #[command(subcommand)]
        action: Option<BackupsAction>,
    },

    /// Restore a snapshot by timestamp or by 1-based index from `lexi backups`.
    ///
    /// The current state is saved as a `before-rollback` snapshot first.
    Restore {
        /// Timestamp or listing index.
        snapshot: String,

        #[arg(long)]
        db: Option<String>,

        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Inspect the embedding cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Document counts and the last upload record.
    Status {
        #[arg(long)]
        db: Option<String>,
    },
}

#[derive(Subcommand)]
enum BackupsAction {
    /// List snapshots (the default).
    List,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Number of cached embeddings per category.
    Stats,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();
}

fn db_name<'a>(cfg: &'a Config, db: &'a Option<String>) -> &'a str {
    db.as_deref().unwrap_or(&cfg.db.default_name)
}

async fn open_store(cfg: &Config, name: &str) -> Result<SqliteStore> {
    let pool = db::connect(cfg, name)
        .await
        .with_context(|| format!("Failed to open database '{}'", name))?;
    Ok(SqliteStore::new(pool))
}

async fn reuse_source(
    cfg: &Config,
    backups: &BackupManager,
    from_db: Option<&str>,
    from_snapshot: Option<&str>,
) -> Result<Option<PriorSnapshot>> {
    if let Some(name) = from_db {
        if !db::database_exists(cfg, name)? {
            bail!("Reuse database '{}' does not exist", name);
        }
        let store = open_store(cfg, name).await?;
        let prior = ingest::prior_from_store(&store).await?;
        store.close().await;
        return Ok(Some(prior));
    }
    if let Some(ts) = from_snapshot {
        return Ok(Some(backups.load_prior(ts)?));
    }
    Ok(None)
}

#[allow(clippy::too_many_arguments)]
async fn cmd_upload(
    cfg: &Config,
    progress: ProgressMode,
    file: &Path,
    db: &Option<String>,
    mode: UploadMode,
    reuse_from_db: Option<&str>,
    reuse_from_snapshot: Option<&str>,
    yes: bool,
    dry_run: bool,
) -> Result<()> {
    if !file.exists() {
        bail!("Source file not found: {}", file.display());
    }
    let name = db_name(cfg, db);
    let backups = BackupManager::new(&cfg.backup.dir);
    let reuse = reuse_source(cfg, &backups, reuse_from_db, reuse_from_snapshot).await?;

    // The target database is neither opened nor created before confirmation.
    if !dry_run {
        Confirmation::from_flag(yes).confirm(&format!(
            "Replace the words and sentences collections of '{}' with entries from {}",
            name,
            file.display()
        ))?;
    }

    let sqlite = if dry_run && !db::database_exists(cfg, name)? {
        None
    } else {
        Some(open_store(cfg, name).await?)
    };
    let empty = InMemoryStore::new();
    let store: &dyn DocumentStore = match &sqlite {
        Some(store) => store,
        None => &empty,
    };
    let provider = create_provider(&cfg.embedding)?;
    if !provider.is_enabled() && !dry_run {
        tracing::warn!("embedding provider disabled, only reuse and cache hits will carry embeddings");
    }
    let cache = EmbeddingCache::new(&cfg.cache.dir);
    let formatter = SourceFormatter::new(&cfg.sources.abbreviations)?;
    let reporter = progress.reporter();

    let ctx = UploadContext {
        store,
        provider: provider.as_ref(),
        cache: &cache,
        backups: &backups,
        formatter: &formatter,
        progress: reporter.as_ref(),
    };
    let report = ingest::run_upload(
        &ctx,
        file,
        UploadOptions {
            mode,
            reuse,
            confirmation: Confirmation::AssumeYes,
            dry_run,
        },
    )
    .await;
    if let Some(store) = &sqlite {
        store.close().await;
    }

    for line in report?.summary_lines() {
        println!("{}", line);
    }
    Ok(())
}

async fn cmd_restore(cfg: &Config, snapshot: &str, db: &Option<String>, yes: bool) -> Result<()> {
    let name = db_name(cfg, db);
    let backups = BackupManager::new(&cfg.backup.dir);
    let selector = SnapshotSelector::parse(snapshot);

    // Fail on an unknown selector before prompting or opening anything.
    let set = backups.resolve(&selector)?;
    Confirmation::from_flag(yes).confirm(&format!(
        "Replace the words and sentences collections of '{}' with snapshot {}",
        name, set.timestamp
    ))?;

    let store = open_store(cfg, name).await?;
    let result = backups.restore(&store, &SnapshotSelector::Timestamp(set.timestamp)).await;
    store.close().await;
    let report = result?;

    println!("restore {}", report.restored.timestamp);
    println!("  safety snapshot: {}", report.safety.timestamp);
    println!("  words: {}", report.words);
    println!("  sentences: {}", report.sentences);
    println!("  indexes created: {}", report.indexes_created);
    println!("ok");
    Ok(())
}

fn cmd_list_backups(cfg: &Config) -> Result<()> {
    let backups = BackupManager::new(&cfg.backup.dir);
    let sets = backups.list()?;
    if sets.is_empty() {
        println!("No backups in {}", backups.dir().display());
        return Ok(());
    }
    for (i, set) in sets.iter().enumerate() {
        let covered: Vec<&str> = [WORDS, SENTENCES]
            .into_iter()
            .filter(|c| set.covers(c))
            .collect();
        println!(
            "{:>3}  {}  {:<16}  {}",
            i + 1,
            set.timestamp,
            set.label.as_deref().unwrap_or("-"),
            covered.join(", ")
        );
    }
    Ok(())
}

async fn cmd_status(cfg: &Config, db: &Option<String>) -> Result<()> {
    let name = db_name(cfg, db);
    if !db::database_exists(cfg, name)? {
        bail!("Database '{}' does not exist; run `lexi init` or `lexi upload` first", name);
    }
    let store = open_store(cfg, name).await?;
    println!("database {}", name);
    for collection in [WORDS, SENTENCES, METADATA] {
        println!("  {}: {}", collection, store.count(collection).await?);
    }
    match store.find_by(METADATA, "id", LAST_UPLOAD_ID).await?.first() {
        Some(doc) => println!("  last upload: {}", serde_json::to_string(doc)?),
        None => println!("  last upload: none"),
    }
    store.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Usage errors exit with 1 like every other fatal error; help and version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };
    init_tracing();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG))?,
        None => {
            tracing::debug!("no config file, using defaults under ./data");
            Config::minimal(Path::new("./data"))
        }
    };

    match cli.command {
        Commands::Init { db } => {
            let name = db_name(&cfg, &db);
            let store = open_store(&cfg, name).await?;
            let created = ensure_standard_indexes(&store).await?;
            store.close().await;
            println!("Database '{}' initialized ({} indexes created).", name, created);
        }
        Commands::Upload {
            file,
            db,
            backup,
            no_backup: _,
            clean,
            reuse_from_db,
            reuse_from_snapshot,
            yes,
            dry_run,
        } => {
            let mode = if backup {
                UploadMode::Backup
            } else if clean {
                UploadMode::Clean
            } else {
                UploadMode::NoBackup
            };
            cmd_upload(
                &cfg,
                cli.progress,
                &file,
                &db,
                mode,
                reuse_from_db.as_deref(),
                reuse_from_snapshot.as_deref(),
                yes,
                dry_run,
            )
            .await?;
        }
        Commands::Backup { db, label } => {
            let name = db_name(&cfg, &db);
            let store = open_store(&cfg, name).await?;
            let backups = BackupManager::new(&cfg.backup.dir);
            let snapshot = backups.snapshot(&store, label.as_deref()).await;
            store.close().await;
            let snapshot = snapshot?;
            println!("backup {}", snapshot.timestamp);
            println!("  words: {}", snapshot.words.len());
            println!("  sentences: {}", snapshot.sentences.len());
            println!("  files: {}", snapshot.files.len());
            println!("ok");
        }
        Commands::Backups { action } => match action.unwrap_or(BackupsAction::List) {
            BackupsAction::List => cmd_list_backups(&cfg)?,
        },
        Commands::Restore { snapshot, db, yes } => {
            cmd_restore(&cfg, &snapshot, &db, yes).await?;
        }
        Commands::Cache {
            action: CacheAction::Stats,
        } => {
            let cache = EmbeddingCache::new(&cfg.cache.dir);
            println!("cache {}", cache.root().display());
            for (category, count) in cache.stats() {
                println!("  {}: {}", category, count);
            }
        }
        Commands::Status { db } => cmd_status(&cfg, &db).await?,
    }

    Ok(())
}
