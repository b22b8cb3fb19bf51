use anyhow::{bail, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::Config;

/// File backing database `name`.
pub fn database_path(config: &Config, name: &str) -> Result<PathBuf> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        bail!(
            "Invalid database name '{}': use letters, digits, '-' and '_'",
            name
        );
    }
    Ok(config.db.dir.join(format!("{}.sqlite", name)))
}

pub fn database_exists(config: &Config, name: &str) -> Result<bool> {
    Ok(database_path(config, name)?.exists())
}

pub async fn connect(config: &Config, name: &str) -> Result<SqlitePool> {
    let db_path = database_path(config, name)?;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
