//! TOML configuration loading and validation.
//!
//! Every section except `[db]` is optional and falls back to defaults, so a
//! minimal config only needs the database directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Directory holding one SQLite file per database name.
    pub dir: PathBuf,
    #[serde(default = "default_db_name")]
    pub default_name: String,
}

fn default_db_name() -> String {
    "dictionary".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL, only read by the ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/embedding-cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
        }
    }
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./data/backups")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Whole-word token → expansion, applied to example source and note text.
    #[serde(default = "default_abbreviations")]
    pub abbreviations: BTreeMap<String, String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            abbreviations: default_abbreviations(),
        }
    }
}

fn default_abbreviations() -> BTreeMap<String, String> {
    BTreeMap::from([("nn".to_string(), "Norma Nelson".to_string())])
}

impl Config {
    /// Config rooted at `root`, embeddings disabled. Used by tests and `--dry-run`
    /// callers that never touch a provider.
    pub fn minimal(root: &Path) -> Self {
        Self {
            db: DbConfig {
                dir: root.join("db"),
                default_name: default_db_name(),
            },
            embedding: EmbeddingConfig::default(),
            cache: CacheConfig {
                dir: root.join("embedding-cache"),
            },
            backup: BackupConfig {
                dir: root.join("backups"),
            },
            sources: SourcesConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.default_name.trim().is_empty() {
        anyhow::bail!("db.default_name must not be empty");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    for token in config.sources.abbreviations.keys() {
        if !crate::format::is_matchable_token(token) {
            anyhow::bail!(
                "sources.abbreviations keys must be single non-empty tokens that start and end with a letter, digit or '_', got '{}'",
                token
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_file_takes_defaults() {
        let cfg = parse("[db]\ndir = \"/tmp/db\"\n").unwrap();
        assert_eq!(cfg.db.default_name, "dictionary");
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(
            cfg.sources.abbreviations.get("nn").map(String::as_str),
            Some("Norma Nelson")
        );
    }

    #[test]
    fn enabled_provider_requires_dims() {
        let err = parse(
            "[db]\ndir = \"/tmp/db\"\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = parse(
            "[db]\ndir = \"/tmp/db\"\n[embedding]\nprovider = \"magic\"\nmodel = \"m\"\ndims = 4\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn abbreviation_keys_must_be_tokens() {
        let err = parse("[db]\ndir = \"/tmp/db\"\n[sources]\nabbreviations = { \"a b\" = \"x\" }\n")
            .unwrap_err();
        assert!(err.to_string().contains("single non-empty tokens"));

        let err = parse("[db]\ndir = \"/tmp/db\"\n[sources]\nabbreviations = { \"N.N.\" = \"x\" }\n")
            .unwrap_err();
        assert!(err.to_string().contains("'N.N.'"), "{}", err);
    }
}
