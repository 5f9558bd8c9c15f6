use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use feedgit_sync::SyncConfig;
use feedgit_types::FeedId;

use crate::cli::Cli;

pub const DEFAULT_CONFIG_FILE: &str = "feedgit.toml";
pub const DEFAULT_DATA_DIR: &str = ".feedgit";

/// Contents of `feedgit.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// The feed this machine publishes as. Generated by `init` if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<FeedId>,
    pub data_dir: PathBuf,
    pub sync: SyncConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            feed: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            sync: SyncConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load the config file named on the command line, else `feedgit.toml`
    /// if it exists, then apply flag overrides.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let path = config_path(cli);
        let mut config = if path.exists() {
            Self::load(&path)?
        } else if cli.config.is_some() {
            anyhow::bail!("config file {} not found", path.display());
        } else {
            Self::default()
        };

        if let Some(dir) = &cli.data_dir {
            config.data_dir = dir.clone();
        }
        if cli.feed.is_some() {
            config.feed = cli.feed;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = toml::to_string(self)?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("log.jsonl")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

pub fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: CliConfig = toml::from_str(
            r#"
            data_dir = "/srv/feedgit"

            [sync]
            live = true
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/feedgit"));
        assert!(config.sync.live);
        assert_eq!(config.sync.max_entry_size, SyncConfig::default().max_entry_size);
        assert!(config.feed.is_none());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedgit.toml");
        let config = CliConfig {
            feed: Some(FeedId::from_raw([7; 32])),
            ..CliConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(CliConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "data_dir = \"from-file\"\n").unwrap();
        let path_arg = path.to_string_lossy().into_owned();

        let cli = Cli::try_parse_from(["feedgit", "--config", &path_arg, "config"]).unwrap();
        assert_eq!(CliConfig::resolve(&cli).unwrap().data_dir, PathBuf::from("from-file"));

        let cli = Cli::try_parse_from([
            "feedgit",
            "--config",
            &path_arg,
            "--data-dir",
            "from-flag",
            "config",
        ])
        .unwrap();
        let config = CliConfig::resolve(&cli).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("from-flag"));
        assert_eq!(config.log_path(), PathBuf::from("from-flag/log.jsonl"));
    }

    #[test]
    fn named_config_must_exist() {
        let cli = Cli::try_parse_from(["feedgit", "--config", "/nonexistent/feedgit.toml", "config"])
            .unwrap();
        assert!(CliConfig::resolve(&cli).is_err());
    }
}
