//! Runtime configuration.
//!
//! Every field has a default, so an absent or partial `procstore.toml` is fine:
//!
//! ```toml
//! root = "data/processes"
//! backend = "per-record"      # or "whole-file"
//! compression = "none"        # or "gzip" (whole-file only)
//! persist_prefix = "persist_"
//!
//! [maintenance]
//! status_key = "persist_status"
//! completed_status = "completed"
//! completed_at_key = "persist_completed_at"
//! failed_status = "failed"
//! ```

use crate::statics;
use crate::store::Compression;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which [`RecordStore`](crate::store::RecordStore) implementation to open.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// All records in one `processes.json`; permanent delete.
    #[default]
    WholeFile,
    /// One file per record with audit trail and soft delete.
    PerRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub root: PathBuf,
    pub backend: Backend,
    pub compression: Compression,
    /// Working-set keys starting with this are persisted; everything else is UI state.
    pub persist_prefix: String,
    pub maintenance: MaintenanceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from(statics::DEFAULT_DATA_ROOT),
            backend: Backend::default(),
            compression: Compression::default(),
            persist_prefix: statics::DEFAULT_PERSIST_PREFIX.to_string(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

/// Field names and status markers the maintenance tooling looks for in records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaintenanceConfig {
    pub status_key: String,
    pub completed_status: String,
    pub completed_at_key: String,
    pub failed_status: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            status_key: statics::DEFAULT_STATUS_KEY.to_string(),
            completed_status: statics::STATUS_COMPLETED.to_string(),
            completed_at_key: statics::DEFAULT_COMPLETED_AT_KEY.to_string(),
            failed_status: statics::STATUS_FAILED.to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(text).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
        Self::from_toml_str(&text).with_context(|| format!("loading config {path:?}"))
    }

    /// Loads `path` if given (it must exist), otherwise `procstore.toml` in the
    /// working directory if present, otherwise defaults.
    pub fn discover(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::load_path(path);
        }
        let default_path = Path::new(statics::DEFAULT_CONFIG_FILE);
        if default_path.is_file() {
            return Self::load_path(default_path);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.persist_prefix.is_empty(),
            "persist_prefix must not be empty (every session key would be persisted)"
        );
        anyhow::ensure!(
            !self.maintenance.status_key.is_empty(),
            "maintenance.status_key must not be empty"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Backend, Config};
    use crate::statics;
    use crate::store::Compression;
    use std::path::PathBuf;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.persist_prefix, statics::DEFAULT_PERSIST_PREFIX);
        assert_eq!(config.backend, Backend::WholeFile);
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let config = Config::from_toml_str(
            r#"
root = "/var/lib/procs"
backend = "per-record"
compression = "gzip"

[maintenance]
failed_status = "aborted"
"#,
        )
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/var/lib/procs"));
        assert_eq!(config.backend, Backend::PerRecord);
        assert_eq!(config.compression, Compression::Gzip);
        assert_eq!(config.maintenance.failed_status, "aborted");
        assert_eq!(config.maintenance.status_key, statics::DEFAULT_STATUS_KEY);
    }

    #[test]
    fn rejects_unknown_keys_and_empty_prefix() {
        assert!(Config::from_toml_str("bakend = \"per-record\"").is_err());
        assert!(Config::from_toml_str("persist_prefix = \"\"").is_err());
    }

    #[test]
    fn load_path_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_path(&dir.path().join("missing.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));
    }

    #[test]
    fn discover_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procstore.toml");
        std::fs::write(&path, "persist_prefix = \"keep_\"\n").unwrap();

        let config = Config::discover(Some(&path)).unwrap();
        assert_eq!(config.persist_prefix, "keep_");
    }
}
