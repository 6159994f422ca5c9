use std::path::Path;

use serde::Deserialize;

use dealflow_core::{StatusSet, status::DEFAULT_STATUSES};
use dealflow_storage::SqliteStore;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Column order; the first entry is the status given to new records.
    pub statuses: Vec<String>,
    pub store: StoreConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite file; in-memory when unset.
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// An `EnvFilter` directive string.
    pub filter: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            statuses: DEFAULT_STATUSES.iter().map(|s| s.to_string()).collect(),
            store: StoreConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.status_set()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn status_set(&self) -> Result<StatusSet, ConfigError> {
        Ok(StatusSet::new(&self.statuses)?)
    }

    pub fn open_store(&self) -> Result<SqliteStore, ConfigError> {
        let statuses = self.status_set()?;
        let store = match &self.store.path {
            Some(path) => SqliteStore::open(path, statuses)?,
            None => SqliteStore::open_in_memory(statuses)?,
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealflow_core::Status;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.status_set().unwrap(), StatusSet::default());
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn custom_statuses_and_store() {
        let config = PipelineConfig::from_toml_str(
            r#"
            statuses = ["lead", "quoted", "closed"]

            [store]
            path = "/var/lib/dealflow/pipeline.db"

            [log]
            filter = "dealflow_engine=debug"
            "#,
        )
        .unwrap();
        let statuses = config.status_set().unwrap();
        assert_eq!(statuses.initial(), &Status::new("lead"));
        assert_eq!(statuses.len(), 3);
        assert_eq!(config.store.path.as_deref(), Some("/var/lib/dealflow/pipeline.db"));
        assert_eq!(config.log.filter, "dealflow_engine=debug");
    }

    #[test]
    fn bad_status_set_rejected() {
        let err = PipelineConfig::from_toml_str(r#"statuses = ["new", "new"]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Statuses(_)));

        let err = PipelineConfig::from_toml_str("statuses = []").unwrap_err();
        assert!(matches!(err, ConfigError::Statuses(_)));
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = PipelineConfig::from_toml_str("colour = \"blue\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file_and_opens_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("pipeline.db");
        let cfg = dir.path().join("dealflow.toml");
        std::fs::write(
            &cfg,
            format!("[store]\npath = {:?}\n", db.to_str().unwrap()),
        )
        .unwrap();

        let config = PipelineConfig::from_path(&cfg).unwrap();
        let store = config.open_store().unwrap();
        assert_eq!(store.statuses(), &StatusSet::default());
        assert!(db.exists());
    }
}
