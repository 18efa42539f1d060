//! Storage configuration loaded from TOML.
//!
//! ```toml
//! backend = "file"
//! path = ".taskline/tickets.json"
//! alias_length = 6
//! operation_timeout_ms = 5000
//! log_filter = "taskline_core=debug"
//! ```

use crate::{
    alias::{AliasGenerator, DEFAULT_ALIAS_LENGTH},
    error::{Result, TasklineError},
    storage::{create_repository, DeadlineRepository, StorageBackend, TicketRepository},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    File,
    #[cfg(feature = "sqlite-storage")]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: BackendKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_alias_length")]
    pub alias_length: usize,
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_alias_length() -> usize {
    DEFAULT_ALIAS_LENGTH
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            path: None,
            alias_length: default_alias_length(),
            operation_timeout_ms: None,
            log_filter: default_log_filter(),
        }
    }
}

impl StorageConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| TasklineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the TOML file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| TasklineError::Persistence {
                operation: "load_config",
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        AliasGenerator::new(self.alias_length)?;

        let needs_path = !matches!(self.backend, BackendKind::Memory);
        let has_path = self
            .path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty());
        if needs_path && !has_path {
            return Err(TasklineError::Config(format!(
                "backend '{:?}' requires a non-empty path",
                self.backend
            )));
        }

        if self.operation_timeout_ms == Some(0) {
            return Err(TasklineError::Config(
                "operation_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_backend(&self) -> Result<StorageBackend> {
        self.validate()?;
        let path = self.path.clone().unwrap_or_default();
        Ok(match self.backend {
            BackendKind::File => StorageBackend::File(path),
            #[cfg(feature = "sqlite-storage")]
            BackendKind::Sqlite => StorageBackend::Sqlite(path),
            BackendKind::Memory => StorageBackend::InMemory,
        })
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn alias_generator(&self) -> Result<AliasGenerator> {
        AliasGenerator::new(self.alias_length)
    }
}

/// Builds the configured repository, adding a deadline when one is set
pub fn open_repository(config: &StorageConfig) -> Result<Box<dyn TicketRepository>> {
    let repository = create_repository(config.to_backend()?)?;
    Ok(match config.operation_timeout() {
        Some(deadline) => Box::new(DeadlineRepository::new(repository, deadline)),
        None => repository,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_applied() {
        let config = StorageConfig::from_toml_str(
            r#"
            backend = "file"
            path = "tickets.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.alias_length, 6);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.operation_timeout(), None);
        assert_eq!(
            config.to_backend().unwrap(),
            StorageBackend::File(PathBuf::from("tickets.json"))
        );
    }

    #[test]
    fn test_missing_path_rejected() {
        assert!(matches!(
            StorageConfig::from_toml_str(r#"backend = "file""#),
            Err(TasklineError::Config(_))
        ));
        assert!(StorageConfig::from_toml_str(r#"backend = "memory""#).is_ok());
    }

    #[test]
    fn test_alias_length_out_of_range() {
        let result = StorageConfig::from_toml_str(
            r#"
            backend = "memory"
            alias_length = 3
            "#,
        );
        assert!(matches!(result, Err(TasklineError::InvalidAliasLength { length: 3, .. })));
    }

    #[test]
    fn test_unknown_backend_and_fields() {
        assert!(StorageConfig::from_toml_str(r#"backend = "postgres""#).is_err());
        assert!(StorageConfig::from_toml_str("backend = \"memory\"\ncolour = \"blue\"").is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = StorageConfig::from_toml_str(
            r#"
            backend = "memory"
            operation_timeout_ms = 0
            "#,
        );
        assert!(matches!(result, Err(TasklineError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("taskline.toml");
        std::fs::write(
            &path,
            "backend = \"memory\"\noperation_timeout_ms = 1500\nlog_filter = \"debug\"\n",
        )
        .unwrap();

        let config = StorageConfig::load(&path).unwrap();
        assert_eq!(config.operation_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.log_filter, "debug");

        assert!(matches!(
            StorageConfig::load(temp_dir.path().join("missing.toml")),
            Err(TasklineError::Persistence { operation: "load_config", .. })
        ));
    }

    #[tokio::test]
    async fn test_open_repository_with_deadline() {
        let config = StorageConfig {
            operation_timeout_ms: Some(1000),
            ..StorageConfig::default()
        };
        let repo = open_repository(&config).unwrap();
        assert!(repo.get_all_aliases().await.unwrap().is_empty());
    }
}
