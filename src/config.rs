use crate::error::{EtlError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
    pub output: OutputConfig,
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path, or `:memory:`
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub basics_url: String,
    pub ratings_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub name: String,
    pub start_date: NaiveDate,
    pub interval_minutes: u64,
    pub max_active_runs: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "imdb_etl.db".to_string(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            basics_url: "https://datasets.imdbws.com/title.basics.tsv.gz".to_string(),
            ratings_url: "https://datasets.imdbws.com/title.ratings.tsv.gz".to_string(),
            timeout_seconds: 600,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./imdb_data_ready.tsv"),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            name: "imdb_etl".to_string(),
            start_date: NaiveDate::from_ymd_opt(2023, 7, 13).unwrap_or(NaiveDate::MIN),
            interval_minutes: 10,
            max_active_runs: 1,
        }
    }
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl WorkflowConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

impl Config {
    /// Load configuration from `path`. A missing file yields the built-in defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.url.trim().is_empty() {
            return Err(EtlError::Config("storage.url must not be empty".to_string()));
        }
        if self.sources.basics_url.trim().is_empty() || self.sources.ratings_url.trim().is_empty() {
            return Err(EtlError::Config("both source URLs are required".to_string()));
        }
        if self.output.path.as_os_str().is_empty() {
            return Err(EtlError::Config("output.path must not be empty".to_string()));
        }
        if self.workflow.interval_minutes == 0 {
            return Err(EtlError::Config("workflow.interval_minutes must be positive".to_string()));
        }
        if self.workflow.max_active_runs != 1 {
            return Err(EtlError::Config(format!(
                "workflow.max_active_runs must be 1, got {}",
                self.workflow.max_active_runs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_workflow() {
        let config = Config::default();
        assert_eq!(config.workflow.name, "imdb_etl");
        assert_eq!(config.workflow.interval(), Duration::from_secs(600));
        assert_eq!(config.workflow.start_date, NaiveDate::from_ymd_opt(2023, 7, 13).unwrap());
        assert_eq!(config.output.path, PathBuf::from("./imdb_data_ready.tsv"));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[storage]\nurl = \":memory:\"\n\n[output]\npath = \"out.tsv\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.url, ":memory:");
        assert_eq!(config.output.path, PathBuf::from("out.tsv"));
        assert_eq!(config.workflow.interval_minutes, 10);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("/no/such/config.toml").unwrap();
        assert_eq!(config.storage.url, "imdb_etl.db");
    }

    #[test]
    fn test_rejects_concurrent_runs() {
        let mut config = Config::default();
        config.workflow.max_active_runs = 2;
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }
}
