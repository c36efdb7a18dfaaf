use crate::stage::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_SOURCE_URL: &str = "PIPELINE_SOURCE_URL";
pub const ENV_DATA_DIR: &str = "PIPELINE_DATA_DIR";
pub const ENV_DATASET: &str = "PIPELINE_DATASET";
pub const ENV_DATABASE: &str = "PIPELINE_DATABASE";
pub const ENV_QUERY_LOG: &str = "PIPELINE_QUERY_LOG";

/// Picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source_url: Option<String>,
    pub data_dir: PathBuf,
    pub dataset_path: PathBuf,
    pub database_path: PathBuf,
    pub query_log_path: PathBuf,
    pub default_query: String,
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            data_dir: PathBuf::from("data"),
            dataset_path: PathBuf::from("data/housing.csv"),
            database_path: PathBuf::from("housing.db"),
            query_log_path: PathBuf::from("query_log.md"),
            default_query: "SELECT * FROM tbl_housing_data ORDER BY id LIMIT 5".to_string(),
            timeout_secs: 30,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, then the TOML file (explicit path, or `pipeline.toml` when it
    /// exists), then `PIPELINE_*` environment variables.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_toml_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_toml_file(path: &Path) -> PipelineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::ConfigFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw).map_err(|e| PipelineError::ConfigFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Applies overrides from `lookup`, which maps an environment variable name
    /// to its value.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SOURCE_URL) {
            self.source_url = Some(url);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dataset) = lookup(ENV_DATASET) {
            self.dataset_path = PathBuf::from(dataset);
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(database);
        }
        if let Some(log) = lookup(ENV_QUERY_LOG) {
            self.query_log_path = PathBuf::from(log);
        }
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_path = path.into();
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_query_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.query_log_path = path.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.default_query = query.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.source_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Source URL must start with http:// or https://".to_string());
            }
        }

        if self.dataset_path.as_os_str().is_empty() {
            return Err("Dataset path cannot be empty".to_string());
        }

        if self.database_path.as_os_str().is_empty() {
            return Err("Database path cannot be empty".to_string());
        }

        if self.default_query.trim().is_empty() {
            return Err("Query cannot be empty".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    pub(crate) fn validated(&self) -> PipelineResult<()> {
        self.validate()
            .map_err(|message| PipelineError::InvalidConfig { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.source_url, None);
        assert_eq!(config.dataset_path, PathBuf::from("data/housing.csv"));
        assert_eq!(config.database_path, PathBuf::from("housing.db"));
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_source_url("https://example.com/housing.csv")
            .with_dataset_path("/tmp/in.csv")
            .with_database_path("/tmp/out.db")
            .with_query("DELETE FROM tbl_housing_data")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(
            config.source_url.as_deref(),
            Some("https://example.com/housing.csv")
        );
        assert_eq!(config.dataset_path, PathBuf::from("/tmp/in.csv"));
        assert_eq!(config.database_path, PathBuf::from("/tmp/out.db"));
        assert_eq!(config.default_query, "DELETE FROM tbl_housing_data");
        assert_eq!(config.timeout_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();

        config.source_url = Some("ftp://example.com/data.csv".to_string());
        assert!(config.validate().is_err());

        config.source_url = Some("http://example.com/data.csv".to_string());
        config.dataset_path = PathBuf::new();
        assert!(config.validate().is_err());

        config.dataset_path = PathBuf::from("data/housing.csv");
        config.default_query = "   ".to_string();
        assert!(config.validate().is_err());

        config.default_query = "SELECT 1".to_string();
        config.timeout_secs = 0;
        assert!(config.validate().is_err());

        config.timeout_secs = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_SOURCE_URL, "http://localhost:9000/housing.csv"),
            (ENV_DATABASE, "other.db"),
        ]);

        let config =
            PipelineConfig::default().with_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.source_url.as_deref(),
            Some("http://localhost:9000/housing.csv")
        );
        assert_eq!(config.database_path, PathBuf::from("other.db"));
        assert_eq!(config.dataset_path, PathBuf::from("data/housing.csv"));
    }

    #[test]
    fn test_partial_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            source_url = "https://example.com/housing.csv"
            timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(
            config.source_url.as_deref(),
            Some("https://example.com/housing.csv")
        );
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.query_log_path, PathBuf::from("query_log.md"));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_layers_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(
            &path,
            "source_url = \"https://example.com/from-file.csv\"\ndatabase_path = \"file.db\"\n",
        )
        .unwrap();

        std::env::set_var(ENV_DATABASE, "env.db");
        let config = PipelineConfig::load(Some(&path));
        std::env::remove_var(ENV_DATABASE);
        let config = config.unwrap();

        assert_eq!(
            config.source_url.as_deref(),
            Some("https://example.com/from-file.csv")
        );
        assert_eq!(config.database_path, PathBuf::from("env.db"));
    }

    #[test]
    fn test_toml_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            PipelineConfig::from_toml_file(&missing),
            Err(PipelineError::ConfigFile { .. })
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "timeout_secs = \"soon\"").unwrap();
        assert!(matches!(
            PipelineConfig::from_toml_file(&broken),
            Err(PipelineError::ConfigFile { .. })
        ));
    }
}
