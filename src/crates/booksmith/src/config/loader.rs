//! Layered configuration loader
//!
//! Loads configuration from, in increasing precedence:
//! 1. Default values
//! 2. User-level config: ~/.booksmith/booksmith.toml
//! 3. Project-level config: ./.booksmith/booksmith.toml
//! 4. An explicit file passed with `--config`
//! 5. `BOOKSMITH_*` environment variables
//!
//! Files are merged key by key, so a file that sets one field of a section leaves the
//! rest of that section as the lower layers had it. Command-line flags are applied by
//! the binary on top of the result.

use super::schema::BooksmithConfig;
use super::ConfigError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tooling::config::{get_env_bool, override_from_env};
use tracing::{debug, info};

/// Prefix of the environment variables read by the loader
pub const ENV_PREFIX: &str = "BOOKSMITH";

/// File name looked up in the user and project directories
pub const CONFIG_FILE_NAME: &str = "booksmith.toml";

/// Configuration loader that handles user, project and explicit configs
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: PathBuf,
    explicit_path: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            user_config_path: Self::user_config_path(),
            project_config_path: Self::project_config_path(),
            explicit_path: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Get user-level config path (~/.booksmith/booksmith.toml)
    fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".booksmith").join(CONFIG_FILE_NAME))
    }

    /// Get project-level config path (./.booksmith/booksmith.toml)
    fn project_config_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".booksmith")
            .join(CONFIG_FILE_NAME)
    }

    /// Add a file that must exist and overrides both default locations
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// Replace the user and project locations
    pub fn with_paths(mut self, user: Option<PathBuf>, project: impl Into<PathBuf>) -> Self {
        self.user_config_path = user;
        self.project_config_path = project.into();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn user_path(&self) -> Option<&Path> {
        self.user_config_path.as_deref()
    }

    pub fn project_path(&self) -> &Path {
        &self.project_config_path
    }

    /// Load and merge every layer
    ///
    /// Missing user or project files are skipped; a missing explicit file is an error.
    /// The result is not validated, since command-line overrides still follow.
    pub async fn load(&self) -> Result<BooksmithConfig, ConfigError> {
        let mut merged = toml::Value::try_from(BooksmithConfig::default())
            .map_err(|e| ConfigError::Invalid(format!("default configuration: {}", e)))?;

        let optional = self.user_config_path.iter().chain(std::iter::once(&self.project_config_path));
        for path in optional {
            if !fs::try_exists(path).await.unwrap_or(false) {
                debug!(path = %path.display(), "Config file not found, skipping");
                continue;
            }
            merge_tables(&mut merged, Self::read_table(path).await?);
            debug!(path = %path.display(), "Loaded config file");
        }

        if let Some(path) = &self.explicit_path {
            merge_tables(&mut merged, Self::read_table(path).await?);
            debug!(path = %path.display(), "Loaded explicit config file");
        }

        let mut config: BooksmithConfig = merged.try_into().map_err(|e: toml::de::Error| ConfigError::Parse {
            path: self
                .explicit_path
                .clone()
                .unwrap_or_else(|| self.project_config_path.clone()),
            message: e.to_string(),
        })?;

        let applied = self.apply_env_overrides(&mut config)?;
        if !applied.is_empty() {
            debug!(overrides = ?applied, "Applied environment overrides");
        }

        info!("Configuration loaded");
        Ok(config)
    }

    async fn read_table(path: &Path) -> Result<toml::Value, ConfigError> {
        let content = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content
            .parse::<toml::Table>()
            .map(toml::Value::Table)
            .map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Apply `<PREFIX>_*` variables to `config`
    ///
    /// Returns the variables that were applied.
    pub fn apply_env_overrides(&self, config: &mut BooksmithConfig) -> Result<Vec<String>, ConfigError> {
        let key = |suffix: &str| format!("{}_{}", self.env_prefix, suffix);
        let mut applied = Vec::new();

        macro_rules! apply {
            ($suffix:literal, $target:expr) => {{
                let name = key($suffix);
                if override_from_env(&name, $target)? {
                    applied.push(name);
                }
            }};
        }

        apply!("MODEL", &mut config.llm.model);
        apply!("BASE_URL", &mut config.llm.base_url);
        apply!("CONCURRENCY", &mut config.scheduler.concurrency);
        apply!("CHECKPOINT_DIR", &mut config.checkpoint.dir);
        apply!("OUTPUT_DIR", &mut config.assembly.output_dir);

        let name = key("REQUESTS_PER_MINUTE");
        if override_from_env(&name, &mut config.limits.requests_per_window)? {
            config.limits.window_secs = 60;
            applied.push(name);
        }

        let name = key("LOG_JSON");
        if let Some(json) = get_env_bool(&name)? {
            config.logging.json = json;
            applied.push(name);
        }

        Ok(applied)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `overlay` into `base`, descending into tables present on both sides
fn merge_tables(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                let nested = value.is_table() && base.get(&key).is_some_and(toml::Value::is_table);
                match base.get_mut(&key) {
                    Some(existing) if nested => merge_tables(existing, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::FrontierPolicy;
    use tempfile::TempDir;

    fn loader_for(dir: &TempDir, prefix: &str) -> ConfigLoader {
        ConfigLoader::new()
            .with_paths(Some(dir.path().join("user.toml")), dir.path().join("project.toml"))
            .with_env_prefix(prefix)
    }

    #[tokio::test]
    async fn test_defaults_when_no_files() {
        let dir = TempDir::new().unwrap();
        let config = loader_for(&dir, "BOOKSMITH_TEST_NONE").load().await.unwrap();
        assert_eq!(config, BooksmithConfig::default());
    }

    #[tokio::test]
    async fn test_project_overrides_user_field_by_field() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("user.toml"),
            r#"
[llm]
model = "sonar"
temperature = 0.5

[scheduler]
concurrency = 5
"#,
        )
        .await
        .unwrap();
        fs::write(
            dir.path().join("project.toml"),
            r#"
[llm]
temperature = 0.9

[scheduler]
frontier = "wave"
"#,
        )
        .await
        .unwrap();

        let config = loader_for(&dir, "BOOKSMITH_TEST_LAYERS").load().await.unwrap();

        assert_eq!(config.llm.model, "sonar");
        assert_eq!(config.llm.temperature, 0.9);
        assert_eq!(config.scheduler.concurrency, 5);
        assert_eq!(config.scheduler.frontier, FrontierPolicy::Wave);
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn test_explicit_file_wins_and_must_exist() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("project.toml"), "[assembly]\nauthor = \"Project\"\n")
            .await
            .unwrap();
        let explicit = dir.path().join("explicit.toml");
        fs::write(&explicit, "[assembly]\nauthor = \"Explicit\"\n").await.unwrap();

        let config = loader_for(&dir, "BOOKSMITH_TEST_EXPLICIT")
            .with_explicit(&explicit)
            .load()
            .await
            .unwrap();
        assert_eq!(config.assembly.author, "Explicit");

        let err = loader_for(&dir, "BOOKSMITH_TEST_EXPLICIT")
            .with_explicit(dir.path().join("missing.toml"))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn test_malformed_file_names_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("project.toml"), "[llm\nmodel = ").await.unwrap();

        let err = loader_for(&dir, "BOOKSMITH_TEST_MALFORMED").load().await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("project.toml"));
    }

    #[tokio::test]
    async fn test_wrong_type_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("project.toml"), "[scheduler]\nconcurrency = \"many\"\n")
            .await
            .unwrap();

        let err = loader_for(&dir, "BOOKSMITH_TEST_TYPES").load().await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("BOOKSMITH_TEST_ENV_MODEL", "sonar-pro");
        std::env::set_var("BOOKSMITH_TEST_ENV_CONCURRENCY", "6");
        std::env::set_var("BOOKSMITH_TEST_ENV_LOG_JSON", "yes");

        let loader = ConfigLoader::new().with_env_prefix("BOOKSMITH_TEST_ENV");
        let mut config = BooksmithConfig::default();
        let applied = loader.apply_env_overrides(&mut config).unwrap();

        assert_eq!(config.llm.model, "sonar-pro");
        assert_eq!(config.scheduler.concurrency, 6);
        assert!(config.logging.json);
        assert_eq!(applied.len(), 3);

        std::env::remove_var("BOOKSMITH_TEST_ENV_MODEL");
        std::env::remove_var("BOOKSMITH_TEST_ENV_CONCURRENCY");
        std::env::remove_var("BOOKSMITH_TEST_ENV_LOG_JSON");
    }

    #[test]
    fn test_invalid_env_value_is_an_error() {
        std::env::set_var("BOOKSMITH_TEST_BAD_CONCURRENCY", "lots");
        let loader = ConfigLoader::new().with_env_prefix("BOOKSMITH_TEST_BAD");
        let err = loader
            .apply_env_overrides(&mut BooksmithConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("BOOKSMITH_TEST_BAD_CONCURRENCY"));
        std::env::remove_var("BOOKSMITH_TEST_BAD_CONCURRENCY");
    }
}
