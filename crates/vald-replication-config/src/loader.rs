//! Configuration loader with multi-source merging

use crate::{ConfigError, Paths, ReplicationConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    config_file: Option<PathBuf>,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            env_prefix: "VALD_REPLICATION".to_string(),
            include_user_config: true,
        }
    }

    /// Set the directory searched for project and local config files
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Add an explicit config file; it must exist
    pub fn with_config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix (default: "VALD_REPLICATION")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/vald-replication/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<ReplicationConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = ReplicationConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/vald-replication/config.toml)
        if self.include_user_config {
            if let Ok(user_config_file) = Paths::new().user_config_file() {
                if user_config_file.exists() {
                    builder = builder.add_source(toml_file(user_config_file));
                }
            }
        }

        // 3. Project config (vald-replication.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(toml_file(project_config_file));
        }

        // 4. Local config (vald-replication.local.toml)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(toml_file(local_config_file));
        }

        // 5. Explicit config file
        if let Some(path) = self.config_file {
            if !path.exists() {
                return Err(ConfigError::ReadError {
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                    path,
                }
                .into());
            }
            builder = builder.add_source(toml_file(path).required(true));
        }

        // 6. Environment variables (VALD_REPLICATION_CONTROLLER__NAME=...)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let replication_config: ReplicationConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(replication_config)
    }

    /// Load configuration or return defaults if loading fails
    pub fn load_or_default(self) -> ReplicationConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn toml_file(path: PathBuf) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .required(false)
        .format(config::FileFormat::Toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("VALD_REPLICATION_TEST_UNUSED")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path())
            .load()
            .expect("Failed to load config");

        assert_eq!(config, ReplicationConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[controller]
name = "vald-agent-ngt"
namespace = "vald"
recovery_check_duration = "30s"

[grpc]
port = 8082
request_timeout = "2s"
"#;
        fs::write(project_dir.join("vald-replication.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.controller.name, "vald-agent-ngt");
        assert_eq!(config.controller.namespace, "vald");
        assert_eq!(config.controller.recovery_check_duration, "30s");
        assert_eq!(config.grpc.port, 8082);
        assert_eq!(config.grpc.request_timeout, Duration::from_secs(2));
        // Untouched keys keep their defaults.
        assert_eq!(config.grpc.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.kubernetes.app_label, "app");
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("vald-replication.toml"),
            "[controller]\nnamespace = \"vald\"\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("vald-replication.local.toml"),
            "[controller]\nnamespace = \"vald-dev\"\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.controller.namespace, "vald-dev");
    }

    #[test]
    fn test_explicit_file_wins_over_project_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        let explicit = project_dir.join("override.toml");

        fs::write(
            project_dir.join("vald-replication.toml"),
            "[logging]\nlevel = \"debug\"\n",
        )
        .expect("Failed to write project config");
        fs::write(&explicit, "[logging]\nlevel = \"warn\"\njson = true\n")
            .expect("Failed to write explicit config");

        let config = loader(project_dir)
            .with_config_file(&explicit)
            .load()
            .expect("Failed to load config");

        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = tempdir().expect("Failed to create temp dir");

        let err = loader(temp_dir.path())
            .with_config_file(temp_dir.path().join("missing.toml"))
            .load()
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ReadError { .. })
        ));
    }

    // Environment overrides are not exercised here because the process
    // environment is shared between tests. They follow the pattern
    // VALD_REPLICATION_CONTROLLER__NAMESPACE=vald.
}
