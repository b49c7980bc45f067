//! Path utilities and XDG directory discovery

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// File name of the project configuration.
pub const PROJECT_CONFIG_FILE: &str = "vald-replication.toml";

/// File name of the local, untracked override configuration.
pub const LOCAL_CONFIG_FILE: &str = "vald-replication.local.toml";

/// XDG-compliant paths for the replication controller
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    /// Create a new Paths instance with XDG discovery
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("org", "vdaas", "vald-replication"),
        }
    }

    /// Get user config directory (~/.config/vald-replication/)
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| {
                ConfigError::XdgError("Failed to determine user config directory".to_string())
            })
    }

    /// Get user config file path (~/.config/vald-replication/config.toml)
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// Get project config file path (vald-replication.toml)
    pub fn project_config_file(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(PROJECT_CONFIG_FILE)
    }

    /// Get local config file path (vald-replication.local.toml)
    pub fn local_config_file(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(LOCAL_CONFIG_FILE)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_xdg_paths() {
        let paths = Paths::new();

        if let Ok(config_file) = paths.user_config_file() {
            assert!(config_file.to_string_lossy().contains("vald-replication"));
            assert!(config_file.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_project_paths() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path();

        assert_eq!(
            Paths::project_config_file(dir),
            dir.join("vald-replication.toml")
        );
        assert_eq!(
            Paths::local_config_file(dir),
            dir.join("vald-replication.local.toml")
        );
    }
}
