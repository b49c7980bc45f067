//! Configuration management for the Vald replication controller
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (`VALD_REPLICATION_<SECTION>__<KEY>`)
//! 3. An explicit config file, if given
//! 4. vald-replication.local.toml (untracked, local overrides)
//! 5. vald-replication.toml (project config)
//! 6. ~/.config/vald-replication/config.toml (user defaults)
//! 7. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vald_replication::ControllerConfig;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main replication controller configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub controller: ControllerSettings,
    pub kubernetes: KubernetesSettings,
    pub grpc: GrpcSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Application name of the agents to manage.
    pub name: String,
    pub namespace: String,
    /// Kept as text: an unparsable value falls back to a short interval
    /// instead of failing the load.
    pub recovery_check_duration: String,
    pub error_buffer: usize,
    pub max_concurrent_recoveries: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            name: "vald-agent".to_string(),
            namespace: vald_replication::config::DEFAULT_NAMESPACE.to_string(),
            recovery_check_duration: "1m".to_string(),
            error_buffer: vald_replication::config::DEFAULT_ERROR_BUFFER,
            max_concurrent_recoveries: vald_replication::config::DEFAULT_MAX_CONCURRENT_RECOVERIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesSettings {
    /// Pod label whose value groups pods by application.
    pub app_label: String,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            app_label: "app".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcSettings {
    /// Port the agents serve the replication API on.
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for GrpcSettings {
    fn default() -> Self {
        Self {
            port: 8081,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ReplicationConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific directory
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(dir).load()
    }

    /// Builds the core controller configuration.
    pub fn controller_config(&self) -> ControllerConfig {
        let settings = &self.controller;
        ControllerConfig::new(&settings.name)
            .with_namespace(&settings.namespace)
            .with_recovery_check_duration_str(&settings.recovery_check_duration)
            .with_error_buffer(settings.error_buffer)
            .with_max_concurrent_recoveries(settings.max_concurrent_recoveries)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        if self.kubernetes.app_label.is_empty() {
            return Err(ConfigError::ValidationError(
                "kubernetes.app_label must not be empty".to_string(),
            ));
        }
        if self.grpc.port == 0 {
            return Err(ConfigError::ValidationError(
                "grpc.port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
