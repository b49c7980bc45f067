//! Vald replication controller.
//!
//! Watches the agent pods of one application and asks surviving agents to
//! rebuild replicas whenever a member disappears or changes identity.
//!
//! ```bash
//! # Run against the current kube context
//! vald-replication run --name vald-agent --namespace vald
//!
//! # Show the resolved configuration
//! vald-replication config
//! ```

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vald_replication_config::{ConfigLoader, LoggingSettings, ReplicationConfig};

/// Vald replication controller - discovery and recovery of agent replicas.
#[derive(Parser)]
#[command(name = "vald-replication")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    sources: Sources,

    #[command(subcommand)]
    command: Commands,
}

/// Where configuration files are looked up.
#[derive(Args)]
struct Sources {
    /// Configuration file applied over project and user files.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory searched for vald-replication.toml.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run the controller until interrupted.
    Run(Overrides),

    /// Print the resolved configuration as TOML.
    Config(Overrides),
}

/// Command-line overrides; each takes precedence over every file and
/// environment source.
#[derive(Args, Default)]
struct Overrides {
    /// Application name of the agents to manage.
    #[arg(long)]
    name: Option<String>,

    /// Namespace the agents run in.
    #[arg(short, long)]
    namespace: Option<String>,

    /// Interval between recovery sweeps (e.g. 30s, 1m).
    #[arg(long)]
    recovery_check_duration: Option<String>,

    /// Pod label that groups agents by application.
    #[arg(long)]
    app_label: Option<String>,

    /// Port of the agents' replication service.
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive (RUST_LOG takes precedence).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

impl Overrides {
    fn apply(self, config: &mut ReplicationConfig) {
        if let Some(name) = self.name {
            config.controller.name = name;
        }
        if let Some(namespace) = self.namespace {
            config.controller.namespace = namespace;
        }
        if let Some(duration) = self.recovery_check_duration {
            config.controller.recovery_check_duration = duration;
        }
        if let Some(label) = self.app_label {
            config.kubernetes.app_label = label;
        }
        if let Some(port) = self.port {
            config.grpc.port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

fn load_config(sources: &Sources, overrides: Overrides) -> Result<ReplicationConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(dir) = &sources.project_dir {
        loader = loader.with_project_dir(dir);
    }
    if let Some(file) = &sources.config {
        loader = loader.with_config_file(file);
    }

    let mut config = loader.load()?;
    overrides.apply(&mut config);
    Ok(config)
}

fn init_logging(settings: &LoggingSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let Cli { sources, command } = Cli::parse();

    match command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Run(overrides) => {
            let config = load_config(&sources, overrides)?;
            init_logging(&config.logging);
            commands::run::run(&config)
        }
        Commands::Config(overrides) => {
            let config = load_config(&sources, overrides)?;
            commands::config::show(&config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_are_parsed() {
        let cli = Cli::parse_from([
            "vald-replication",
            "run",
            "--name",
            "vald-agent-ngt",
            "-n",
            "vald",
            "--recovery-check-duration",
            "30s",
            "--log-json",
        ]);

        let Commands::Run(overrides) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(overrides.name.as_deref(), Some("vald-agent-ngt"));
        assert_eq!(overrides.namespace.as_deref(), Some("vald"));
        assert_eq!(overrides.recovery_check_duration.as_deref(), Some("30s"));
        assert!(overrides.log_json);
    }

    #[test]
    fn overrides_replace_loaded_values() {
        let mut config = ReplicationConfig::default();
        Overrides {
            namespace: Some("vald".to_string()),
            port: Some(9090),
            ..Overrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.controller.namespace, "vald");
        assert_eq!(config.grpc.port, 9090);
        assert_eq!(config.controller.name, "vald-agent");
        assert!(!config.logging.json);
    }

    #[test]
    fn global_config_flag_feeds_the_loader() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("replication.toml");
        std::fs::write(&file, "[controller]\nnamespace = \"vald-prod\"\n").unwrap();

        let cli = Cli::parse_from([
            "vald-replication",
            "config",
            "--project-dir",
            dir.path().to_str().unwrap(),
            "--config",
            file.to_str().unwrap(),
        ]);
        let config = load_config(&cli.sources, Overrides::default()).unwrap();

        assert_eq!(config.controller.namespace, "vald-prod");
    }
}
