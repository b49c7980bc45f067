//! Error types for the replication controller.

use std::fmt;
use thiserror::Error;

/// Boxed error returned by pluggable collaborators (watchers, RPC clients).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Replication controller errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid controller configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// `start` was called on a controller that is already running.
    #[error("Replication controller already started")]
    AlreadyStarted,

    /// The membership watch could not be established.
    #[error("Failed to start membership watch: {0}")]
    WatchStart(#[source] BoxError),

    /// The membership watch reported a failure after it was established.
    #[error("Membership watch error: {0}")]
    Watch(#[source] BoxError),

    /// A recovery request to a single member failed.
    #[error("Recovery request for {name} ({address}) failed: {source}")]
    RecoveryFailed {
        name: String,
        address: String,
        #[source]
        source: BoxError,
    },

    /// One or more recovery requests failed during a sweep.
    #[error("Recovery sweep failed: {0}")]
    Sweep(SweepFailures),

    /// A background task could not be joined.
    #[error("Task failed: {0}")]
    Task(String),
}

impl Error {
    /// Wraps any collaborator error as a watch-start failure.
    pub fn watch_start(err: impl Into<BoxError>) -> Self {
        Self::WatchStart(err.into())
    }

    /// Wraps any collaborator error as a runtime watch failure.
    pub fn watch(err: impl Into<BoxError>) -> Self {
        Self::Watch(err.into())
    }

    /// Names of the members whose recovery failed, if this is a sweep error.
    pub fn failed_members(&self) -> Vec<&str> {
        match self {
            Self::Sweep(failures) => failures.member_names().collect(),
            Self::RecoveryFailed { name, .. } => vec![name.as_str()],
            _ => Vec::new(),
        }
    }
}

/// All per-member failures collected during one sweep.
#[derive(Debug)]
pub struct SweepFailures(pub Vec<Error>);

impl SweepFailures {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }

    fn member_names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|err| match err {
            Error::RecoveryFailed { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for SweepFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} member(s) failed", self.0.len())?;
        for err in &self.0 {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

/// Result type for replication controller operations.
pub type Result<T> = std::result::Result<T, Error>;
