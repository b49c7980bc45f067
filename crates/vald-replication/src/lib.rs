//! Replica discovery and recovery for Vald agent clusters.
//!
//! Keeps a consistent view of replica membership and drives recovery of
//! members whose identity changed:
//! - A membership watcher delivers full listings to the reconcile engine
//! - Each listing replaces the cluster view atomically
//! - Members that changed or vanished are queued for recovery
//! - A periodic sweep sends recovery requests and retries failures
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use vald_replication::*;
//! # use tokio_util::sync::CancellationToken;
//! # async fn run(
//! #     watcher: Arc<dyn MembershipWatcher>,
//! #     client: Arc<dyn RecoveryClient>,
//! # ) -> Result<()> {
//! let config = ControllerConfig::new("vald-agent")
//!     .with_namespace("vald")
//!     .with_recovery_check_duration_str("1m");
//! let controller = ReplicationController::new(config, watcher, client)?;
//!
//! let cancel = CancellationToken::new();
//! let mut errors = controller.start(cancel.clone()).await?;
//! println!("{:?}", controller.current_pod_ips());
//! while let Some(err) = errors.recv().await {
//!     eprintln!("{err}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod member;
pub mod pending;
pub mod reconcile;
pub mod recovery;
pub mod view;
pub mod watcher;

pub use config::ControllerConfig;
pub use controller::ReplicationController;
pub use error::{BoxError, Error, Result, SweepFailures};
pub use member::{MemberRecord, MemberSnapshot};
pub use pending::PendingRecoverySet;
pub use reconcile::{Reconcile, ReconcileEngine, ReconcileOutcome, Scope};
pub use recovery::{RecoveryClient, RecoveryDriver};
pub use view::{ClusterView, ViewCell};
pub use watcher::{ChannelWatcher, MembershipWatcher, WatchFeed};
