//! Kubernetes membership source for the Vald replication controller.
//!
//! [`PodWatcher`] lists and watches the pods of one namespace, groups the
//! running ones by their app label and hands every full listing to the
//! reconcile engine.

mod pod;
mod watcher;

pub use pod::{DEFAULT_APP_LABEL, member_from_pod, snapshot_from_pods};
pub use watcher::PodWatcher;
