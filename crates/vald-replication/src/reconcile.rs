//! Turns raw membership listings into cluster views and pending recoveries.

use crate::{ClusterView, MemberRecord, MemberSnapshot, PendingRecoverySet, ViewCell};
use std::sync::Arc;
use tracing::{debug, info};

/// Receives full membership listings from a [`MembershipWatcher`].
///
/// Watchers call this serially; implementations may assume they are never
/// invoked concurrently with themselves.
///
/// [`MembershipWatcher`]: crate::MembershipWatcher
pub trait Reconcile: Send + Sync {
    fn reconcile(&self, members: &MemberSnapshot);
}

/// The application name and namespace a controller is responsible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub name: String,
    pub namespace: String,
}

impl Scope {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Selects the in-scope members from a full listing.
    pub fn select<'a>(
        &'a self,
        members: &'a MemberSnapshot,
    ) -> impl Iterator<Item = &'a MemberRecord> + 'a {
        members
            .get(&self.name)
            .into_iter()
            .flatten()
            .filter(|m| m.namespace == self.namespace)
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Number of in-scope members in the published view.
    pub members: usize,

    /// Names queued for recovery by this pass, in name order.
    pub newly_pending: Vec<String>,
}

/// Diffs each listing against the current view and queues stale members.
#[derive(Debug)]
pub struct ReconcileEngine {
    scope: Scope,
    view: Arc<ViewCell>,
    pending: Arc<PendingRecoverySet>,
}

impl ReconcileEngine {
    pub fn new(scope: Scope, view: Arc<ViewCell>, pending: Arc<PendingRecoverySet>) -> Self {
        Self {
            scope,
            view,
            pending,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Publishes the in-scope members of `members` as the new view.
    ///
    /// Every member of the previous view that disappeared or whose record
    /// changed is queued with its *previous* record. Members that were not
    /// known before need no recovery.
    pub fn apply(&self, members: &MemberSnapshot) -> ReconcileOutcome {
        debug!(
            scope = %self.scope.name,
            namespace = %self.scope.namespace,
            ?members,
            "reconciling membership"
        );

        let next: ClusterView = self.scope.select(members).cloned().collect();
        let size = next.len();
        let next = Arc::new(next);
        let previous = self.view.swap_arc(Arc::clone(&next));

        let mut newly_pending = Vec::new();
        if let Some(previous) = previous {
            for old in previous.iter() {
                let changed = next
                    .get(&old.name)
                    .is_none_or(|current| !current.is_equivalent(old));
                if changed && self.pending.insert_if_absent(old.clone()) {
                    info!(
                        name = %old.name,
                        address = %old.address,
                        node = %old.node_name,
                        "member changed, queued for recovery"
                    );
                    newly_pending.push(old.name.clone());
                }
            }
        }

        ReconcileOutcome {
            members: size,
            newly_pending,
        }
    }
}

impl Reconcile for ReconcileEngine {
    fn reconcile(&self, members: &MemberSnapshot) {
        let outcome = self.apply(members);
        debug!(
            members = outcome.members,
            queued = outcome.newly_pending.len(),
            "reconciliation complete"
        );
    }
}
