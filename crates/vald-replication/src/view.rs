//! Immutable membership snapshots and their atomically-swapped holder.

use crate::MemberRecord;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The controller's best-known membership, keyed by member name.
///
/// A view is never mutated after construction; reconciliation builds a new
/// one and publishes it through [`ViewCell::swap`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterView {
    members: BTreeMap<String, MemberRecord>,
}

impl ClusterView {
    pub fn new(members: BTreeMap<String, MemberRecord>) -> Self {
        Self { members }
    }

    pub fn get(&self, name: &str) -> Option<&MemberRecord> {
        self.members.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberRecord> {
        self.members.values()
    }

    /// Addresses of every member, ordered by member name.
    pub fn addresses(&self) -> Vec<String> {
        self.members.values().map(|m| m.address.clone()).collect()
    }
}

impl FromIterator<MemberRecord> for ClusterView {
    fn from_iter<I: IntoIterator<Item = MemberRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|m| (m.name.clone(), m)).collect())
    }
}

/// Holds the current [`ClusterView`].
///
/// The lock only guards the pointer, so readers get a complete snapshot
/// and writers never block them for longer than an `Arc` clone.
#[derive(Debug, Default)]
pub struct ViewCell {
    current: RwLock<Option<Arc<ClusterView>>>,
}

impl ViewCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot, or `None` before the first publish.
    pub fn load(&self) -> Option<Arc<ClusterView>> {
        self.current.read().clone()
    }

    /// Publishes `view` and returns the snapshot it replaced.
    pub fn swap(&self, view: ClusterView) -> Option<Arc<ClusterView>> {
        self.swap_arc(Arc::new(view))
    }

    /// Like [`swap`](Self::swap), for callers that keep a handle on the new view.
    pub fn swap_arc(&self, view: Arc<ClusterView>) -> Option<Arc<ClusterView>> {
        self.current.write().replace(view)
    }

    pub fn is_populated(&self) -> bool {
        self.current.read().is_some()
    }
}
