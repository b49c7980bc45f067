//! Replica member records as observed from the membership source.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One replica member (typically an agent pod) as currently known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Unique key within the namespace scope.
    pub name: String,

    /// Namespace the member lives in.
    pub namespace: String,

    /// Routable IP or host name.
    pub address: String,

    /// Host the member is scheduled on. A change here means the member was
    /// rescheduled even if its name is stable.
    pub node_name: String,
}

impl MemberRecord {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        address: impl Into<String>,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            address: address.into(),
            node_name: node_name.into(),
        }
    }

    /// Two records are equivalent (no recovery needed) iff every field matches.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for MemberRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({} on {})",
            self.namespace, self.name, self.address, self.node_name
        )
    }
}

/// A full membership listing, grouped by application name.
///
/// Membership sources group members by the application they belong to
/// (the `app` label of a pod, for instance); the controller's target name
/// selects one group.
pub type MemberSnapshot = BTreeMap<String, Vec<MemberRecord>>;
