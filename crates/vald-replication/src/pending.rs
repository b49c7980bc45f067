//! Members awaiting a successful recovery request.

use crate::MemberRecord;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Concurrent set of members that changed since they were last known-good.
///
/// Keyed by member name. An entry that is already present is never
/// overwritten; it keeps the stale record it was first queued with until a
/// recovery attempt takes it out.
#[derive(Debug, Default)]
pub struct PendingRecoverySet {
    entries: DashMap<String, MemberRecord>,
}

impl PendingRecoverySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `record` unless its name is already pending.
    ///
    /// Returns `true` if the record was inserted.
    pub fn insert_if_absent(&self, record: MemberRecord) -> bool {
        match self.entries.entry(record.name.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Removes and returns the entry for `name`, if any.
    pub fn take(&self, name: &str) -> Option<MemberRecord> {
        self.entries.remove(name).map(|(_, record)| record)
    }

    pub fn get(&self, name: &str) -> Option<MemberRecord> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the current entries, ordered by name.
    pub fn snapshot(&self) -> Vec<MemberRecord> {
        let mut records: Vec<MemberRecord> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn member(name: &str, address: &str) -> MemberRecord {
        MemberRecord::new(name, "vald", address, "node-a")
    }

    #[test]
    fn insert_does_not_overwrite_pending_entry() {
        let pending = PendingRecoverySet::new();

        assert!(pending.insert_if_absent(member("agent-0", "10.0.0.1")));
        assert!(!pending.insert_if_absent(member("agent-0", "10.0.0.2")));

        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get("agent-0").unwrap().address, "10.0.0.1");
    }

    #[test]
    fn take_removes_entry() {
        let pending = PendingRecoverySet::new();
        pending.insert_if_absent(member("agent-0", "10.0.0.1"));

        let taken = pending.take("agent-0").unwrap();
        assert_eq!(taken.address, "10.0.0.1");
        assert!(pending.is_empty());
        assert!(pending.take("agent-0").is_none());
    }

    #[test]
    fn snapshot_is_sorted_copy() {
        let pending = PendingRecoverySet::new();
        pending.insert_if_absent(member("agent-2", "10.0.0.3"));
        pending.insert_if_absent(member("agent-1", "10.0.0.2"));

        let names: Vec<_> = pending.snapshot().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["agent-1", "agent-2"]);

        // The snapshot is detached from the live set.
        pending.take("agent-1");
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn concurrent_inserts_are_deduplicated() {
        let pending = Arc::new(PendingRecoverySet::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pending = Arc::clone(&pending);
                std::thread::spawn(move || {
                    pending.insert_if_absent(member("agent-0", &format!("10.0.0.{i}")))
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(pending.len(), 1);
    }
}
