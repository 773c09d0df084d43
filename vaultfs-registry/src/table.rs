//! Membership tables

use dashmap::DashMap;
use vaultfs_common::epoch_ms;

/// One registered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// `host:port` the node can be dialed at. Table key.
    pub address: String,
    /// Advertised free space in bytes; zero for name services.
    pub free_space: i64,
    /// Epoch-ms of the last register or heartbeat.
    pub last_heartbeat: i64,
}

/// Concurrent address → record table for one role.
///
/// Register and heartbeat are the same upsert. Expired entries are removed
/// by the periodic sweep and opportunistically by [`NodeTable::active`],
/// so a list never reports a node past its timeout even between sweeps.
#[derive(Debug)]
pub struct NodeTable {
    nodes: DashMap<String, NodeRecord>,
    timeout_ms: i64,
}

impl NodeTable {
    #[must_use]
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            nodes: DashMap::new(),
            timeout_ms: i64::try_from(timeout_ms).unwrap_or(i64::MAX),
        }
    }

    /// Insert or refresh a member, stamping it with the current time.
    pub fn upsert(&self, address: &str, free_space: i64) {
        self.nodes.insert(
            address.to_owned(),
            NodeRecord {
                address: address.to_owned(),
                free_space,
                last_heartbeat: epoch_ms(),
            },
        );
    }

    /// Active members. Expired entries encountered on the way are evicted.
    #[must_use]
    pub fn active(&self) -> Vec<NodeRecord> {
        let now = epoch_ms();
        let mut live = Vec::new();
        let mut dead = Vec::new();
        for entry in &self.nodes {
            if now - entry.last_heartbeat <= self.timeout_ms {
                live.push(entry.clone());
            } else {
                dead.push((entry.address.clone(), entry.last_heartbeat));
            }
        }
        for (address, seen_at) in dead {
            // Only remove if no heartbeat arrived since we looked.
            self.nodes
                .remove_if(&address, |_, record| record.last_heartbeat == seen_at);
        }
        live.sort_by(|a, b| a.address.cmp(&b.address));
        live
    }

    /// Remove expired members; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = epoch_ms();
        let expired: Vec<(String, i64)> = self
            .nodes
            .iter()
            .filter(|entry| now - entry.last_heartbeat > self.timeout_ms)
            .map(|entry| (entry.address.clone(), entry.last_heartbeat))
            .collect();
        let mut removed = 0;
        for (address, seen_at) in expired {
            if self
                .nodes
                .remove_if(&address, |_, record| record.last_heartbeat == seen_at)
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_upsert_and_active() {
        let table = NodeTable::new(30_000);
        table.upsert("a:1", 100);
        table.upsert("b:2", 200);
        table.upsert("a:1", 150);

        let active = table.active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].address, "a:1");
        assert_eq!(active[0].free_space, 150);
    }

    #[test]
    fn test_active_evicts_expired() {
        let table = NodeTable::new(5);
        table.upsert("a:1", 0);
        std::thread::sleep(Duration::from_millis(20));
        assert!(table.active().is_empty());
        // Eviction happened on read, not just filtering.
        assert!(table.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let table = NodeTable::new(50);
        table.upsert("old:1", 0);
        std::thread::sleep(Duration::from_millis(80));
        table.upsert("new:1", 0);
        assert_eq!(table.sweep(), 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.active()[0].address, "new:1");
    }

    #[test]
    fn test_heartbeat_revives() {
        let table = NodeTable::new(50);
        table.upsert("a:1", 0);
        std::thread::sleep(Duration::from_millis(80));
        table.upsert("a:1", 7);
        assert_eq!(table.sweep(), 0);
        assert_eq!(table.active().len(), 1);
    }
}
