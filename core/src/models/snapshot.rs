//! Published snapshots: the engine's sole output contract.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::connection::{ConnState, Protocol, UniqueKey};
use super::row::AnnotatedRow;

/// Per-refresh summary counts published alongside the rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Total rows after deduplication.
    pub total: usize,
    pub tcp: usize,
    pub udp: usize,
    /// Distinct owning processes with a real pid.
    pub processes: usize,
}

/// The ordered, deduplicated result of one refresh cycle.
///
/// Rows are sorted by local port descending with the original enumeration
/// order as the tie-break. No two rows share a `UniqueKey`. A snapshot
/// replaces its predecessor atomically; snapshots are never merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub rows: Vec<AnnotatedRow>,
    pub summary: SnapshotSummary,
}

impl ConnectionSnapshot {
    /// Build a snapshot from freshly annotated rows: deduplicate by
    /// `UniqueKey` (first occurrence wins), sort, and compute the summary.
    pub fn from_rows(rows: Vec<AnnotatedRow>) -> Self {
        let mut seen: HashSet<UniqueKey> = HashSet::with_capacity(rows.len());
        let mut deduped: Vec<AnnotatedRow> = rows
            .into_iter()
            .filter(|row| seen.insert(row.unique_key()))
            .collect();

        // Stable sort keeps enumeration order for equal ports.
        deduped.sort_by(|a, b| b.record.local_port.cmp(&a.record.local_port));

        let summary = Self::summarize(&deduped);
        Self {
            rows: deduped,
            summary,
        }
    }

    fn summarize(rows: &[AnnotatedRow]) -> SnapshotSummary {
        let tcp = rows
            .iter()
            .filter(|r| r.record.protocol == Protocol::Tcp)
            .count();
        let processes = rows
            .iter()
            .filter(|r| r.record.pid > 0)
            .map(|r| r.record.pid)
            .collect::<HashSet<_>>()
            .len();

        SnapshotSummary {
            total: rows.len(),
            tcp,
            udp: rows.len() - tcp,
            processes,
        }
    }

    /// Key -> state map used by the differencer on the next cycle.
    pub fn key_states(&self) -> HashMap<UniqueKey, ConnState> {
        self.rows
            .iter()
            .map(|r| (r.unique_key(), r.record.state))
            .collect()
    }

    /// Current key set, consumed by verification reconciliation.
    pub fn key_set(&self) -> HashSet<UniqueKey> {
        self.rows.iter().map(|r| r.unique_key()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::connection::ConnectionRecord;
    use crate::models::row::{ExePath, ProcessInfo};
    use std::net::Ipv4Addr;

    fn row(protocol: Protocol, port: u16, pid: u32) -> AnnotatedRow {
        let record = ConnectionRecord {
            protocol,
            local_addr: Ipv4Addr::new(10, 0, 0, 1),
            local_port: port,
            remote_addr: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            state: if protocol == Protocol::Tcp {
                ConnState::Listen
            } else {
                ConnState::Unspecified
            },
            pid,
        };
        AnnotatedRow::new(
            record,
            ProcessInfo::new("test", ExePath::Unknown, "user"),
            false,
        )
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut first = row(Protocol::Tcp, 80, 1);
        first.process.name = "first".to_string();
        let mut dup = row(Protocol::Tcp, 80, 1);
        dup.process.name = "second".to_string();

        let snapshot = ConnectionSnapshot::from_rows(vec![first, dup]);
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.rows[0].process.name, "first");
    }

    #[test]
    fn test_sorted_by_local_port_descending() {
        let snapshot = ConnectionSnapshot::from_rows(vec![
            row(Protocol::Tcp, 80, 1),
            row(Protocol::Tcp, 8080, 2),
            row(Protocol::Udp, 443, 3),
        ]);
        let ports: Vec<u16> = snapshot.rows.iter().map(|r| r.record.local_port).collect();
        assert_eq!(ports, vec![8080, 443, 80]);
    }

    #[test]
    fn test_equal_ports_keep_enumeration_order() {
        let mut a = row(Protocol::Tcp, 53, 1);
        a.process.name = "a".to_string();
        let mut b = row(Protocol::Udp, 53, 1);
        b.process.name = "b".to_string();

        let snapshot = ConnectionSnapshot::from_rows(vec![a, b]);
        assert_eq!(snapshot.rows[0].process.name, "a");
        assert_eq!(snapshot.rows[1].process.name, "b");
    }

    #[test]
    fn test_summary_counts() {
        let snapshot = ConnectionSnapshot::from_rows(vec![
            row(Protocol::Tcp, 80, 100),
            row(Protocol::Tcp, 443, 100),
            row(Protocol::Udp, 53, 200),
            row(Protocol::Udp, 123, 0), // idle pid excluded from process count
        ]);

        assert_eq!(snapshot.summary.total, 4);
        assert_eq!(snapshot.summary.tcp, 2);
        assert_eq!(snapshot.summary.udp, 2);
        assert_eq!(snapshot.summary.processes, 2);
    }

    #[test]
    fn test_no_duplicate_keys_invariant() {
        let rows: Vec<AnnotatedRow> = (0..10)
            .map(|i| row(Protocol::Tcp, 80, i % 3))
            .collect();
        let snapshot = ConnectionSnapshot::from_rows(rows);
        assert_eq!(snapshot.rows.len(), snapshot.key_set().len());
    }
}
