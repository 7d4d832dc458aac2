//! Annotated rows: connection records joined with process metadata.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connection::{ConnectionRecord, UniqueKey};

/// Executable path of a process, or the reason it could not be read.
///
/// The two failure sentinels are deliberately distinct: an access-denied
/// path still identifies a live process the operator may act on, while an
/// unknown path usually means the process exited mid-scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "path")]
pub enum ExePath {
    Known(String),
    AccessDenied,
    Unknown,
}

impl ExePath {
    pub fn is_known(&self) -> bool {
        matches!(self, ExePath::Known(_))
    }
}

impl fmt::Display for ExePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExePath::Known(p) => write!(f, "{}", p),
            ExePath::AccessDenied => write!(f, "[Access Denied]"),
            ExePath::Unknown => Ok(()),
        }
    }
}

/// Resolved metadata for a pid, valid for one refresh cycle only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Display name of the process.
    pub name: String,

    /// Executable path, or a sentinel for denied/unknown.
    pub path: ExePath,

    /// Owning account name.
    pub account: String,
}

impl ProcessInfo {
    pub fn new(
        name: impl Into<String>,
        path: ExePath,
        account: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path,
            account: account.into(),
        }
    }

    /// Fixed identity for pid 0.
    pub fn idle() -> Self {
        Self::new("System Idle Process", ExePath::Unknown, "SYSTEM")
    }

    /// Fixed identity for pid 4 (kernel image).
    pub fn kernel() -> Self {
        Self::new("System", ExePath::Known("ntoskrnl.exe".to_string()), "SYSTEM")
    }

    /// Soft-failure identity for a process that vanished between table
    /// enumeration and metadata resolution.
    pub fn exited() -> Self {
        Self::new("Unknown (Exited)", ExePath::Unknown, "Unknown")
    }
}

/// Change classification of a row relative to the previous snapshot.
///
/// Transient UI signaling only; never part of row identity. Cleared back
/// to `None` after the visibility window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeState {
    #[default]
    None,
    New,
    Changed,
}

/// A connection record joined with its process metadata, protection flag,
/// and change classification. Owned by one refresh cycle; the presentation
/// layer only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedRow {
    /// Unique identifier for this row instance.
    pub id: Uuid,

    #[serde(flatten)]
    pub record: ConnectionRecord,

    pub process: ProcessInfo,

    /// Protected rows are never included in a kill set.
    pub protected: bool,

    pub change: ChangeState,
}

impl AnnotatedRow {
    pub fn new(record: ConnectionRecord, process: ProcessInfo, protected: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            record,
            process,
            protected,
            change: ChangeState::None,
        }
    }

    pub fn unique_key(&self) -> UniqueKey {
        self.record.unique_key()
    }

    /// Key clustering connections that belong to the same running program.
    ///
    /// The process name is qualified by the executable path only when the
    /// path is actually known; sentinel paths fall back to the bare name so
    /// access-denied rows of the same program still group together.
    pub fn group_key(&self) -> String {
        match &self.process.path {
            ExePath::Known(p) => format!("{} ({})", self.process.name, p),
            _ => self.process.name.clone(),
        }
    }

    /// Search match across the row's displayable fields.
    pub fn matches_query(&self, query: &str) -> bool {
        if query.trim().is_empty() {
            return true;
        }

        let q = query.trim().to_lowercase();
        self.record.local_port.to_string().contains(&q)
            || self.record.pid.to_string().contains(&q)
            || self.process.name.to_lowercase().contains(&q)
            || self.process.path.to_string().to_lowercase().contains(&q)
            || self.record.local_addr.to_string().contains(&q)
            || self.record.protocol.to_string().to_lowercase().contains(&q)
            || self.record.state.to_string().to_lowercase().contains(&q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::connection::{ConnState, Protocol};
    use std::net::Ipv4Addr;

    fn row(name: &str, path: ExePath) -> AnnotatedRow {
        let record = ConnectionRecord {
            protocol: Protocol::Tcp,
            local_addr: Ipv4Addr::new(127, 0, 0, 1),
            local_port: 3000,
            remote_addr: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            state: ConnState::Listen,
            pid: 1234,
        };
        AnnotatedRow::new(record, ProcessInfo::new(name, path, "dev"), false)
    }

    #[test]
    fn test_group_key_with_known_path() {
        let r = row("node", ExePath::Known("/usr/bin/node".to_string()));
        assert_eq!(r.group_key(), "node (/usr/bin/node)");
    }

    #[test]
    fn test_group_key_falls_back_on_sentinel_path() {
        assert_eq!(row("svchost", ExePath::AccessDenied).group_key(), "svchost");
        assert_eq!(row("svchost", ExePath::Unknown).group_key(), "svchost");
    }

    #[test]
    fn test_exe_path_display() {
        assert_eq!(ExePath::AccessDenied.to_string(), "[Access Denied]");
        assert_eq!(ExePath::Unknown.to_string(), "");
        assert_eq!(ExePath::Known("/bin/sh".into()).to_string(), "/bin/sh");
    }

    #[test]
    fn test_sentinel_identities() {
        assert_eq!(ProcessInfo::idle().name, "System Idle Process");
        assert_eq!(ProcessInfo::kernel().name, "System");
        assert!(ProcessInfo::kernel().path.is_known());
        assert_eq!(ProcessInfo::exited().name, "Unknown (Exited)");
    }

    #[test]
    fn test_matches_query() {
        let r = row("node", ExePath::Known("/usr/bin/node".to_string()));
        assert!(r.matches_query(""));
        assert!(r.matches_query("3000"));
        assert!(r.matches_query("NODE"));
        assert!(r.matches_query("listen"));
        assert!(r.matches_query("tcp"));
        assert!(!r.matches_query("nginx"));
    }
}
