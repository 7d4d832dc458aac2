//! Data model: connection records, annotated rows, and snapshots.

mod connection;
mod row;
mod snapshot;

pub use connection::{ConnState, ConnectionRecord, Protocol, UniqueKey};
pub use row::{AnnotatedRow, ChangeState, ExePath, ProcessInfo};
pub use snapshot::{ConnectionSnapshot, SnapshotSummary};
