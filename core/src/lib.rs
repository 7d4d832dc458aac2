//! ConnWatch Core Library
//!
//! Cross-platform library for live TCP/UDP connection monitoring.
//! Provides functionality to:
//! - Enumerate IPv4 connections from the OS owner-pid tables
//! - Correlate connections with process metadata (name, path, account)
//! - Classify rows as new/changed between refresh cycles
//! - Kill owning processes and verify the ports were actually released
//! - Coordinate periodic refreshes with overlap protection
//!
//! # Architecture
//! The engine is generic over three capability traits so every pipeline
//! stage can be exercised with test doubles:
//! - `table::TableSource`: raw owner-pid table enumeration
//! - `resolver::ProcessMetadataSource`: pid metadata lookup
//! - `killer::ProcessTerminator`: process termination
//!
//! # Platform Support
//! - Linux: `/proc/net/{tcp,udp}` plus `/proc/<pid>` inode correlation
//! - Windows: `GetExtendedTcpTable` / `GetExtendedUdpTable`

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod killer;
pub mod models;
pub mod policy;
pub mod resolver;
pub mod scheduler;
pub mod table;
pub mod verify;

// Re-export model types (primary API)
pub use models::{
    AnnotatedRow, ChangeState, ConnState, ConnectionRecord, ConnectionSnapshot, ExePath,
    ProcessInfo, Protocol, SnapshotSummary, UniqueKey,
};

// Re-export other commonly used types
pub use config::{ConfigStore, Settings};
pub use diff::DiffOutcome;
pub use engine::{ConnectionMonitor, KillReport, MonitorOptions, RefreshOutcome, RefreshReport};
pub use error::{Error, Result};
pub use killer::ProcessTerminator;
pub use resolver::{ProcessMetadataSource, ProcessResolver};
pub use scheduler::RefreshScheduler;
pub use table::{TableReader, TableSource};
pub use verify::{VerificationReport, VerificationTracker};

#[cfg(any(target_os = "linux", target_os = "windows"))]
pub use engine::PlatformMonitor;
