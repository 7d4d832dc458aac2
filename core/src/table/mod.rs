//! OS connection-table access and decoding.
//!
//! The owner-PID tables are exposed through the [`TableSource`] trait as
//! raw rows whose bit layout matches the underlying OS records: state code,
//! IPv4 address and port in network byte order, owning pid. [`TableReader`]
//! decodes them into normalized [`ConnectionRecord`]s.

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::ProcTableSource as PlatformTableSource;

#[cfg(target_os = "windows")]
pub use windows::IpHelperTableSource as PlatformTableSource;

use std::net::Ipv4Addr;

use tracing::debug;

use crate::error::Result;
use crate::models::{ConnState, ConnectionRecord, Protocol};

/// One row of the IPv4 TCP owner-PID table, layout-preserved.
///
/// Addresses and ports are in network byte order: `local_addr` holds the
/// four address octets as loaded from the table, `local_port` carries the
/// big-endian port in its low 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTcpRow {
    pub state: u32,
    pub local_addr: u32,
    pub local_port: u32,
    pub remote_addr: u32,
    pub remote_port: u32,
    pub owning_pid: u32,
}

/// One row of the IPv4 UDP owner-PID table. UDP rows have no remote
/// endpoint and no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawUdpRow {
    pub local_addr: u32,
    pub local_port: u32,
    pub owning_pid: u32,
}

/// Capability providing the raw IPv4 owner-PID tables.
///
/// Implementations are read-only; a failed query surfaces as
/// [`crate::Error::TableUnavailable`] through the reader.
pub trait TableSource: Send + Sync {
    fn tcp_rows(&self) -> Result<Vec<RawTcpRow>>;
    fn udp_rows(&self) -> Result<Vec<RawUdpRow>>;
}

/// Decodes raw table rows into normalized connection records.
///
/// TCP and UDP tables are queried independently and concatenated, TCP
/// first. The reader has no side effects beyond the OS query.
pub struct TableReader<S: TableSource> {
    source: S,
}

impl<S: TableSource> TableReader<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Read both tables and decode them into connection records.
    pub fn read_connections(&self) -> Result<Vec<ConnectionRecord>> {
        let tcp = self.source.tcp_rows()?;
        let udp = self.source.udp_rows()?;

        let mut records = Vec::with_capacity(tcp.len() + udp.len());
        records.extend(tcp.iter().map(decode_tcp));
        records.extend(udp.iter().map(decode_udp));

        debug!(tcp = tcp.len(), udp = udp.len(), "decoded connection tables");
        Ok(records)
    }
}

/// Convert a network-byte-order address word to an `Ipv4Addr`.
fn decode_addr(raw: u32) -> Ipv4Addr {
    Ipv4Addr::from(u32::from_be(raw))
}

/// Convert a network-byte-order port word to a host-order port (ntohs).
fn decode_port(raw: u32) -> u16 {
    u16::from_be((raw & 0xFFFF) as u16)
}

fn decode_tcp(row: &RawTcpRow) -> ConnectionRecord {
    ConnectionRecord {
        protocol: Protocol::Tcp,
        local_addr: decode_addr(row.local_addr),
        local_port: decode_port(row.local_port),
        remote_addr: decode_addr(row.remote_addr),
        remote_port: decode_port(row.remote_port),
        state: ConnState::from_table_code(row.state),
        pid: row.owning_pid,
    }
}

fn decode_udp(row: &RawUdpRow) -> ConnectionRecord {
    ConnectionRecord {
        protocol: Protocol::Udp,
        local_addr: decode_addr(row.local_addr),
        local_port: decode_port(row.local_port),
        remote_addr: Ipv4Addr::UNSPECIFIED,
        remote_port: 0,
        state: ConnState::Unspecified,
        pid: row.owning_pid,
    }
}
