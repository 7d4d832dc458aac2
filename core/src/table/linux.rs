//! Linux owner-PID table source backed by procfs.
//!
//! Reads `/proc/net/tcp` and `/proc/net/udp` (IPv4 only) and maps socket
//! inodes to owning pids via `/proc/<pid>/fd`. Rows are emitted in the
//! layout-preserved form the reader expects: addresses and ports in
//! network byte order, TCP states as owner-PID table codes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::table::{RawTcpRow, RawUdpRow, TableSource};

const PROC_NET_TCP: &str = "/proc/net/tcp";
const PROC_NET_UDP: &str = "/proc/net/udp";

/// Table source reading the procfs socket tables.
#[derive(Debug, Default)]
pub struct ProcTableSource;

impl ProcTableSource {
    pub fn new() -> Self {
        Self
    }
}

impl TableSource for ProcTableSource {
    fn tcp_rows(&self) -> Result<Vec<RawTcpRow>> {
        let content = fs::read_to_string(PROC_NET_TCP)
            .map_err(|e| Error::TableUnavailable(format!("{}: {}", PROC_NET_TCP, e)))?;
        let owners = socket_owners();
        Ok(parse_tcp_table(&content, &owners))
    }

    fn udp_rows(&self) -> Result<Vec<RawUdpRow>> {
        let content = fs::read_to_string(PROC_NET_UDP)
            .map_err(|e| Error::TableUnavailable(format!("{}: {}", PROC_NET_UDP, e)))?;
        let owners = socket_owners();
        Ok(parse_udp_table(&content, &owners))
    }
}

/// Map socket inodes to owning pids by walking `/proc/<pid>/fd`.
///
/// Entries for processes we cannot inspect are simply missing; their rows
/// fall back to pid 0. Running unprivileged this covers only our own
/// processes, which matches what the kernel is willing to tell us.
fn socket_owners() -> HashMap<u64, u32> {
    let mut owners = HashMap::new();

    let entries = match fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "could not enumerate /proc");
            return owners;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        collect_socket_inodes(&entry.path().join("fd"), pid, &mut owners);
    }

    debug!(sockets = owners.len(), "mapped socket inodes to pids");
    owners
}

fn collect_socket_inodes(fd_dir: &Path, pid: u32, owners: &mut HashMap<u64, u32>) {
    let Ok(fds) = fs::read_dir(fd_dir) else {
        return; // permission denied or process gone
    };

    for fd in fds.flatten() {
        let Ok(target) = fs::read_link(fd.path()) else {
            continue;
        };
        let target = target.to_string_lossy();
        // Socket links look like "socket:[12345]".
        if let Some(inode) = target
            .strip_prefix("socket:[")
            .and_then(|s| s.strip_suffix(']'))
            .and_then(|s| s.parse::<u64>().ok())
        {
            owners.entry(inode).or_insert(pid);
        }
    }
}

/// Translate a procfs TCP state nibble into the owner-PID table code the
/// decoder understands. The two tables number the same state machine
/// differently.
fn table_state_code(proc_state: u8) -> u32 {
    match proc_state {
        0x01 => 5,  // ESTABLISHED
        0x02 => 3,  // SYN_SENT
        0x03 => 4,  // SYN_RECV
        0x04 => 6,  // FIN_WAIT1
        0x05 => 7,  // FIN_WAIT2
        0x06 => 11, // TIME_WAIT
        0x07 => 1,  // CLOSE
        0x08 => 8,  // CLOSE_WAIT
        0x09 => 10, // LAST_ACK
        0x0A => 2,  // LISTEN
        0x0B => 9,  // CLOSING
        _ => 0,
    }
}

/// Parse one `addr:port` column. The address hex is the raw table word
/// (network byte order); the port hex is a host-order value that must be
/// re-encoded into the wire layout.
fn parse_endpoint(field: &str) -> Option<(u32, u32)> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    if addr_hex.len() != 8 {
        return None; // IPv6 entry in the wrong file, or junk
    }
    let addr = u32::from_str_radix(addr_hex, 16).ok()?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    Some((addr, port.to_be() as u32))
}

fn parse_tcp_table(content: &str, owners: &HashMap<u64, u32>) -> Vec<RawTcpRow> {
    let mut rows = Vec::new();

    for line in content.lines().skip(1) {
        // Format: sl local rem st queues tr retrnsmt uid timeout inode ...
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }

        let Some((local_addr, local_port)) = parse_endpoint(fields[1]) else {
            continue;
        };
        let Some((remote_addr, remote_port)) = parse_endpoint(fields[2]) else {
            continue;
        };
        let Ok(state) = u8::from_str_radix(fields[3], 16) else {
            continue;
        };
        let inode: u64 = fields[9].parse().unwrap_or(0);

        rows.push(RawTcpRow {
            state: table_state_code(state),
            local_addr,
            local_port,
            remote_addr,
            remote_port,
            owning_pid: owners.get(&inode).copied().unwrap_or(0),
        });
    }

    rows
}

fn parse_udp_table(content: &str, owners: &HashMap<u64, u32>) -> Vec<RawUdpRow> {
    let mut rows = Vec::new();

    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }

        let Some((local_addr, local_port)) = parse_endpoint(fields[1]) else {
            continue;
        };
        let inode: u64 = fields[9].parse().unwrap_or(0);

        rows.push(RawUdpRow {
            local_addr,
            local_port,
            owning_pid: owners.get(&inode).copied().unwrap_or(0),
        });
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnState, Protocol};
    use crate::table::{TableReader, TableSource};
    use std::net::Ipv4Addr;

    // Trimmed real-world shape: 127.0.0.1:8080 LISTEN, 10.0.0.2:43210 -> 93.184.216.34:443 ESTABLISHED.
    const TCP_FIXTURE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
         0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 4242 1 0000000000000000 100 0 0 10 0\n\
         1: 0200000A:A8CA 22D8B85D:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 5151 1 0000000000000000 20 4 30 10 -1\n";

    const UDP_FIXTURE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops\n\
        100: 00000000:0035 00000000:0000 07 00000000:00000000 00:00000000 00000000   102        0 7777 2 0000000000000000 0\n";

    struct FixtureSource;

    impl TableSource for FixtureSource {
        fn tcp_rows(&self) -> crate::Result<Vec<RawTcpRow>> {
            let mut owners = HashMap::new();
            owners.insert(4242u64, 1111u32);
            owners.insert(5151u64, 2222u32);
            Ok(parse_tcp_table(TCP_FIXTURE, &owners))
        }

        fn udp_rows(&self) -> crate::Result<Vec<RawUdpRow>> {
            Ok(parse_udp_table(UDP_FIXTURE, &HashMap::new()))
        }
    }

    #[test]
    fn test_parse_tcp_fixture() {
        let owners = HashMap::from([(4242u64, 1111u32)]);
        let rows = parse_tcp_table(TCP_FIXTURE, &owners);
        assert_eq!(rows.len(), 2);

        // LISTEN maps to table code 2; unmapped inode falls back to pid 0.
        assert_eq!(rows[0].state, 2);
        assert_eq!(rows[0].owning_pid, 1111);
        assert_eq!(rows[1].state, 5);
        assert_eq!(rows[1].owning_pid, 0);
    }

    #[test]
    fn test_decoded_end_to_end() {
        let reader = TableReader::new(FixtureSource);
        let records = reader.read_connections().unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].protocol, Protocol::Tcp);
        assert_eq!(records[0].local_addr, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(records[0].local_port, 8080);
        assert_eq!(records[0].state, ConnState::Listen);
        assert_eq!(records[0].pid, 1111);

        assert_eq!(records[1].local_addr, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(records[1].local_port, 43210);
        assert_eq!(records[1].remote_addr, Ipv4Addr::new(93, 184, 216, 34));
        assert_eq!(records[1].remote_port, 443);
        assert_eq!(records[1].state, ConnState::Established);

        assert_eq!(records[2].protocol, Protocol::Udp);
        assert_eq!(records[2].local_port, 53);
        assert_eq!(records[2].state, ConnState::Unspecified);
    }

    #[test]
    fn test_state_code_mapping() {
        assert_eq!(table_state_code(0x0A), 2); // LISTEN
        assert_eq!(table_state_code(0x01), 5); // ESTABLISHED
        assert_eq!(table_state_code(0x06), 11); // TIME_WAIT
        assert_eq!(table_state_code(0xFF), 0);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let owners = HashMap::new();
        assert!(parse_tcp_table("header\ngarbage line\n", &owners).is_empty());
        assert!(parse_udp_table("header\n 0: nonsense\n", &owners).is_empty());
    }
}
