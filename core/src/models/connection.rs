//! Raw connection records as decoded from the OS owner-PID tables.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Transport protocol of an observed socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Connection state of a socket.
///
/// TCP sockets carry one of the classic state-machine states. UDP has no
/// connection state, so UDP rows always carry the `Unspecified` sentinel
/// rather than an absent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnState {
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    DeleteTcb,
    /// Sentinel for protocols without a connection state (UDP).
    Unspecified,
}

impl ConnState {
    /// Decode the numeric state code used by the owner-PID TCP table.
    ///
    /// Unknown codes map to the sentinel rather than failing: a newer OS
    /// may grow states we do not know about, and a refresh must not abort
    /// over a single undecodable row.
    pub fn from_table_code(code: u32) -> Self {
        match code {
            1 => ConnState::Closed,
            2 => ConnState::Listen,
            3 => ConnState::SynSent,
            4 => ConnState::SynRcvd,
            5 => ConnState::Established,
            6 => ConnState::FinWait1,
            7 => ConnState::FinWait2,
            8 => ConnState::CloseWait,
            9 => ConnState::Closing,
            10 => ConnState::LastAck,
            11 => ConnState::TimeWait,
            12 => ConnState::DeleteTcb,
            _ => ConnState::Unspecified,
        }
    }

    /// Whether this state is an OS-managed teardown state not actionable
    /// by the operator.
    pub fn is_teardown(&self) -> bool {
        matches!(self, ConnState::TimeWait | ConnState::DeleteTcb)
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnState::Closed => "CLOSED",
            ConnState::Listen => "LISTEN",
            ConnState::SynSent => "SYN_SENT",
            ConnState::SynRcvd => "SYN_RCVD",
            ConnState::Established => "ESTABLISHED",
            ConnState::FinWait1 => "FIN_WAIT1",
            ConnState::FinWait2 => "FIN_WAIT2",
            ConnState::CloseWait => "CLOSE_WAIT",
            ConnState::Closing => "CLOSING",
            ConnState::LastAck => "LAST_ACK",
            ConnState::TimeWait => "TIME_WAIT",
            ConnState::DeleteTcb => "DELETE_TCB",
            ConnState::Unspecified => "-",
        };
        write!(f, "{}", s)
    }
}

/// One observed socket, immutable once decoded from the OS table.
///
/// UDP rows have no remote endpoint in the owner-PID table; they carry
/// `0.0.0.0:0` and the `Unspecified` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub protocol: Protocol,
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,
    pub state: ConnState,
    /// Owning process id. 0 is the idle process, not a missing value.
    pub pid: u32,
}

impl ConnectionRecord {
    /// Identity of this observed socket: five-tuple plus owning pid.
    pub fn unique_key(&self) -> UniqueKey {
        UniqueKey {
            protocol: self.protocol,
            local_addr: self.local_addr,
            local_port: self.local_port,
            remote_addr: self.remote_addr,
            remote_port: self.remote_port,
            pid: self.pid,
        }
    }
}

impl fmt::Display for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{} {} (PID {})",
            self.protocol,
            self.local_addr,
            self.local_port,
            self.remote_addr,
            self.remote_port,
            self.state,
            self.pid
        )
    }
}

/// Identity of an observed socket.
///
/// Two records with the same key are the same socket; snapshots keep the
/// first occurrence and drop the rest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueKey {
    pub protocol: Protocol,
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,
    pub pid: u32,
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}-{}",
            self.protocol,
            self.local_addr,
            self.local_port,
            self.remote_addr,
            self.remote_port,
            self.pid
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(port: u16, pid: u32) -> ConnectionRecord {
        ConnectionRecord {
            protocol: Protocol::Tcp,
            local_addr: Ipv4Addr::new(127, 0, 0, 1),
            local_port: port,
            remote_addr: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            state: ConnState::Listen,
            pid,
        }
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(ConnState::from_table_code(2), ConnState::Listen);
        assert_eq!(ConnState::from_table_code(5), ConnState::Established);
        assert_eq!(ConnState::from_table_code(11), ConnState::TimeWait);
        assert_eq!(ConnState::from_table_code(0), ConnState::Unspecified);
        assert_eq!(ConnState::from_table_code(99), ConnState::Unspecified);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnState::Established.to_string(), "ESTABLISHED");
        assert_eq!(ConnState::Unspecified.to_string(), "-");
    }

    #[test]
    fn test_teardown_states() {
        assert!(ConnState::TimeWait.is_teardown());
        assert!(ConnState::DeleteTcb.is_teardown());
        assert!(!ConnState::Established.is_teardown());
    }

    #[test]
    fn test_unique_key_identity() {
        let a = record(8080, 10);
        let b = record(8080, 10);
        let c = record(8080, 11);

        assert_eq!(a.unique_key(), b.unique_key());
        assert_ne!(a.unique_key(), c.unique_key());
    }

    #[test]
    fn test_key_ignores_state() {
        let mut a = record(443, 7);
        let key = a.unique_key();
        a.state = ConnState::TimeWait;
        assert_eq!(a.unique_key(), key);
    }
}
