//! Windows owner-PID table source backed by the IP Helper API.
//!
//! Queries `GetExtendedTcpTable` / `GetExtendedUdpTable` for the AF_INET
//! family. The MIB row layouts already match [`RawTcpRow`]/[`RawUdpRow`],
//! so rows are carried over field by field without reinterpreting the
//! network-byte-order address and port words.

#![cfg(target_os = "windows")]

use std::ffi::c_void;

use windows::Win32::Foundation::{ERROR_INSUFFICIENT_BUFFER, NO_ERROR};
use windows::Win32::NetworkManagement::IpHelper::{
    GetExtendedTcpTable, GetExtendedUdpTable, MIB_TCPROW_OWNER_PID, MIB_TCPTABLE_OWNER_PID,
    MIB_UDPROW_OWNER_PID, MIB_UDPTABLE_OWNER_PID, TCP_TABLE_OWNER_PID_ALL, UDP_TABLE_OWNER_PID,
};
use windows::Win32::Networking::WinSock::AF_INET;

use crate::error::{Error, Result};
use crate::table::{RawTcpRow, RawUdpRow, TableSource};

/// Table source querying the IP Helper extended tables.
#[derive(Debug, Default)]
pub struct IpHelperTableSource;

impl IpHelperTableSource {
    pub fn new() -> Self {
        Self
    }

    /// Size-probe then fetch pattern shared by both table queries.
    fn fetch_table<F>(query: F, what: &str) -> Result<Vec<u8>>
    where
        F: Fn(Option<*mut c_void>, &mut u32) -> u32,
    {
        let mut size: u32 = 0;
        // First call with a null buffer reports the required size.
        let rc = query(None, &mut size);
        if rc != NO_ERROR.0 && rc != ERROR_INSUFFICIENT_BUFFER.0 {
            return Err(Error::TableUnavailable(format!("{} size probe: {}", what, rc)));
        }

        let mut buffer = vec![0u8; size as usize];
        let rc = query(Some(buffer.as_mut_ptr() as *mut c_void), &mut size);
        if rc != NO_ERROR.0 {
            return Err(Error::TableUnavailable(format!("{}: {}", what, rc)));
        }

        Ok(buffer)
    }
}

impl TableSource for IpHelperTableSource {
    fn tcp_rows(&self) -> Result<Vec<RawTcpRow>> {
        let buffer = Self::fetch_table(
            |buf, size| unsafe {
                GetExtendedTcpTable(buf, size, false, AF_INET.0 as u32, TCP_TABLE_OWNER_PID_ALL, 0)
            },
            "GetExtendedTcpTable",
        )?;

        // Table layout: u32 entry count followed by packed rows.
        let table = buffer.as_ptr() as *const MIB_TCPTABLE_OWNER_PID;
        let count = unsafe { (*table).dwNumEntries } as usize;
        let first = unsafe { (*table).table.as_ptr() };

        let mut rows = Vec::with_capacity(count);
        for i in 0..count {
            let entry: &MIB_TCPROW_OWNER_PID = unsafe { &*first.add(i) };
            rows.push(RawTcpRow {
                state: entry.dwState,
                local_addr: entry.dwLocalAddr,
                local_port: entry.dwLocalPort,
                remote_addr: entry.dwRemoteAddr,
                remote_port: entry.dwRemotePort,
                owning_pid: entry.dwOwningPid,
            });
        }
        Ok(rows)
    }

    fn udp_rows(&self) -> Result<Vec<RawUdpRow>> {
        let buffer = Self::fetch_table(
            |buf, size| unsafe {
                GetExtendedUdpTable(buf, size, false, AF_INET.0 as u32, UDP_TABLE_OWNER_PID, 0)
            },
            "GetExtendedUdpTable",
        )?;

        let table = buffer.as_ptr() as *const MIB_UDPTABLE_OWNER_PID;
        let count = unsafe { (*table).dwNumEntries } as usize;
        let first = unsafe { (*table).table.as_ptr() };

        let mut rows = Vec::with_capacity(count);
        for i in 0..count {
            let entry: &MIB_UDPROW_OWNER_PID = unsafe { &*first.add(i) };
            rows.push(RawUdpRow {
                local_addr: entry.dwLocalAddr,
                local_port: entry.dwLocalPort,
                owning_pid: entry.dwOwningPid,
            });
        }
        Ok(rows)
    }
}
