//! Process metadata resolution with per-refresh caching.
//!
//! A [`ProcessResolver`] is constructed fresh for every refresh cycle and
//! dropped at its end. Pids can be reused between cycles, so the memoized
//! lookups must never outlive the cycle that made them.

use std::collections::HashMap;

use tracing::debug;

use crate::models::ProcessInfo;

/// Capability answering metadata queries for a pid.
///
/// `None` means the process could not be found (typically it exited between
/// table enumeration and resolution); the resolver turns that into the
/// "Unknown (Exited)" sentinel rather than an error.
pub trait ProcessMetadataSource: Send + Sync {
    fn metadata(&self, pid: u32) -> Option<ProcessInfo>;
}

/// Per-refresh memoizing resolver.
pub struct ProcessResolver<'a> {
    source: &'a dyn ProcessMetadataSource,
    cache: HashMap<u32, ProcessInfo>,
}

impl<'a> ProcessResolver<'a> {
    pub fn new(source: &'a dyn ProcessMetadataSource) -> Self {
        Self {
            source,
            cache: HashMap::new(),
        }
    }

    /// Resolve a pid, consulting the cycle-local cache first.
    ///
    /// Pids 0 and 4 get fixed identities without touching the source; a
    /// vanished process degrades softly into the exited sentinel.
    pub fn resolve(&mut self, pid: u32) -> ProcessInfo {
        if let Some(info) = self.cache.get(&pid) {
            return info.clone();
        }

        let info = match pid {
            0 => ProcessInfo::idle(),
            4 => ProcessInfo::kernel(),
            _ => self.source.metadata(pid).unwrap_or_else(|| {
                debug!(pid, "process vanished before resolution");
                ProcessInfo::exited()
            }),
        };

        self.cache.insert(pid, info.clone());
        info
    }

    /// Number of distinct pids resolved this cycle.
    pub fn resolved_count(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(target_os = "linux")]
pub use self::linux::ProcMetadataSource as PlatformMetadataSource;

#[cfg(target_os = "windows")]
pub use self::windows::TasklistMetadataSource as PlatformMetadataSource;

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;
    use std::io::ErrorKind;

    use nix::unistd::{Uid, User};

    use super::ProcessMetadataSource;
    use crate::models::{ExePath, ProcessInfo};

    /// Metadata source backed by procfs.
    #[derive(Debug, Default)]
    pub struct ProcMetadataSource;

    impl ProcMetadataSource {
        pub fn new() -> Self {
            Self
        }
    }

    impl ProcessMetadataSource for ProcMetadataSource {
        fn metadata(&self, pid: u32) -> Option<ProcessInfo> {
            // comm is the existence check: gone process, gone entry.
            let name = fs::read_to_string(format!("/proc/{}/comm", pid)).ok()?;
            let name = name.trim().to_string();

            let path = match fs::read_link(format!("/proc/{}/exe", pid)) {
                Ok(target) => ExePath::Known(target.to_string_lossy().into_owned()),
                Err(e) if e.kind() == ErrorKind::PermissionDenied => ExePath::AccessDenied,
                Err(_) => ExePath::Unknown,
            };

            let account = owner_account(pid).unwrap_or_else(|| "Unknown".to_string());

            Some(ProcessInfo::new(name, path, account))
        }
    }

    /// Owning account from the real uid in `/proc/<pid>/status`.
    fn owner_account(pid: u32) -> Option<String> {
        let status = fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
        let uid: u32 = status
            .lines()
            .find_map(|line| line.strip_prefix("Uid:"))?
            .split_whitespace()
            .next()?
            .parse()
            .ok()?;

        match User::from_uid(Uid::from_raw(uid)) {
            Ok(Some(user)) => Some(user.name),
            _ => Some(uid.to_string()),
        }
    }
}

#[cfg(target_os = "windows")]
mod windows {
    use std::process::Command;

    use super::ProcessMetadataSource;
    use crate::models::{ExePath, ProcessInfo};

    /// Metadata source shelling out to `tasklist` (verbose CSV mode).
    ///
    /// tasklist does not report executable paths, so rows resolved through
    /// it carry the unknown-path sentinel.
    #[derive(Debug, Default)]
    pub struct TasklistMetadataSource;

    impl TasklistMetadataSource {
        pub fn new() -> Self {
            Self
        }
    }

    impl ProcessMetadataSource for TasklistMetadataSource {
        fn metadata(&self, pid: u32) -> Option<ProcessInfo> {
            let output = Command::new("tasklist")
                .args(["/FO", "CSV", "/NH", "/V", "/FI"])
                .arg(format!("PID eq {}", pid))
                .output()
                .ok()?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let line = stdout.lines().find(|l| l.starts_with('"'))?;
            let fields: Vec<&str> = line.trim_matches('"').split("\",\"").collect();
            // Verbose CSV: image, pid, session name, session#, mem, status, user, cpu time, title
            if fields.len() < 7 {
                return None;
            }

            let name = fields[0]
                .strip_suffix(".exe")
                .unwrap_or(fields[0])
                .to_string();
            let account = fields[6].to_string();

            Some(ProcessInfo::new(name, ExePath::Unknown, account))
        }
    }
}
