//! Protection policy: processes that must never be terminated.

/// Critical process names whose termination is always refused. Matched
/// case-insensitively against the resolved process name.
const PROTECTED_PROCESS_NAMES: &[&str] = &[
    "System",
    "System Idle Process",
    "csrss",
    "lsass",
    "smss",
    "wininit",
    "services",
    "winlogon",
    "systemd",
    "init",
    "launchd",
];

/// Whether a connection row's owner is a protected system process.
///
/// Pure function: pid at or below 4 covers the idle process and the kernel;
/// otherwise the name is checked against the fixed allow-list. Kill entry
/// points exclude protected rows from the kill set and report the exclusion
/// count instead of failing the whole operation.
pub fn is_protected(pid: u32, process_name: &str) -> bool {
    if pid <= 4 {
        return true;
    }
    PROTECTED_PROCESS_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(process_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_pids_always_protected() {
        for pid in 0..=4 {
            assert!(is_protected(pid, "anything"));
        }
        assert!(!is_protected(5, "node"));
    }

    #[test]
    fn test_name_match_case_insensitive() {
        assert!(is_protected(612, "lsass"));
        assert!(is_protected(612, "LSASS"));
        assert!(is_protected(891, "WinLogon"));
        assert!(is_protected(1, "systemd"));
    }

    #[test]
    fn test_ordinary_processes_not_protected() {
        assert!(!is_protected(1234, "node"));
        assert!(!is_protected(1234, "nginx"));
        assert!(!is_protected(1234, ""));
    }
}
