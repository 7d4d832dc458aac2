//! Process termination capability.
//!
//! The engine drives termination through the [`ProcessTerminator`] trait;
//! platform implementations escalate from a polite termination request to
//! a forced kill after a short grace period, covering the process and its
//! descendants.

use std::future::Future;

use thiserror::Error;

/// Grace period between the polite signal and the forced kill.
pub const GRACE_PERIOD_MS: u64 = 500;

/// Errors from a single termination attempt.
#[derive(Debug, Error)]
pub enum KillError {
    /// The process was not found.
    #[error("Process with PID {0} not found")]
    NotFound(u32),

    /// Permission denied to terminate the process.
    #[error("Permission denied to terminate process {0}")]
    AccessDenied(u32),

    /// The signal or command could not be delivered.
    #[error("Failed to terminate process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },
}

/// Capability terminating a process and its descendants.
pub trait ProcessTerminator: Send + Sync {
    /// Ask the process to terminate, escalating to a forced kill after the
    /// grace period. Delivery errors are reported per pid; confirmation of
    /// death is the caller's job.
    fn terminate(&self, pid: u32) -> impl Future<Output = Result<(), KillError>> + Send;

    /// Whether the process still exists.
    fn is_running(&self, pid: u32) -> bool;
}

#[cfg(unix)]
pub use self::unix::UnixTerminator as PlatformTerminator;

#[cfg(target_os = "windows")]
pub use self::windows::TaskkillTerminator as PlatformTerminator;

#[cfg(unix)]
mod unix {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::{getpgid, Pid};
    use tokio::time::{sleep, Duration};
    use tracing::{debug, warn};

    use super::{KillError, ProcessTerminator, GRACE_PERIOD_MS};

    /// Signal-based terminator: SIGTERM, grace period, SIGKILL.
    ///
    /// When the target leads its own process group the whole group is
    /// signalled, which covers its descendants.
    #[derive(Debug, Default)]
    pub struct UnixTerminator;

    impl UnixTerminator {
        pub fn new() -> Self {
            Self
        }

        fn send(&self, pid: u32, signal: Signal) -> Result<(), KillError> {
            let target = Pid::from_raw(pid as i32);

            // Signal the group when the pid is a group leader so children
            // go down with it.
            let leads_group = matches!(getpgid(Some(target)), Ok(pgid) if pgid == target);
            let result = if leads_group {
                killpg(target, signal)
            } else {
                kill(target, signal)
            };

            match result {
                Ok(()) => Ok(()),
                Err(Errno::ESRCH) => Err(KillError::NotFound(pid)),
                Err(Errno::EPERM) => Err(KillError::AccessDenied(pid)),
                Err(e) => Err(KillError::SignalFailed {
                    pid,
                    reason: e.to_string(),
                }),
            }
        }
    }

    impl ProcessTerminator for UnixTerminator {
        async fn terminate(&self, pid: u32) -> Result<(), KillError> {
            debug!(pid, "sending SIGTERM");
            self.send(pid, Signal::SIGTERM)?;

            sleep(Duration::from_millis(GRACE_PERIOD_MS)).await;

            if !self.is_running(pid) {
                debug!(pid, "terminated after SIGTERM");
                return Ok(());
            }

            warn!(pid, "still running after grace period, sending SIGKILL");
            match self.send(pid, Signal::SIGKILL) {
                // Gone between the check and the kill: that is the outcome
                // we wanted.
                Err(KillError::NotFound(_)) => Ok(()),
                other => other,
            }
        }

        fn is_running(&self, pid: u32) -> bool {
            // Signal 0 probes existence; EPERM still means it exists.
            match kill(Pid::from_raw(pid as i32), None) {
                Ok(()) => true,
                Err(Errno::EPERM) => true,
                Err(_) => false,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_is_running_current_process() {
            let terminator = UnixTerminator::new();
            assert!(terminator.is_running(std::process::id()));
        }

        #[test]
        fn test_is_running_nonexistent() {
            let terminator = UnixTerminator::new();
            assert!(!terminator.is_running(999_999_999));
        }

        #[tokio::test]
        async fn test_terminate_nonexistent_reports_not_found() {
            let terminator = UnixTerminator::new();
            match terminator.terminate(999_999_999).await {
                Err(KillError::NotFound(pid)) => assert_eq!(pid, 999_999_999),
                other => panic!("expected NotFound, got {:?}", other.err()),
            }
        }
    }
}

#[cfg(target_os = "windows")]
mod windows {
    use std::process::Command;

    use tokio::process::Command as AsyncCommand;
    use tokio::time::{sleep, Duration};
    use tracing::{debug, warn};

    use super::{KillError, ProcessTerminator, GRACE_PERIOD_MS};

    /// Terminator shelling out to `taskkill /T` (process tree), escalating
    /// to `/F` after the grace period.
    #[derive(Debug, Default)]
    pub struct TaskkillTerminator;

    impl TaskkillTerminator {
        pub fn new() -> Self {
            Self
        }

        async fn taskkill(&self, pid: u32, force: bool) -> Result<(), KillError> {
            let mut cmd = AsyncCommand::new("taskkill");
            cmd.arg("/PID").arg(pid.to_string()).arg("/T");
            if force {
                cmd.arg("/F");
            }

            let output = cmd.output().await.map_err(|e| KillError::SignalFailed {
                pid,
                reason: e.to_string(),
            })?;

            if output.status.success() {
                return Ok(());
            }

            let combined = format!(
                "{} {}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );

            if combined.contains("not found") || combined.contains("could not be found") {
                return Err(KillError::NotFound(pid));
            }
            if combined.contains("Access is denied") {
                return Err(KillError::AccessDenied(pid));
            }

            Err(KillError::SignalFailed {
                pid,
                reason: combined.trim().to_string(),
            })
        }
    }

    impl ProcessTerminator for TaskkillTerminator {
        async fn terminate(&self, pid: u32) -> Result<(), KillError> {
            debug!(pid, "taskkill /T");
            match self.taskkill(pid, false).await {
                Ok(()) => {}
                Err(KillError::NotFound(_)) => return Ok(()),
                // Graceful taskkill regularly fails for console apps; the
                // forced attempt below decides the outcome.
                Err(e) => warn!(pid, error = %e, "graceful taskkill failed"),
            }

            sleep(Duration::from_millis(GRACE_PERIOD_MS)).await;

            if !self.is_running(pid) {
                return Ok(());
            }

            match self.taskkill(pid, true).await {
                Err(KillError::NotFound(_)) => Ok(()),
                other => other,
            }
        }

        fn is_running(&self, pid: u32) -> bool {
            Command::new("tasklist")
                .args(["/NH", "/FI"])
                .arg(format!("PID eq {}", pid))
                .output()
                .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
                .unwrap_or(false)
        }
    }
}
