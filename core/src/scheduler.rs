//! Periodic refresh scheduling.
//!
//! A ticker pushes refresh requests into a bounded channel of depth one; a
//! single consumer drains it and drives the monitor. A tick arriving while
//! the consumer is busy finds the channel full and is dropped, which gives
//! the same skipped-not-queued behavior as the engine's own guard without
//! ever building a backlog.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::engine::{ConnectionMonitor, RefreshOutcome, RefreshReport};
use crate::killer::ProcessTerminator;
use crate::resolver::ProcessMetadataSource;
use crate::table::TableSource;

/// Drives periodic refreshes of a shared monitor.
pub struct RefreshScheduler<S, M, K>
where
    S: TableSource + 'static,
    M: ProcessMetadataSource + 'static,
    K: ProcessTerminator + 'static,
{
    monitor: Arc<ConnectionMonitor<S, M, K>>,
    period: Duration,
}

impl<S, M, K> RefreshScheduler<S, M, K>
where
    S: TableSource + 'static,
    M: ProcessMetadataSource + 'static,
    K: ProcessTerminator + 'static,
{
    pub fn new(monitor: Arc<ConnectionMonitor<S, M, K>>, period: Duration) -> Self {
        Self { monitor, period }
    }

    /// Run the refresh loop until the returned handle is aborted.
    ///
    /// `on_cycle` is invoked after every completed refresh; changed-row
    /// highlights are cleared after the monitor's visibility window.
    pub fn spawn<F>(self, on_cycle: F) -> JoinHandle<()>
    where
        F: Fn(&RefreshReport) + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<()>(1);

        let period = self.period;
        let ticker = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                // Full channel means a refresh is still being consumed.
                if tx.try_send(()).is_err() {
                    debug!("refresh tick dropped, consumer busy");
                }
            }
        });

        let monitor = self.monitor;
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                match monitor.refresh() {
                    Ok(RefreshOutcome::Completed(report)) => {
                        on_cycle(&report);
                        if report.diff.has_changes() {
                            Self::schedule_highlight_clear(&monitor);
                        }
                    }
                    Ok(RefreshOutcome::Skipped) => {}
                    Err(e) => error!(error = %e, "scheduled refresh failed"),
                }
            }
            ticker.abort();
        })
    }

    fn schedule_highlight_clear(monitor: &Arc<ConnectionMonitor<S, M, K>>) {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            tokio::time::sleep(monitor.change_highlight()).await;
            monitor.clear_change_flags();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MonitorOptions;
    use crate::error::Result;
    use crate::killer::KillError;
    use crate::models::{ExePath, ProcessInfo};
    use crate::table::{RawTcpRow, RawUdpRow};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        reads: Arc<AtomicUsize>,
        rows: Arc<parking_lot::Mutex<Vec<RawTcpRow>>>,
    }

    impl TableSource for CountingSource {
        fn tcp_rows(&self) -> Result<Vec<RawTcpRow>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.lock().clone())
        }
        fn udp_rows(&self) -> Result<Vec<RawUdpRow>> {
            Ok(Vec::new())
        }
    }

    struct NamedMetadata;

    impl ProcessMetadataSource for NamedMetadata {
        fn metadata(&self, _pid: u32) -> Option<ProcessInfo> {
            Some(ProcessInfo::new("svc", ExePath::Unknown, "user"))
        }
    }

    struct NoopTerminator;

    impl ProcessTerminator for NoopTerminator {
        async fn terminate(&self, _pid: u32) -> std::result::Result<(), KillError> {
            Ok(())
        }
        fn is_running(&self, _pid: u32) -> bool {
            false
        }
    }

    fn raw_tcp(port: u16, pid: u32, state: u32) -> RawTcpRow {
        RawTcpRow {
            state,
            local_addr: u32::from_be_bytes([127, 0, 0, 1]).to_be(),
            local_port: port.to_be() as u32,
            remote_addr: 0,
            remote_port: 0,
            owning_pid: pid,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh_and_cycle_callback() {
        let reads = Arc::new(AtomicUsize::new(0));
        let rows = Arc::new(parking_lot::Mutex::new(vec![raw_tcp(80, 10, 2)]));

        let monitor = Arc::new(ConnectionMonitor::new(
            CountingSource {
                reads: reads.clone(),
                rows: rows.clone(),
            },
            NamedMetadata,
            NoopTerminator,
            MonitorOptions::default(),
        ));

        let cycles = Arc::new(AtomicUsize::new(0));
        let cycles_seen = cycles.clone();
        let handle = RefreshScheduler::new(monitor.clone(), Duration::from_secs(5))
            .spawn(move |_report| {
                cycles_seen.fetch_add(1, Ordering::SeqCst);
            });

        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.abort();

        // First tick fires immediately, then every five seconds.
        assert!(cycles.load(Ordering::SeqCst) >= 2);
        assert_eq!(reads.load(Ordering::SeqCst), cycles.load(Ordering::SeqCst));
        assert_eq!(monitor.snapshot().summary.total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_highlight_cleared_after_window() {
        let rows = Arc::new(parking_lot::Mutex::new(vec![raw_tcp(80, 10, 2)]));
        let monitor = Arc::new(ConnectionMonitor::new(
            CountingSource {
                reads: Arc::new(AtomicUsize::new(0)),
                rows: rows.clone(),
            },
            NamedMetadata,
            NoopTerminator,
            MonitorOptions::default(),
        ));

        let handle =
            RefreshScheduler::new(monitor.clone(), Duration::from_secs(5)).spawn(|_| {});

        // Baseline load, then a newcomer on the second cycle.
        tokio::time::sleep(Duration::from_millis(100)).await;
        rows.lock().push(raw_tcp(443, 11, 5));
        tokio::time::sleep(Duration::from_secs(5)).await;

        let flagged = monitor
            .snapshot()
            .rows
            .iter()
            .any(|r| r.change != crate::models::ChangeState::None);
        assert!(flagged);

        // The two-second visibility window elapses before the next tick.
        tokio::time::sleep(Duration::from_millis(2100)).await;
        let flagged = monitor
            .snapshot()
            .rows
            .iter()
            .any(|r| r.change != crate::models::ChangeState::None);
        assert!(!flagged);

        handle.abort();
    }
}
