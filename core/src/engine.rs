//! Refresh coordinator: orchestrates read -> resolve -> diff -> reconcile
//! cycles and owns all snapshot and pending-set mutation.
//!
//! At most one refresh runs at a time; a request arriving while one is in
//! flight is dropped, not queued. That is deliberate load shedding for
//! periodic polling, not a correctness requirement.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::diff::{self, DiffOutcome};
use crate::error::{Error, Result};
use crate::killer::ProcessTerminator;
use crate::models::{
    AnnotatedRow, ChangeState, ConnState, ConnectionSnapshot, SnapshotSummary, UniqueKey,
};
use crate::policy;
use crate::resolver::{ProcessMetadataSource, ProcessResolver};
use crate::table::{TableReader, TableSource};
use crate::verify::{VerificationReport, VerificationTracker};

/// How often a pid is re-probed while waiting for it to die.
const KILL_CONFIRM_POLL_MS: u64 = 100;

/// Tunables for one monitor instance.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// How long new/changed highlights stay before being cleared.
    pub change_highlight: Duration,
    /// State counted as transient teardown during kill verification.
    pub transient_state: ConnState,
    /// How long a kill waits for confirmation of death.
    pub kill_confirm_timeout: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            change_highlight: Duration::from_secs(2),
            transient_state: ConnState::TimeWait,
            kill_confirm_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&Settings> for MonitorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            change_highlight: settings.change_highlight(),
            transient_state: settings.transient_state,
            ..Self::default()
        }
    }
}

/// Result of one completed refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub summary: SnapshotSummary,
    pub diff: DiffOutcome,
    pub verification: VerificationReport,
    /// Human-readable verification line, when there was anything to verify.
    pub verification_summary: Option<String>,
    pub elapsed_ms: u64,
}

/// Outcome of a refresh request.
#[derive(Debug, Clone, Serialize)]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    /// Another refresh was in flight; this request was dropped.
    Skipped,
}

/// Result of a batch kill request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KillReport {
    pub succeeded: Vec<u32>,
    pub failed: Vec<u32>,
    /// Rows excluded from the kill set by the protection policy.
    pub skipped_protected: usize,
}

/// The connection monitoring and correlation engine.
///
/// Owns the published snapshot and the pending verification set; every
/// mutation of either goes through this type. Other components register
/// pending keys via [`ConnectionMonitor::register_pending`], never by
/// touching snapshot state directly.
pub struct ConnectionMonitor<S, M, K>
where
    S: TableSource,
    M: ProcessMetadataSource,
    K: ProcessTerminator,
{
    reader: TableReader<S>,
    metadata: M,
    terminator: K,
    options: MonitorOptions,

    snapshot: RwLock<ConnectionSnapshot>,
    tracker: Mutex<VerificationTracker>,

    refresh_in_flight: AtomicBool,
    skipped_refreshes: AtomicU64,
}

impl<S, M, K> ConnectionMonitor<S, M, K>
where
    S: TableSource,
    M: ProcessMetadataSource,
    K: ProcessTerminator,
{
    pub fn new(source: S, metadata: M, terminator: K, options: MonitorOptions) -> Self {
        let transient_state = options.transient_state;
        Self {
            reader: TableReader::new(source),
            metadata,
            terminator,
            options,
            snapshot: RwLock::new(ConnectionSnapshot::default()),
            tracker: Mutex::new(VerificationTracker::new(transient_state)),
            refresh_in_flight: AtomicBool::new(false),
            skipped_refreshes: AtomicU64::new(0),
        }
    }

    /// Run one refresh cycle.
    ///
    /// Skips (without queueing) when another refresh is in flight. On a
    /// table read failure the cycle aborts and the previous snapshot stays
    /// published as last known good.
    pub fn refresh(&self) -> Result<RefreshOutcome> {
        if self
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.skipped_refreshes.fetch_add(1, Ordering::Relaxed);
            debug!("refresh already in flight, dropping request");
            return Ok(RefreshOutcome::Skipped);
        }

        let result = self.refresh_cycle();
        self.refresh_in_flight.store(false, Ordering::SeqCst);
        result.map(RefreshOutcome::Completed)
    }

    fn refresh_cycle(&self) -> Result<RefreshReport> {
        let started = Instant::now();
        let previous = self.snapshot.read().key_states();

        let records = match self.reader.read_connections() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "refresh aborted, keeping previous snapshot");
                return Err(e);
            }
        };

        // Per-cycle cache; dropped with the resolver at the end of this
        // function so a reused pid can never see stale metadata.
        let mut resolver = ProcessResolver::new(&self.metadata);
        let rows: Vec<AnnotatedRow> = records
            .into_iter()
            .map(|record| {
                let process = resolver.resolve(record.pid);
                let protected = policy::is_protected(record.pid, &process.name);
                AnnotatedRow::new(record, process, protected)
            })
            .collect();

        let mut snapshot = ConnectionSnapshot::from_rows(rows);
        let diff = diff::apply(&previous, &mut snapshot.rows);

        let (verification, verification_summary) = {
            let mut tracker = self.tracker.lock();
            let report = tracker.reconcile(&snapshot.rows);
            let summary = tracker.summary(&report);
            (report, summary)
        };

        let summary = snapshot.summary;
        *self.snapshot.write() = snapshot;

        let report = RefreshReport {
            summary,
            diff,
            verification,
            verification_summary,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            total = summary.total,
            tcp = summary.tcp,
            udp = summary.udp,
            processes = summary.processes,
            new = diff.new,
            changed = diff.changed,
            elapsed_ms = report.elapsed_ms,
            "refresh complete"
        );
        Ok(report)
    }

    /// Clone of the currently published snapshot.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.read().clone()
    }

    /// Reset all change highlights back to `None`.
    ///
    /// Called by the scheduler after the visibility window; does not wait
    /// for the next refresh.
    pub fn clear_change_flags(&self) {
        let mut snapshot = self.snapshot.write();
        for row in &mut snapshot.rows {
            row.change = ChangeState::None;
        }
    }

    /// Register connection keys for closed-loop kill verification.
    pub fn register_pending<I: IntoIterator<Item = UniqueKey>>(&self, keys: I) {
        self.tracker.lock().register(keys);
    }

    /// Number of keys still awaiting release confirmation.
    pub fn pending_count(&self) -> usize {
        self.tracker.lock().pending_count()
    }

    /// Refresh requests dropped because one was already in flight.
    pub fn skipped_refreshes(&self) -> u64 {
        self.skipped_refreshes.load(Ordering::Relaxed)
    }

    /// Preferred visibility window for change highlights.
    pub fn change_highlight(&self) -> Duration {
        self.options.change_highlight
    }

    /// Terminate the given pids, excluding protected ones.
    ///
    /// Each pid is attempted independently; one failure never aborts the
    /// rest. Keys of the affected rows are registered for verification
    /// before any signal is sent. Fails only when every candidate was
    /// excluded by the protection policy.
    pub async fn kill_batch(&self, pids: &[u32]) -> Result<KillReport> {
        let mut report = KillReport::default();
        let mut candidates: Vec<u32> = Vec::new();

        {
            let snapshot = self.snapshot.read();
            for &pid in pids {
                if candidates.contains(&pid) {
                    continue;
                }
                let rows: Vec<&AnnotatedRow> = snapshot
                    .rows
                    .iter()
                    .filter(|r| r.record.pid == pid)
                    .collect();
                let protected = if rows.is_empty() {
                    policy::is_protected(pid, "")
                } else {
                    rows.iter().any(|r| r.protected)
                };

                if protected {
                    report.skipped_protected += 1;
                } else {
                    candidates.push(pid);
                }
            }
        }

        if candidates.is_empty() {
            if report.skipped_protected > 0 {
                return Err(Error::AllTargetsProtected);
            }
            return Ok(report);
        }

        // Register affected keys through the coordinator before signalling,
        // so the very next refresh can already verify the release.
        let pending: Vec<UniqueKey> = {
            let snapshot = self.snapshot.read();
            snapshot
                .rows
                .iter()
                .filter(|r| !r.protected && candidates.contains(&r.record.pid))
                .map(|r| r.unique_key())
                .collect()
        };
        self.register_pending(pending);

        for pid in candidates {
            match self.terminator.terminate(pid).await {
                Ok(()) => {
                    if self.confirm_death(pid).await {
                        report.succeeded.push(pid);
                    } else {
                        warn!(pid, "process survived the confirmation window");
                        report.failed.push(pid);
                    }
                }
                Err(e) => {
                    warn!(pid, error = %e, "termination failed");
                    report.failed.push(pid);
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped_protected,
            "kill batch complete"
        );
        Ok(report)
    }

    /// Terminate every process behind the rows matching `group_key`.
    pub async fn kill_group(&self, group_key: &str) -> Result<KillReport> {
        let pids = self.pids_for(|row| row.group_key() == group_key)?;
        self.kill_batch(&pids).await
    }

    /// Terminate the processes behind the given connection keys.
    pub async fn kill_keys(&self, keys: &[UniqueKey]) -> Result<KillReport> {
        let pids = self.pids_for(|row| keys.contains(&row.unique_key()))?;
        self.kill_batch(&pids).await
    }

    /// Distinct killable pids among the selected rows. `AllTargetsProtected`
    /// when the selection is non-empty but nothing survives the policy.
    fn pids_for<F: Fn(&AnnotatedRow) -> bool>(&self, select: F) -> Result<Vec<u32>> {
        let snapshot = self.snapshot.read();
        let selected: Vec<&AnnotatedRow> =
            snapshot.rows.iter().filter(|r| select(r)).collect();

        let mut pids: Vec<u32> = Vec::new();
        for row in &selected {
            if !row.protected && row.record.pid > 4 && !pids.contains(&row.record.pid) {
                pids.push(row.record.pid);
            }
        }

        if pids.is_empty() && !selected.is_empty() {
            return Err(Error::AllTargetsProtected);
        }
        Ok(pids)
    }

    /// Poll until the process is gone or the confirmation window elapses.
    async fn confirm_death(&self, pid: u32) -> bool {
        let deadline = Instant::now() + self.options.kill_confirm_timeout;
        loop {
            if !self.terminator.is_running(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(KILL_CONFIRM_POLL_MS)).await;
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "windows"))]
mod platform {
    use super::{ConnectionMonitor, MonitorOptions};
    use crate::killer::PlatformTerminator;
    use crate::resolver::PlatformMetadataSource;
    use crate::table::PlatformTableSource;

    /// Monitor wired to the OS-native sources for the current platform.
    pub type PlatformMonitor =
        ConnectionMonitor<PlatformTableSource, PlatformMetadataSource, PlatformTerminator>;

    impl PlatformMonitor {
        pub fn platform(options: MonitorOptions) -> Self {
            Self::new(
                PlatformTableSource::new(),
                PlatformMetadataSource::new(),
                PlatformTerminator::new(),
                options,
            )
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "windows"))]
pub use platform::PlatformMonitor;
