//! Closed-loop kill verification.
//!
//! After a kill request the affected connection keys are registered here;
//! on each following refresh they are reconciled against the new snapshot
//! to confirm the ports were actually released. There is no forced expiry:
//! a socket the owner never releases stays pending and is reported as
//! lingering every cycle.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{AnnotatedRow, ConnState, UniqueKey};

/// Per-cycle verification counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Keys no longer present: the port was released, entry removed.
    pub released: usize,
    /// Keys still present outside the teardown state, kept pending.
    pub lingering: usize,
    /// Keys present but in the transient teardown state, kept pending.
    pub transient: usize,
}

impl VerificationReport {
    pub fn is_empty(&self) -> bool {
        self.released == 0 && self.lingering == 0 && self.transient == 0
    }
}

/// Tracks connection keys awaiting confirmation of release.
#[derive(Debug)]
pub struct VerificationTracker {
    pending: HashSet<UniqueKey>,
    /// The teardown state counted as transient rather than lingering.
    transient_state: ConnState,
}

impl VerificationTracker {
    pub fn new(transient_state: ConnState) -> Self {
        Self {
            pending: HashSet::new(),
            transient_state,
        }
    }

    /// Register keys whose owning process was just asked to terminate.
    pub fn register<I: IntoIterator<Item = UniqueKey>>(&mut self, keys: I) {
        self.pending.extend(keys);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Reconcile the pending set against the rows of a fresh snapshot.
    ///
    /// Released keys are removed from the set; transient and lingering keys
    /// stay pending for the next cycle.
    pub fn reconcile(&mut self, rows: &[AnnotatedRow]) -> VerificationReport {
        if self.pending.is_empty() {
            return VerificationReport::default();
        }

        let current: std::collections::HashMap<UniqueKey, ConnState> = rows
            .iter()
            .map(|r| (r.unique_key(), r.record.state))
            .collect();

        let mut report = VerificationReport::default();
        self.pending.retain(|key| match current.get(key) {
            None => {
                report.released += 1;
                false
            }
            Some(state) if *state == self.transient_state => {
                report.transient += 1;
                true
            }
            Some(_) => {
                report.lingering += 1;
                true
            }
        });

        if !report.is_empty() {
            info!(
                released = report.released,
                transient = report.transient,
                lingering = report.lingering,
                "kill verification"
            );
        }
        report
    }

    /// Human-readable verification summary for the status line, or `None`
    /// when there was nothing to report this cycle.
    pub fn summary(&self, report: &VerificationReport) -> Option<String> {
        if report.is_empty() {
            return None;
        }

        let mut msg = format!("released {} port(s)", report.released);
        if report.transient > 0 {
            msg.push_str(&format!(
                ", {} in {}",
                report.transient, self.transient_state
            ));
        }
        if report.lingering > 0 {
            msg.push_str(&format!(", {} still held", report.lingering));
        }
        Some(msg)
    }
}
