//! Snapshot differencing: change classification between refresh cycles.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{AnnotatedRow, ChangeState, ConnState, UniqueKey};

/// Counts produced by one differencing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOutcome {
    pub new: usize,
    pub changed: usize,
    /// Keys present in the previous snapshot but absent now.
    pub removed: usize,
}

impl DiffOutcome {
    pub fn has_changes(&self) -> bool {
        self.new > 0 || self.changed > 0
    }
}

/// Assign change states to the current rows against the previous cycle's
/// key -> state map.
///
/// A key seen before with a different state is `Changed`. An unseen key is
/// `New` only when the previous map was non-empty: on first load every row
/// is technically new, and highlighting the entire baseline would be noise.
pub fn apply(previous: &HashMap<UniqueKey, ConnState>, rows: &mut [AnnotatedRow]) -> DiffOutcome {
    let mut outcome = DiffOutcome::default();
    // Distinct keys: duplicate rows must not count a previous key twice.
    let mut seen: HashSet<UniqueKey> = HashSet::new();

    for row in rows.iter_mut() {
        match previous.get(&row.unique_key()) {
            Some(old_state) => {
                seen.insert(row.unique_key());
                if *old_state != row.record.state {
                    row.change = ChangeState::Changed;
                    outcome.changed += 1;
                } else {
                    row.change = ChangeState::None;
                }
            }
            None if !previous.is_empty() => {
                row.change = ChangeState::New;
                outcome.new += 1;
            }
            None => {
                row.change = ChangeState::None;
            }
        }
    }

    outcome.removed = previous.len() - seen.len();
    outcome
}
