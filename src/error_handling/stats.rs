//! Cycle statistics tracking.
//!
//! This module provides thread-safe counters for orchestrator cycle outcomes
//! and inspection failures, shared by the scheduler and the API status endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::{CycleOutcomeKind, InspectErrorKind};

/// Thread-safe cycle statistics tracker.
///
/// All outcome kinds and inspection error kinds are initialized to zero on
/// creation, so lookups never miss. Share it across tasks with `Arc`.
pub struct CycleStats {
    outcomes: HashMap<CycleOutcomeKind, AtomicUsize>,
    inspect_errors: HashMap<InspectErrorKind, AtomicUsize>,
}

impl CycleStats {
    pub fn new() -> Self {
        let mut outcomes = HashMap::new();
        for kind in CycleOutcomeKind::iter() {
            outcomes.insert(kind, AtomicUsize::new(0));
        }

        let mut inspect_errors = HashMap::new();
        for kind in InspectErrorKind::iter() {
            inspect_errors.insert(kind, AtomicUsize::new(0));
        }

        CycleStats {
            outcomes,
            inspect_errors,
        }
    }

    pub fn record_outcome(&self, kind: CycleOutcomeKind) {
        if let Some(counter) = self.outcomes.get(&kind) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment outcome counter for {:?} which is not in the map",
                kind
            );
        }
    }

    pub fn record_inspect_error(&self, kind: InspectErrorKind) {
        if let Some(counter) = self.inspect_errors.get(&kind) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment inspection counter for {:?} which is not in the map",
                kind
            );
        }
    }

    pub fn outcome_count(&self, kind: CycleOutcomeKind) -> usize {
        self.outcomes
            .get(&kind)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn inspect_error_count(&self, kind: InspectErrorKind) -> usize {
        self.inspect_errors
            .get(&kind)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn total_cycles(&self) -> usize {
        self.outcomes.values().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    pub fn total_inspect_errors(&self) -> usize {
        self.inspect_errors
            .values()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }

    /// Non-zero counters keyed by their reason codes, for reporting.
    pub fn snapshot(&self) -> CycleStatsSnapshot {
        let outcomes = CycleOutcomeKind::iter()
            .map(|kind| (kind.as_str().to_string(), self.outcome_count(kind)))
            .filter(|(_, count)| *count > 0)
            .collect();
        let inspect_errors = InspectErrorKind::iter()
            .map(|kind| (kind.as_str().to_string(), self.inspect_error_count(kind)))
            .filter(|(_, count)| *count > 0)
            .collect();
        CycleStatsSnapshot {
            total_cycles: self.total_cycles(),
            outcomes,
            inspect_errors,
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CycleStatsSnapshot {
    pub total_cycles: usize,
    pub outcomes: std::collections::BTreeMap<String, usize>,
    pub inspect_errors: std::collections::BTreeMap<String, usize>,
}
