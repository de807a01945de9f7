//! Per-worker execution counters.

use serde::{Deserialize, Serialize};

/// Execution counters of one block worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Wakes that led to a step
    pub activations: u64,
    /// Steps that returned outputs which were committed
    pub steps_completed: u64,
    /// Steps whose outputs were dropped because a stop arrived
    pub outputs_discarded: u64,
    /// Values delivered to downstream ports
    pub deliveries: u64,
    /// Steps that faulted (at most one; a fault stops the worker)
    pub faults: u64,
}

impl WorkerStats {
    /// Create new counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a wake
    pub fn record_activation(&mut self) {
        self.activations += 1;
    }

    /// Record a committed step
    pub fn record_completion(&mut self, deliveries: u64) {
        self.steps_completed += 1;
        self.deliveries += deliveries;
    }

    /// Record a discarded step
    pub fn record_discard(&mut self) {
        self.outputs_discarded += 1;
    }

    /// Record a fault
    pub fn record_fault(&mut self) {
        self.faults += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = WorkerStats::new();
        assert_eq!(stats.activations, 0);
        assert_eq!(stats.steps_completed, 0);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = WorkerStats::new();
        stats.record_activation();
        stats.record_completion(3);
        stats.record_activation();
        stats.record_discard();

        assert_eq!(stats.activations, 2);
        assert_eq!(stats.steps_completed, 1);
        assert_eq!(stats.deliveries, 3);
        assert_eq!(stats.outputs_discarded, 1);
    }

    #[test]
    fn test_stats_fault() {
        let mut stats = WorkerStats::new();
        stats.record_activation();
        stats.record_fault();

        assert_eq!(stats.faults, 1);
        assert_eq!(stats.steps_completed, 0);
    }
}
