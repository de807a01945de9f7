//! Watches: passive, timestamped observers on ports.
//!
//! A watch buffers every value written to its port. Reading a watch
//! drains its buffer, so each sample is reported once.

use fbrun_core::{PortRef, Timestamp, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One observed write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the value was written
    pub time: Timestamp,
    /// Value written
    pub value: Value,
}

/// Observer attached to one port
#[derive(Debug)]
pub struct Watch {
    port: PortRef,
    label: String,
    samples: Mutex<Vec<Sample>>,
}

impl Watch {
    /// Create an empty watch
    #[must_use]
    pub fn new(port: PortRef, label: &str) -> Self {
        Self {
            port,
            label: label.to_string(),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Watched port
    #[must_use]
    pub fn port(&self) -> &PortRef {
        &self.port
    }

    /// Label reported with the samples
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Append a sample
    pub fn record(&self, time: Timestamp, value: Value) {
        self.samples.lock().push(Sample { time, value });
    }

    /// Number of buffered samples
    #[must_use]
    pub fn pending(&self) -> usize {
        self.samples.lock().len()
    }

    /// Take every buffered sample stamped at or after `since`.
    /// Older samples are discarded.
    pub fn drain(&self, since: Timestamp) -> Vec<Sample> {
        let taken = std::mem::take(&mut *self.samples.lock());
        taken.into_iter().filter(|s| s.time >= since).collect()
    }
}

/// Samples of one watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchReport {
    /// Watched port as `BLOCK.PORT`
    pub port: String,
    /// Watch label
    pub label: String,
    /// Samples in write order
    pub samples: Vec<Sample>,
}

/// Watch results of one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceWatches {
    /// Configuration name
    pub name: String,
    /// Reports of every watch that had samples
    pub watches: Vec<WatchReport>,
}

impl ResourceWatches {
    /// Total samples across all reports
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.watches.iter().map(|w| w.samples.len()).sum()
    }

    /// Report for a label, if present
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&WatchReport> {
        self.watches.iter().find(|w| w.label == label)
    }
}
