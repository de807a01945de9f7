//! Ports of a running block.
//!
//! Every port owns its own lock. A write updates the value and records
//! it on the port's watches under that one lock, so watch samples are
//! in write order and no reader sees a half-written value. Output ports
//! additionally own their fan-out list; input ports own their single
//! incoming-edge slot.

use crate::watch::Watch;
use crate::worker::BlockCell;
use fbrun_core::{DeviceClock, PortRef, PortSpec, Value};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::{Arc, Weak};

pub(crate) struct PortState {
    pub(crate) value: Value,
    watches: Vec<Arc<Watch>>,
}

/// Value and watches of one port
pub(crate) struct PortCell {
    spec: PortSpec,
    state: Mutex<PortState>,
}

impl PortCell {
    fn new(spec: PortSpec) -> Self {
        let value = spec.initial_value();
        Self {
            spec,
            state: Mutex::new(PortState {
                value,
                watches: Vec::new(),
            }),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.spec.name
    }

    pub(crate) fn spec(&self) -> &PortSpec {
        &self.spec
    }

    pub(crate) fn value(&self) -> Value {
        self.state.lock().value.clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PortState> {
        self.state.lock()
    }

    pub(crate) fn write(&self, value: Value, clock: &DeviceClock) {
        let mut state = self.state.lock();
        if !state.watches.is_empty() {
            let now = clock.now();
            for watch in &state.watches {
                watch.record(now, value.clone());
            }
        }
        state.value = value;
    }

    pub(crate) fn attach(&self, watch: Arc<Watch>) {
        self.state.lock().watches.push(watch);
    }

    pub(crate) fn detach(&self, watch: &Arc<Watch>) -> bool {
        let mut state = self.state.lock();
        let before = state.watches.len();
        state.watches.retain(|w| !Arc::ptr_eq(w, watch));
        state.watches.len() != before
    }
}

/// Input port with its incoming-edge slot
pub(crate) struct InputPort {
    pub(crate) cell: PortCell,
    /// Source of the single incoming connection
    pub(crate) source: Mutex<Option<PortRef>>,
}

impl InputPort {
    pub(crate) fn new(spec: PortSpec) -> Self {
        Self {
            cell: PortCell::new(spec),
            source: Mutex::new(None),
        }
    }
}

/// Fan-out edge from an output port
#[derive(Clone)]
pub(crate) struct Edge {
    pub(crate) destination: PortRef,
    pub(crate) target: Weak<BlockCell>,
}

/// Output port with its fan-out list
pub(crate) struct OutputPort {
    pub(crate) cell: PortCell,
    pub(crate) fanout: RwLock<Vec<Edge>>,
}

impl OutputPort {
    pub(crate) fn new(spec: PortSpec) -> Self {
        Self {
            cell: PortCell::new(spec),
            fanout: RwLock::new(Vec::new()),
        }
    }

    /// Copy of the current edges; propagation never holds the lock
    /// while delivering.
    pub(crate) fn edges(&self) -> Vec<Edge> {
        self.fanout.read().clone()
    }

    pub(crate) fn destinations(&self) -> Vec<PortRef> {
        self.fanout.read().iter().map(|e| e.destination.clone()).collect()
    }
}
