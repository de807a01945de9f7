//! Connection graph.
//!
//! Edges live on the ports themselves: an output port holds its fan-out
//! list and an input port holds the source of its single incoming edge.
//! Lock order is always input slot, then output fan-out. Propagation
//! only takes a fan-out read lock long enough to copy the edge list.

use crate::port::{Edge, OutputPort};
use crate::worker::BlockCell;
use fbrun_core::{CoreError, CoreResult, PortRef, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Directed edge from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Output port
    pub source: PortRef,
    /// Input port
    pub destination: PortRef,
}

impl Connection {
    /// Create a new connection
    #[must_use]
    pub fn new(source: PortRef, destination: PortRef) -> Self {
        Self {
            source,
            destination,
        }
    }
}

/// Register `source -> destination`, replacing any edge that already
/// feeds `destination`. Returns the replaced source, if any.
///
/// `resolve` looks up other blocks of the same configuration; it is used
/// to unlink a replaced edge from its old source.
pub(crate) fn connect<'a>(
    source: &BlockCell,
    source_port: &str,
    destination: &Arc<BlockCell>,
    destination_port: &str,
    resolve: impl Fn(&str) -> Option<&'a Arc<BlockCell>>,
) -> CoreResult<Option<PortRef>> {
    let output = source.output(source_port)?;
    let input = destination.input(destination_port)?;

    let new_source = PortRef::new(source.name(), source_port);
    let destination_ref = PortRef::new(destination.name(), destination_port);

    let mut slot = input.source.lock();
    if slot.as_ref() == Some(&new_source) {
        return Ok(None);
    }

    let replaced = slot.take();
    if let Some(old) = &replaced {
        match resolve(&old.block).map(|cell| cell.output(&old.port)) {
            Some(Ok(old_output)) => unlink(old_output, &destination_ref),
            _ => warn!(
                source = %old,
                destination = %destination_ref,
                "replaced edge had no live source"
            ),
        }
        debug!(
            old = %old,
            new = %new_source,
            destination = %destination_ref,
            "replacing incoming connection"
        );
    }

    output.fanout.write().push(Edge {
        destination: destination_ref,
        target: Arc::downgrade(destination),
    });
    *slot = Some(new_source);

    Ok(replaced)
}

/// Remove `source -> destination`
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if no such edge exists
pub(crate) fn disconnect(
    source: &BlockCell,
    source_port: &str,
    destination: &BlockCell,
    destination_port: &str,
) -> CoreResult<()> {
    let output = source.output(source_port)?;
    let input = destination.input(destination_port)?;

    let source_ref = PortRef::new(source.name(), source_port);
    let destination_ref = PortRef::new(destination.name(), destination_port);

    let mut slot = input.source.lock();
    if slot.as_ref() != Some(&source_ref) {
        return Err(CoreError::not_found(
            "connection",
            format!("{} -> {}", source_ref, destination_ref),
        ));
    }

    unlink(output, &destination_ref);
    *slot = None;
    Ok(())
}

/// Drop every edge into or out of `cell`
pub(crate) fn isolate<'a>(cell: &BlockCell, resolve: impl Fn(&str) -> Option<&'a Arc<BlockCell>>) {
    for input in cell.inputs() {
        let mut slot = input.source.lock();
        if let Some(old) = slot.take() {
            let destination_ref = PortRef::new(cell.name(), input.cell.name());
            if let Some(Ok(old_output)) = resolve(&old.block).map(|c| c.output(&old.port)) {
                unlink(old_output, &destination_ref);
            }
        }
    }

    let own = |port: &str| PortRef::new(cell.name(), port);
    for output in cell.outputs() {
        let edges = std::mem::take(&mut *output.fanout.write());
        let source_ref = own(output.cell.name());
        for edge in edges {
            if let Some(target) = edge.target.upgrade() {
                if let Ok(input) = target.input(&edge.destination.port) {
                    let mut slot = input.source.lock();
                    if slot.as_ref() == Some(&source_ref) {
                        *slot = None;
                    }
                }
            }
        }
    }
}

/// Every edge leaving `cell`
pub(crate) fn outgoing(cell: &BlockCell) -> Vec<Connection> {
    cell.outputs()
        .iter()
        .flat_map(|output| {
            let source = PortRef::new(cell.name(), output.cell.name());
            output
                .destinations()
                .into_iter()
                .map(move |destination| Connection::new(source.clone(), destination))
        })
        .collect()
}

/// Deliver a freshly written output to every connected input and raise
/// each destination's event. Returns the number of deliveries.
pub(crate) fn propagate(source: &str, port: &OutputPort, value: &Value) -> u64 {
    let mut delivered = 0;
    for edge in port.edges() {
        let Some(target) = edge.target.upgrade() else {
            continue;
        };
        match target.deliver(&edge.destination.port, value.clone()) {
            Ok(()) => {
                delivered += 1;
                debug!(
                    source = %format_args!("{}.{}", source, port.cell.name()),
                    destination = %edge.destination,
                    "propagated value"
                );
            }
            Err(err) => warn!(destination = %edge.destination, error = %err, "propagation failed"),
        }
    }
    delivered
}

fn unlink(output: &OutputPort, destination: &PortRef) {
    output.fanout.write().retain(|e| &e.destination != destination);
}
