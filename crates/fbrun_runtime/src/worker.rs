//! Block worker: one independently scheduled task per block.
//!
//! The worker suspends until an input event or a stop request, snapshots
//! its inputs, runs the block's step on the blocking pool, then commits
//! and propagates the outputs. A fault in the step stops this worker and
//! nothing else. Events are level-triggered: signals that arrive while a
//! step runs coalesce into one further wake.

use crate::block::{FunctionBlock, StepError};
use crate::graph;
use crate::monitor::WorkerStats;
use crate::port::{InputPort, OutputPort, PortCell};
use fbrun_core::{CoreError, CoreResult, DeviceClock, PortKind, TypeDescriptor, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerState {
    /// Created, task not spawned yet
    Idle,
    /// Suspended at the event wait
    Waiting,
    /// Executing a step
    Running,
    /// Stop requested, task still exiting
    Stopping,
    /// Task exited; never restarts
    Stopped,
}

/// Fault that stopped a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum WorkerFault {
    /// Wrong number of step arguments or results
    #[error("Arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch {
        /// Declared count
        expected: usize,
        /// Count seen
        actual: usize,
    },

    /// Any other fault raised during the step, including a panic
    #[error("Step failure: {message}")]
    StepFailure {
        /// Fault description
        message: String,
    },
}

impl From<StepError> for WorkerFault {
    fn from(err: StepError) -> Self {
        match err {
            StepError::ArityMismatch { expected, actual } => {
                Self::ArityMismatch { expected, actual }
            }
            StepError::Failed(message) => Self::StepFailure { message },
        }
    }
}

/// Current value of one port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortValue {
    /// Port name
    pub name: String,
    /// Port kind
    pub kind: PortKind,
    /// Current value
    pub value: Value,
}

/// Point-in-time view of a worker, for QUERY and the monitoring bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    /// Block name
    pub name: String,
    /// Block type
    pub type_name: String,
    /// Lifecycle state
    pub state: WorkerState,
    /// Fault that stopped the worker, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<WorkerFault>,
    /// Input ports in descriptor order
    pub inputs: Vec<PortValue>,
    /// Output ports in descriptor order
    pub outputs: Vec<PortValue>,
    /// Execution counters
    pub stats: WorkerStats,
}

struct Status {
    state: WorkerState,
    fault: Option<WorkerFault>,
}

/// State shared between a worker handle, its task and upstream edges
pub(crate) struct BlockCell {
    name: String,
    resource: String,
    clock: DeviceClock,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    event: Notify,
    status: Mutex<Status>,
    stats: Mutex<WorkerStats>,
}

impl BlockCell {
    fn new(resource: &str, name: &str, descriptor: &TypeDescriptor, clock: DeviceClock) -> Self {
        Self {
            name: name.to_string(),
            resource: resource.to_string(),
            clock,
            inputs: descriptor.inputs.iter().cloned().map(InputPort::new).collect(),
            outputs: descriptor.outputs.iter().cloned().map(OutputPort::new).collect(),
            event: Notify::new(),
            status: Mutex::new(Status {
                state: WorkerState::Idle,
                fault: None,
            }),
            stats: Mutex::new(WorkerStats::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    pub(crate) fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub(crate) fn input(&self, port: &str) -> CoreResult<&InputPort> {
        self.inputs
            .iter()
            .find(|p| p.cell.name() == port)
            .ok_or_else(|| CoreError::not_found("input port", format!("{}.{}", self.name, port)))
    }

    pub(crate) fn output(&self, port: &str) -> CoreResult<&OutputPort> {
        self.outputs
            .iter()
            .find(|p| p.cell.name() == port)
            .ok_or_else(|| CoreError::not_found("output port", format!("{}.{}", self.name, port)))
    }

    /// Input or output port by name
    pub(crate) fn port(&self, port: &str) -> CoreResult<&PortCell> {
        self.inputs
            .iter()
            .map(|p| &p.cell)
            .chain(self.outputs.iter().map(|p| &p.cell))
            .find(|c| c.name() == port)
            .ok_or_else(|| CoreError::not_found("port", format!("{}.{}", self.name, port)))
    }

    /// Snapshot every input under all input locks, taken in descriptor
    /// order, so the step sees one consistent set of values.
    fn read_inputs(&self) -> Vec<Value> {
        let guards: Vec<_> = self.inputs.iter().map(|p| p.cell.lock()).collect();
        guards.iter().map(|g| g.value.clone()).collect()
    }

    /// Write an input and raise the event signal
    pub(crate) fn deliver(&self, port: &str, value: Value) -> CoreResult<()> {
        let input = self.input(port)?;
        input.cell.write(value, &self.clock);
        self.event.notify_one();
        Ok(())
    }

    /// Write every output, then propagate data ports before event
    /// ports so a downstream step never sees an event ahead of its data.
    /// Returns the delivery count.
    fn commit_outputs(&self, values: Vec<Value>) -> u64 {
        for (port, value) in self.outputs.iter().zip(&values) {
            port.cell.write(value.clone(), &self.clock);
        }

        let written: Vec<_> = self.outputs.iter().zip(&values).collect();
        let is_data = |port: &&OutputPort| matches!(port.cell.spec().kind, PortKind::Data(_));
        let data = written.iter().filter(|(port, _)| is_data(port));
        let events = written.iter().filter(|(port, _)| !is_data(port));
        data.chain(events)
            .map(|(port, value)| graph::propagate(&self.name, port, value))
            .sum()
    }

    fn state(&self) -> WorkerState {
        self.status.lock().state
    }

    /// Move to `to`; a stopping worker only moves to Stopped and a
    /// stopped worker never moves again.
    fn transition(&self, to: WorkerState) {
        let mut status = self.status.lock();
        match (status.state, to) {
            (WorkerState::Stopped, _) => {}
            (WorkerState::Stopping, next) if next != WorkerState::Stopped => {}
            _ => status.state = to,
        }
    }

    fn fail(&self, fault: WorkerFault) {
        self.stats.lock().record_fault();
        self.status.lock().fault = Some(fault);
    }
}

/// Handle to one block's worker task
pub struct BlockWorker {
    cell: Arc<BlockCell>,
    descriptor: Arc<TypeDescriptor>,
    cancel: CancellationToken,
    pending: Mutex<Option<Box<dyn FunctionBlock>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BlockWorker {
    /// Wrap a block instance; the task is not spawned until [`start`](Self::start)
    #[must_use]
    pub fn new(
        resource: &str,
        name: &str,
        descriptor: Arc<TypeDescriptor>,
        block: Box<dyn FunctionBlock>,
        clock: DeviceClock,
    ) -> Self {
        Self {
            cell: Arc::new(BlockCell::new(resource, name, &descriptor, clock)),
            descriptor,
            cancel: CancellationToken::new(),
            pending: Mutex::new(Some(block)),
            handle: Mutex::new(None),
        }
    }

    /// Block name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Block type name
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.descriptor.type_name
    }

    /// Port schema
    #[must_use]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.cell.state()
    }

    /// Fault that stopped the worker
    #[must_use]
    pub fn fault(&self) -> Option<WorkerFault> {
        self.cell.status.lock().fault.clone()
    }

    /// Execution counters
    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        *self.cell.stats.lock()
    }

    pub(crate) fn cell(&self) -> &Arc<BlockCell> {
        &self.cell
    }

    /// Spawn the worker task on the current tokio runtime.
    ///
    /// Returns `Ok(false)` if the worker was already started or stopped.
    ///
    /// # Errors
    ///
    /// Returns error if called outside a tokio runtime
    pub fn start(&self) -> CoreResult<bool> {
        let mut pending = self.pending.lock();
        if pending.is_none() {
            return Ok(false);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|err| CoreError::Validation {
            field: "runtime".to_string(),
            reason: err.to_string(),
        })?;

        let Some(block) = pending.take() else {
            return Ok(false);
        };

        self.cell.transition(WorkerState::Waiting);
        let task = runtime.spawn(run(Arc::clone(&self.cell), block, self.cancel.clone()));
        *self.handle.lock() = Some(task);
        Ok(true)
    }

    /// Request a cooperative stop. A running step finishes but its
    /// outputs are discarded.
    pub fn stop(&self) {
        self.cancel.cancel();

        if let Some(mut block) = self.pending.lock().take() {
            block.teardown();
            self.cell.transition(WorkerState::Stopped);
            info!(
                resource = %self.cell.resource,
                block = %self.cell.name,
                "block stopped before start"
            );
            return;
        }

        self.cell.transition(WorkerState::Stopping);
    }

    /// Wait for the task to exit. Returns `false` if it does not exit
    /// within `timeout`; the task is then detached and still discards the
    /// outputs of its running step and tears the block down once the
    /// step returns.
    pub async fn join(&self, timeout: Duration) -> bool {
        let Some(mut task) = self.handle.lock().take() else {
            return true;
        };

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                error!(
                    resource = %self.cell.resource,
                    block = %self.cell.name,
                    error = %err,
                    "block task ended abnormally"
                );
                self.cell.transition(WorkerState::Stopped);
                true
            }
            Err(_) => {
                warn!(
                    resource = %self.cell.resource,
                    block = %self.cell.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "block did not stop in time, detaching its task"
                );
                drop(task);
                self.cell.transition(WorkerState::Stopped);
                false
            }
        }
    }

    /// Write an input port and raise the event signal
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the input port does not exist
    pub fn deliver_input(&self, port: &str, value: Value) -> CoreResult<()> {
        self.cell.deliver(port, value)
    }

    /// Current value of an input port
    #[must_use]
    pub fn input_value(&self, port: &str) -> Option<Value> {
        self.cell.input(port).ok().map(|p| p.cell.value())
    }

    /// Current value of an output port
    #[must_use]
    pub fn output_value(&self, port: &str) -> Option<Value> {
        self.cell.output(port).ok().map(|p| p.cell.value())
    }

    /// Point-in-time view of the block
    #[must_use]
    pub fn snapshot(&self) -> BlockSnapshot {
        let describe = |cell: &PortCell| PortValue {
            name: cell.name().to_string(),
            kind: cell.spec().kind,
            value: cell.value(),
        };
        let status = self.cell.status.lock();
        let (state, fault) = (status.state, status.fault.clone());
        drop(status);

        BlockSnapshot {
            name: self.cell.name.clone(),
            type_name: self.descriptor.type_name.clone(),
            state,
            fault,
            inputs: self.cell.inputs.iter().map(|p| describe(&p.cell)).collect(),
            outputs: self.cell.outputs.iter().map(|p| describe(&p.cell)).collect(),
            stats: self.stats(),
        }
    }
}

impl Drop for BlockWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for BlockWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockWorker")
            .field("name", &self.cell.name)
            .field("type_name", &self.descriptor.type_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn run(cell: Arc<BlockCell>, mut block: Box<dyn FunctionBlock>, cancel: CancellationToken) {
    info!(resource = %cell.resource, block = %cell.name, "block started");

    loop {
        cell.transition(WorkerState::Waiting);
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = cell.event.notified() => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        cell.transition(WorkerState::Running);
        cell.stats.lock().record_activation();
        let inputs = cell.read_inputs();
        debug!(resource = %cell.resource, block = %cell.name, ?inputs, "running block step");

        let outcome = tokio::task::spawn_blocking(move || {
            let result = block.step(&inputs);
            (block, result)
        })
        .await;

        let result = match outcome {
            Ok((returned, result)) => {
                block = returned;
                result
            }
            Err(err) => {
                let message = panic_message(err);
                error!(
                    resource = %cell.resource,
                    block = %cell.name,
                    %message,
                    "block step panicked, stopping the block"
                );
                cell.fail(WorkerFault::StepFailure { message });
                cell.transition(WorkerState::Stopped);
                return;
            }
        };

        let outputs = match result {
            Ok(outputs) => outputs,
            Err(err) => {
                if matches!(err, StepError::ArityMismatch { .. }) {
                    error!(
                        resource = %cell.resource,
                        block = %cell.name,
                        error = %err,
                        "invalid number of arguments, check the block type descriptor"
                    );
                } else {
                    error!(
                        resource = %cell.resource,
                        block = %cell.name,
                        error = %err,
                        "block step failed"
                    );
                }
                cell.fail(err.into());
                break;
            }
        };

        if cancel.is_cancelled() {
            debug!(
                resource = %cell.resource,
                block = %cell.name,
                "stop requested during step, discarding outputs"
            );
            cell.stats.lock().record_discard();
            break;
        }

        if outputs.len() != cell.outputs.len() {
            error!(
                resource = %cell.resource,
                block = %cell.name,
                expected = cell.outputs.len(),
                actual = outputs.len(),
                "step returned the wrong number of outputs"
            );
            cell.fail(WorkerFault::ArityMismatch {
                expected: cell.outputs.len(),
                actual: outputs.len(),
            });
            break;
        }

        let deliveries = cell.commit_outputs(outputs);
        cell.stats.lock().record_completion(deliveries);
    }

    info!(resource = %cell.resource, block = %cell.name, "stopping the block");
    if let Err(err) = tokio::task::spawn_blocking(move || block.teardown()).await {
        warn!(resource = %cell.resource, block = %cell.name, error = %err, "block teardown failed");
    }
    cell.transition(WorkerState::Stopped);
    info!(resource = %cell.resource, block = %cell.name, "block stopped");
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return "step task cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("step panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("step panicked: {}", s)
    } else {
        "step panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbrun_core::{DataType, PortSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..400 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    fn echo_descriptor() -> Arc<TypeDescriptor> {
        Arc::new(
            TypeDescriptor::new("ECHO")
                .with_input(PortSpec::event("REQ"))
                .with_input(PortSpec::data("IN", DataType::Any))
                .with_output(PortSpec::data("OUT", DataType::Any)),
        )
    }

    struct Echo {
        steps: Arc<AtomicUsize>,
        delay: Duration,
        torn_down: Arc<AtomicUsize>,
    }

    impl Echo {
        fn new() -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let steps = Arc::new(AtomicUsize::new(0));
            let torn_down = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    steps: Arc::clone(&steps),
                    delay: Duration::ZERO,
                    torn_down: Arc::clone(&torn_down),
                },
                steps,
                torn_down,
            )
        }
    }

    impl FunctionBlock for Echo {
        fn step(&mut self, inputs: &[Value]) -> Result<Vec<Value>, StepError> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.steps.fetch_add(1, Ordering::SeqCst);
            Ok(vec![inputs[1].clone()])
        }

        fn teardown(&mut self) {
            self.torn_down.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Faulty(StepError);

    impl FunctionBlock for Faulty {
        fn step(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, StepError> {
            Err(self.0.clone())
        }
    }

    struct Panicky;

    impl FunctionBlock for Panicky {
        fn step(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, StepError> {
            panic!("sensor unplugged");
        }
    }

    struct WrongOutputs;

    impl FunctionBlock for WrongOutputs {
        fn step(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, StepError> {
            Ok(vec![Value::Int(1), Value::Int(2)])
        }
    }

    fn worker(block: Box<dyn FunctionBlock>) -> BlockWorker {
        BlockWorker::new("RES0", "B", echo_descriptor(), block, DeviceClock::start())
    }

    #[tokio::test]
    async fn test_worker_new_is_idle() {
        let (echo, _, _) = Echo::new();
        let w = worker(Box::new(echo));
        assert_eq!(w.state(), WorkerState::Idle);
        assert_eq!(w.name(), "B");
        assert_eq!(w.type_name(), "ECHO");
        assert_eq!(w.input_value("IN"), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_worker_steps_on_event() {
        let (echo, steps, _) = Echo::new();
        let w = worker(Box::new(echo));
        assert!(w.start().unwrap());
        assert!(!w.start().unwrap());

        w.deliver_input("IN", Value::Int(7)).unwrap();
        assert!(wait_until(|| w.output_value("OUT") == Some(Value::Int(7))).await);
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert_eq!(w.stats().steps_completed, 1);
        assert!(wait_until(|| w.state() == WorkerState::Waiting).await);

        w.stop();
        assert!(w.join(Duration::from_secs(2)).await);
        assert_eq!(w.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_worker_unknown_port() {
        let (echo, _, _) = Echo::new();
        let w = worker(Box::new(echo));
        let err = w.deliver_input("NOPE", Value::Int(1)).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_worker_signals_coalesce_while_running() {
        let (mut echo, steps, _) = Echo::new();
        echo.delay = Duration::from_millis(100);
        let w = worker(Box::new(echo));
        w.start().unwrap();

        w.deliver_input("IN", Value::Int(1)).unwrap();
        assert!(wait_until(|| w.state() == WorkerState::Running).await);
        for i in 2..=5 {
            w.deliver_input("IN", Value::Int(i)).unwrap();
        }

        let settled = || steps.load(Ordering::SeqCst) == 2 && w.state() == WorkerState::Waiting;
        assert!(wait_until(settled).await);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(steps.load(Ordering::SeqCst), 2);
        assert_eq!(w.output_value("OUT"), Some(Value::Int(5)));

        w.stop();
        w.join(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_worker_stop_discards_outputs_of_running_step() {
        let (mut echo, steps, torn_down) = Echo::new();
        echo.delay = Duration::from_millis(100);
        let w = worker(Box::new(echo));
        w.start().unwrap();

        w.deliver_input("IN", Value::Int(9)).unwrap();
        assert!(wait_until(|| w.state() == WorkerState::Running).await);
        w.stop();
        assert_eq!(w.state(), WorkerState::Stopping);

        assert!(w.join(Duration::from_secs(2)).await);
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert_eq!(w.output_value("OUT"), Some(Value::Null));
        assert_eq!(w.stats().outputs_discarded, 1);
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
        assert_eq!(w.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_worker_stop_before_start_tears_down() {
        let (echo, _, torn_down) = Echo::new();
        let w = worker(Box::new(echo));
        w.stop();
        assert_eq!(w.state(), WorkerState::Stopped);
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
        assert!(!w.start().unwrap());
        assert!(w.join(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_worker_step_failure_stops_worker() {
        let w = worker(Box::new(Faulty(StepError::failed("jammed"))));
        w.start().unwrap();
        w.deliver_input("REQ", Value::Int(1)).unwrap();

        assert!(wait_until(|| w.state() == WorkerState::Stopped).await);
        assert_eq!(
            w.fault(),
            Some(WorkerFault::StepFailure { message: "jammed".to_string() })
        );
        assert_eq!(w.stats().faults, 1);

        // further events are ignored
        w.deliver_input("REQ", Value::Int(2)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(w.stats().activations, 1);
    }

    #[tokio::test]
    async fn test_worker_arity_mismatch_stops_worker() {
        let w = worker(Box::new(Faulty(StepError::ArityMismatch { expected: 3, actual: 2 })));
        w.start().unwrap();
        w.deliver_input("REQ", Value::Int(1)).unwrap();

        assert!(wait_until(|| w.state() == WorkerState::Stopped).await);
        assert_eq!(w.fault(), Some(WorkerFault::ArityMismatch { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn test_worker_wrong_output_count_is_arity_mismatch() {
        let w = worker(Box::new(WrongOutputs));
        w.start().unwrap();
        w.deliver_input("REQ", Value::Int(1)).unwrap();

        assert!(wait_until(|| w.state() == WorkerState::Stopped).await);
        assert_eq!(w.fault(), Some(WorkerFault::ArityMismatch { expected: 1, actual: 2 }));
        assert_eq!(w.output_value("OUT"), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_worker_panic_is_contained() {
        let w = worker(Box::new(Panicky));
        w.start().unwrap();
        w.deliver_input("REQ", Value::Int(1)).unwrap();

        assert!(wait_until(|| w.state() == WorkerState::Stopped).await);
        match w.fault() {
            Some(WorkerFault::StepFailure { message }) => {
                assert!(message.contains("sensor unplugged"))
            }
            other => panic!("unexpected fault: {:?}", other),
        }
        assert!(w.join(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_worker_join_timeout_still_tears_down() {
        let (mut echo, steps, torn_down) = Echo::new();
        echo.delay = Duration::from_millis(200);
        let w = worker(Box::new(echo));
        w.start().unwrap();
        w.deliver_input("IN", Value::Int(1)).unwrap();
        assert!(wait_until(|| w.state() == WorkerState::Running).await);

        w.stop();
        assert!(!w.join(Duration::from_millis(20)).await);
        assert_eq!(w.state(), WorkerState::Stopped);
        assert_eq!(torn_down.load(Ordering::SeqCst), 0);

        assert!(wait_until(|| torn_down.load(Ordering::SeqCst) == 1).await);
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert_eq!(w.output_value("OUT"), Some(Value::Null));
        assert_eq!(w.stats().outputs_discarded, 1);
    }

    #[tokio::test]
    async fn test_worker_snapshot() {
        let (echo, _, _) = Echo::new();
        let w = worker(Box::new(echo));
        w.deliver_input("IN", Value::Text("x".into())).unwrap();

        let snap = w.snapshot();
        assert_eq!(snap.name, "B");
        assert_eq!(snap.type_name, "ECHO");
        assert_eq!(snap.state, WorkerState::Idle);
        assert_eq!(snap.inputs.len(), 2);
        assert_eq!(snap.inputs[1].value, Value::Text("x".into()));
        assert_eq!(snap.outputs[0].name, "OUT");
        assert!(snap.fault.is_none());
    }

    #[test]
    fn test_worker_start_outside_runtime() {
        let (echo, _, _) = Echo::new();
        let w = worker(Box::new(echo));
        assert!(w.start().is_err());
        assert_eq!(w.state(), WorkerState::Idle);
    }
}
