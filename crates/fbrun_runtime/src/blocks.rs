//! Built-in block library.
//!
//! Generic, hardware-free block types registered by
//! [`BlockRegistry::with_builtins`](crate::registry::BlockRegistry::with_builtins).
//!
//! Event ports carry an activation counter. A block emits an event by
//! incrementing the counter on the output port, and detects which input
//! event fired by comparing counters with the previous activation.

use crate::block::{expect_arity, FunctionBlock, StepError};
use crate::registry::BlockRegistry;
use fbrun_core::{DataType, PortSpec, TypeDescriptor, Value};

/// Register every built-in type
pub fn register_builtins(registry: &mut BlockRegistry) {
    let builtins: [(TypeDescriptor, fn() -> Box<dyn FunctionBlock>); 4] = [
        (Move::descriptor(), || Box::new(Move::default())),
        (Add::descriptor(), || Box::new(Add::default())),
        (CountUp::descriptor(), || Box::new(CountUp::default())),
        (EventSplit::descriptor(), || Box::new(EventSplit::default())),
    ];

    for (descriptor, make) in builtins {
        let name = descriptor.type_name.clone();
        if let Err(err) = registry.register(descriptor, move |_| make()) {
            tracing::warn!(block_type = %name, error = %err, "skipping built-in block type");
        }
    }
}

/// Tracks whether an event input changed since the last activation
#[derive(Debug, Default, Clone, Copy)]
struct EventEdge {
    last: i64,
}

impl EventEdge {
    fn fired(&mut self, value: &Value) -> bool {
        let current = value.as_int().unwrap_or(0);
        let fired = current != self.last;
        self.last = current;
        fired
    }
}

/// `MOVE`: copies `IN` to `OUT` on every activation
#[derive(Debug, Default)]
pub struct Move {
    cnf: i64,
}

impl Move {
    /// Port schema
    #[must_use]
    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new("MOVE")
            .with_input(PortSpec::event("REQ"))
            .with_input(PortSpec::data("IN", DataType::Any))
            .with_output(PortSpec::event("CNF"))
            .with_output(PortSpec::data("OUT", DataType::Any))
    }
}

impl FunctionBlock for Move {
    fn step(&mut self, inputs: &[Value]) -> Result<Vec<Value>, StepError> {
        expect_arity(inputs, 2)?;
        self.cnf += 1;
        Ok(vec![Value::Int(self.cnf), inputs[1].clone()])
    }
}

/// `ADD`: `OUT := IN1 + IN2`
///
/// Two integers add as integers; otherwise both sides are widened to
/// reals. Overflow and non-numeric operands are step failures.
#[derive(Debug, Default)]
pub struct Add {
    cnf: i64,
}

impl Add {
    /// Port schema
    #[must_use]
    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new("ADD")
            .with_input(PortSpec::event("REQ"))
            .with_input(PortSpec::data("IN1", DataType::Real))
            .with_input(PortSpec::data("IN2", DataType::Real))
            .with_output(PortSpec::event("CNF"))
            .with_output(PortSpec::data("OUT", DataType::Real))
    }
}

impl FunctionBlock for Add {
    fn step(&mut self, inputs: &[Value]) -> Result<Vec<Value>, StepError> {
        expect_arity(inputs, 3)?;
        let sum = match (&inputs[1], &inputs[2]) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| StepError::failed(format!("overflow adding {} and {}", a, b)))?,
            (a, b) => match (a.as_real(), b.as_real()) {
                (Some(x), Some(y)) => Value::Real(x + y),
                _ => return Err(StepError::failed(format!("cannot add {} and {}", a, b))),
            },
        };
        self.cnf += 1;
        Ok(vec![Value::Int(self.cnf), sum])
    }
}

/// `E_CTU`: event-driven up counter
///
/// `CU` increments `CV`, `R` resets it; `Q` is `CV >= PV`.
#[derive(Debug, Default)]
pub struct CountUp {
    cu: EventEdge,
    r: EventEdge,
    cv: i64,
    cuo: i64,
    ro: i64,
}

impl CountUp {
    /// Port schema
    #[must_use]
    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new("E_CTU")
            .with_input(PortSpec::event("CU"))
            .with_input(PortSpec::event("R"))
            .with_input(PortSpec::data("PV", DataType::Int))
            .with_output(PortSpec::event("CUO"))
            .with_output(PortSpec::event("RO"))
            .with_output(PortSpec::data("Q", DataType::Bool))
            .with_output(PortSpec::data("CV", DataType::Int))
    }
}

impl FunctionBlock for CountUp {
    fn step(&mut self, inputs: &[Value]) -> Result<Vec<Value>, StepError> {
        expect_arity(inputs, 3)?;

        if self.r.fired(&inputs[1]) {
            self.cv = 0;
            self.ro += 1;
        }
        if self.cu.fired(&inputs[0]) {
            self.cv = self.cv.saturating_add(1);
            self.cuo += 1;
        }

        let pv = inputs[2].as_int().unwrap_or(0);
        Ok(vec![
            Value::Int(self.cuo),
            Value::Int(self.ro),
            Value::Bool(self.cv >= pv),
            Value::Int(self.cv),
        ])
    }
}

/// `E_SPLIT`: one event in, two events out
#[derive(Debug, Default)]
pub struct EventSplit {
    count: i64,
}

impl EventSplit {
    /// Port schema
    #[must_use]
    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new("E_SPLIT")
            .with_input(PortSpec::event("EI"))
            .with_output(PortSpec::event("EO1"))
            .with_output(PortSpec::event("EO2"))
    }
}

impl FunctionBlock for EventSplit {
    fn step(&mut self, inputs: &[Value]) -> Result<Vec<Value>, StepError> {
        expect_arity(inputs, 1)?;
        self.count += 1;
        Ok(vec![Value::Int(self.count), Value::Int(self.count)])
    }
}
