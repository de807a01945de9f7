//! Block runtime interface.
//!
//! Every block type implements [`FunctionBlock`]. The worker calls
//! [`FunctionBlock::step`] with a snapshot of the input ports in
//! descriptor order and expects the outputs back in descriptor order.

use fbrun_core::Value;

/// Fault raised by a block's step
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// Step called with (or returned) the wrong number of values
    #[error("Invalid number of arguments: expected {expected}, got {actual}")]
    ArityMismatch {
        /// Declared count
        expected: usize,
        /// Count received
        actual: usize,
    },

    /// Any other fault
    #[error("Step failed: {0}")]
    Failed(String),
}

impl StepError {
    /// Shorthand for [`StepError::Failed`]
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Function block implementation
///
/// Implementations may block inside `step`; the worker runs it on the
/// blocking pool.
pub trait FunctionBlock: Send + 'static {
    /// Run one activation
    ///
    /// # Errors
    ///
    /// Any error stops the owning worker permanently
    fn step(&mut self, inputs: &[Value]) -> Result<Vec<Value>, StepError>;

    /// Release resources held by the block. Called once when the worker
    /// exits, unless the step panicked.
    fn teardown(&mut self) {}
}

/// Check the number of step arguments
///
/// # Errors
///
/// Returns [`StepError::ArityMismatch`] when `inputs.len() != expected`
pub fn expect_arity(inputs: &[Value], expected: usize) -> Result<(), StepError> {
    if inputs.len() == expected {
        Ok(())
    } else {
        Err(StepError::ArityMismatch {
            expected,
            actual: inputs.len(),
        })
    }
}
