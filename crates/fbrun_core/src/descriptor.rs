//! Block type descriptors.
//!
//! A descriptor names a block type and declares its ports. The order of
//! `inputs` is the positional order of the step arguments and the order
//! of `outputs` is the positional order of the step results.

use crate::error::{CoreError, CoreResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Data type of a data port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// BOOL
    Bool,
    /// Integer types
    Int,
    /// REAL / LREAL
    Real,
    /// STRING / WSTRING
    String,
    /// Untyped
    Any,
}

impl DataType {
    /// Value a port of this type holds before its first write
    #[must_use]
    pub fn initial_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Real => Value::Real(0.0),
            Self::String => Value::Text(String::new()),
            Self::Any => Value::Null,
        }
    }
}

/// Kind of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    /// Event port; carries an activation counter
    Event,
    /// Data port
    Data(DataType),
}

/// Declared port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port name, unique within its block
    pub name: String,
    /// Port kind
    pub kind: PortKind,
}

impl PortSpec {
    /// Declare an event port
    #[must_use]
    pub fn event(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: PortKind::Event,
        }
    }

    /// Declare a data port
    #[must_use]
    pub fn data(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            kind: PortKind::Data(data_type),
        }
    }

    /// Value the port holds before its first write
    #[must_use]
    pub fn initial_value(&self) -> Value {
        match self.kind {
            PortKind::Event => Value::Int(0),
            PortKind::Data(data_type) => data_type.initial_value(),
        }
    }
}

/// Block type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Type name as used by CREATE FB
    pub type_name: String,
    /// Input ports, in step argument order
    pub inputs: Vec<PortSpec>,
    /// Output ports, in step result order
    pub outputs: Vec<PortSpec>,
}

impl TypeDescriptor {
    /// Create an empty descriptor
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Append an input port
    #[must_use]
    pub fn with_input(mut self, port: PortSpec) -> Self {
        self.inputs.push(port);
        self
    }

    /// Append an output port
    #[must_use]
    pub fn with_output(mut self, port: PortSpec) -> Self {
        self.outputs.push(port);
        self
    }

    /// Check that port names are non-empty and unique per block
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] on an empty or duplicate name
    pub fn validate(&self) -> CoreResult<()> {
        if self.type_name.is_empty() {
            return Err(CoreError::Validation {
                field: "type_name".to_string(),
                reason: "empty".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for port in self.inputs.iter().chain(self.outputs.iter()) {
            if port.name.is_empty() || port.name.contains('.') {
                return Err(CoreError::Validation {
                    field: format!("{}.port", self.type_name),
                    reason: format!("invalid port name '{}'", port.name),
                });
            }
            if !seen.insert(port.name.as_str()) {
                return Err(CoreError::Validation {
                    field: format!("{}.port", self.type_name),
                    reason: format!("duplicate port name '{}'", port.name),
                });
            }
        }

        Ok(())
    }
}
