//! Command intents.
//!
//! A command intent is the parsed form of one management request: an
//! action, a request identifier, an optional target configuration and
//! the typed operations to apply.

use fbrun_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Management action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Create configurations, blocks, connections or watches
    Create,
    /// List configurations, blocks or connections
    Query,
    /// Drain watches
    Read,
    /// Stop a configuration or the whole device
    Kill,
    /// Remove configurations, blocks, connections or watches
    Delete,
    /// Start a configuration
    Start,
    /// Inject a value into an input port
    Write,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "CREATE",
            Self::Query => "QUERY",
            Self::Read => "READ",
            Self::Kill => "KILL",
            Self::Delete => "DELETE",
            Self::Start => "START",
            Self::Write => "WRITE",
        };
        f.write_str(name)
    }
}

/// Typed operation carried by a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// A block (configuration scope) or a configuration (device scope)
    #[serde(rename = "FB")]
    Fb {
        /// Instance name
        name: String,
        /// Type name; ignored by DELETE, KILL and QUERY
        #[serde(rename = "type", default)]
        type_name: String,
    },

    /// `source` is `BLOCK.PORT`, or the literal value for WRITE
    Connection {
        /// Source port or literal
        #[serde(default)]
        source: String,
        /// Destination `BLOCK.PORT`
        #[serde(default)]
        destination: String,
    },

    /// Watch on `source`, labelled by `destination`
    Watch {
        /// Watched `BLOCK.PORT`
        source: String,
        /// Label; the source reference when empty
        #[serde(default)]
        destination: String,
    },

    /// Every watch (READ)
    Watches,
}

impl Operation {
    /// Short name for logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Fb { .. } => "FB",
            Self::Connection { .. } => "Connection",
            Self::Watch { .. } => "Watch",
            Self::Watches => "Watches",
        }
    }
}

/// One parsed management request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandIntent {
    /// Request identifier echoed in the response
    pub id: String,
    /// Action
    pub action: Action,
    /// Target configuration; absent or empty for device scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Operations, applied in order
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// READ only: drop samples older than this device time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Timestamp>,
}

impl CommandIntent {
    /// Create a device-scope intent
    #[must_use]
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            action,
            target: None,
            operations: Vec::new(),
            since: None,
        }
    }

    /// Target a configuration
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Append an operation
    #[must_use]
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Set the READ lower bound
    #[must_use]
    pub const fn with_since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Target configuration, if the intent is not device-scoped
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.target.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Parse an intent from its JSON body
    ///
    /// # Errors
    ///
    /// Returns error if the body is not a valid command document
    pub fn from_json(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }
}

/// Shorthand for `FB{name, type}`
#[must_use]
pub fn fb(name: &str, type_name: &str) -> Operation {
    Operation::Fb {
        name: name.to_string(),
        type_name: type_name.to_string(),
    }
}

/// Shorthand for `Connection{source, destination}`
#[must_use]
pub fn connection(source: &str, destination: &str) -> Operation {
    Operation::Connection {
        source: source.to_string(),
        destination: destination.to_string(),
    }
}

/// Shorthand for `Watch{source, destination}`
#[must_use]
pub fn watch(source: &str, label: &str) -> Operation {
    Operation::Watch {
        source: source.to_string(),
        destination: label.to_string(),
    }
}
