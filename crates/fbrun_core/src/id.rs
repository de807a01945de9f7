//! Port references.
//!
//! Connections and watches address ports as `BLOCK.PORT`.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to a port of a block within one configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    /// Block name
    pub block: String,
    /// Port name
    pub port: String,
}

impl PortRef {
    /// Create a new reference
    #[must_use]
    pub fn new(block: &str, port: &str) -> Self {
        Self {
            block: block.to_string(),
            port: port.to_string(),
        }
    }

    /// Parse `BLOCK.PORT`; the port is everything after the last dot
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPortRef`] if either side is empty
    pub fn parse(reference: &str) -> CoreResult<Self> {
        let reference = reference.trim();
        match reference.rsplit_once('.') {
            Some((block, port)) if !block.is_empty() && !port.is_empty() => {
                Ok(Self::new(block, port))
            }
            _ => Err(CoreError::InvalidPortRef {
                reason: format!("expected BLOCK.PORT, got '{}'", reference),
            }),
        }
    }
}

impl FromStr for PortRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.block, self.port)
    }
}
