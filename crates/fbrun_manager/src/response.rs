//! Response documents.

use crate::frame::{self, FRAME_TAG};
use bytes::Bytes;
use fbrun_core::CoreResult;
use fbrun_runtime::{BlockSnapshot, ConfigurationInfo, Connection, ResourceWatches};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Payload of a successful command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBody {
    /// READ: every configuration that had samples
    Watches(Vec<ResourceWatches>),
    /// QUERY FB on a configuration
    Blocks(Vec<BlockSnapshot>),
    /// QUERY Connection on a configuration
    Connections(Vec<Connection>),
    /// QUERY on the device
    Resources(Vec<ConfigurationInfo>),
}

/// Response correlated to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Request identifier
    pub id: String,
    /// Payload; absent for a plain acknowledgment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResponseBody>,
}

impl Response {
    /// Acknowledgment with a payload
    #[must_use]
    pub fn new(id: &str, result: Option<ResponseBody>) -> Self {
        Self {
            id: id.to_string(),
            result,
        }
    }

    /// Empty acknowledgment
    #[must_use]
    pub fn empty(id: &str) -> Self {
        Self::new(id, None)
    }

    /// Whether the response carries no payload
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.result.is_none()
    }

    /// Serialize and frame the response
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails or the body does not fit a frame
    pub fn to_frame(&self) -> CoreResult<Bytes> {
        let body = serde_json::to_vec(self)?;
        frame::encode_frame(&body)
    }

    /// Frame the response, falling back to an empty acknowledgment if
    /// the payload does not fit. Never fails.
    #[must_use]
    pub fn into_frame(self) -> Bytes {
        match self.to_frame() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    request = %self.id,
                    error = %err,
                    "response does not fit a frame, sending empty acknowledgment"
                );
                Self::empty(&self.id)
                    .to_frame()
                    .unwrap_or_else(|_| Bytes::from_static(&[FRAME_TAG, 0, 0]))
            }
        }
    }
}
