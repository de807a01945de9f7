//! fbrun Core Types
//!
//! Pure types shared by the runtime and the manager: port values,
//! port references, block type descriptors, the device clock and the
//! common error type. No I/O and no scheduling lives here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod id;
pub mod time;
pub mod value;

// Re-exports
pub use descriptor::{DataType, PortKind, PortSpec, TypeDescriptor};
pub use error::{CoreError, CoreResult};
pub use id::PortRef;
pub use time::{DeviceClock, Timestamp};
pub use value::Value;
