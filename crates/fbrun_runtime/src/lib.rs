//! fbrun runtime
//!
//! Dataflow execution engine for event-driven function block networks.
//! Each block runs in its own worker task; outputs propagate along the
//! connection graph of its configuration and raise the event signal of
//! every downstream block.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod blocks;
pub mod configuration;
pub mod graph;
pub mod monitor;
mod port;
pub mod registry;
pub mod watch;
pub mod worker;

pub use block::{FunctionBlock, StepError};
pub use configuration::{Configuration, ConfigurationInfo, EngineConfig};
pub use graph::Connection;
pub use monitor::WorkerStats;
pub use registry::{BlockFactory, BlockRegistry, BlockType, RegistryError};
pub use watch::{ResourceWatches, Sample, Watch, WatchReport};
pub use worker::{BlockSnapshot, BlockWorker, PortValue, WorkerFault, WorkerState};
