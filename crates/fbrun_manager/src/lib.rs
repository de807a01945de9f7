//! fbrun Manager
//!
//! Supervises the configurations of one device: turns command intents
//! into graph mutations and lifecycle actions, and answers each with a
//! 0x50-framed response.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod command;
pub mod frame;
pub mod manager;
pub mod response;

pub use bridge::{MonitorBridge, NoopBridge};
pub use command::{Action, CommandIntent, Operation};
pub use frame::{encode_frame, FrameCodec, FrameError, FRAME_TAG};
pub use manager::Manager;
pub use response::{Response, ResponseBody};
