//! fbrun Server
//!
//! Host process pieces: command-line configuration and the TCP
//! transport that feeds framed commands to the manager.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod transport;

pub use config::ServerConfig;
pub use transport::{Server, TransportError};
