//! Monitoring bridge hook.
//!
//! External observers (protocol gateways, dashboards) implement
//! [`MonitorBridge`] to mirror the live graph. Hooks are called on the
//! dispatching task, so implementations must return quickly.

use fbrun_runtime::{BlockSnapshot, Configuration};

/// Observer of structural changes made by the manager
pub trait MonitorBridge: Send + Sync {
    /// A configuration was created
    fn on_configuration_created(&self, _configuration: &Configuration) {}

    /// A block was created; `block` carries its ports and current values
    fn on_block_created(&self, _configuration: &str, _block: &BlockSnapshot) {}

    /// A configuration was removed by a device-level DELETE
    fn on_configuration_deleted(&self, _configuration: &str) {}
}

/// Bridge that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBridge;

impl MonitorBridge for NoopBridge {}
