//! Configuration (resource): one logical device application.
//!
//! A configuration owns its block workers, the connection graph between
//! them and the watches on their ports. Operations take the block map
//! lock only long enough to resolve names; nothing here holds a lock
//! across an await.

use crate::graph::{self, Connection};
use crate::registry::BlockRegistry;
use crate::watch::{ResourceWatches, Watch, WatchReport};
use crate::worker::{BlockSnapshot, BlockWorker, WorkerState};
use fbrun_core::{CoreError, CoreResult, DeviceClock, PortRef, Timestamp, Value};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-configuration engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on waiting for workers to exit on stop
    pub stop_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Set the stop timeout
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

/// Summary of a configuration for device-level QUERY
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationInfo {
    /// Configuration name
    pub name: String,
    /// Configuration type tag
    #[serde(rename = "type")]
    pub type_name: String,
    /// Number of blocks
    pub blocks: usize,
}

type WatchKey = (PortRef, String);

/// A running resource
pub struct Configuration {
    name: String,
    type_name: String,
    config: EngineConfig,
    clock: DeviceClock,
    registry: Arc<BlockRegistry>,
    blocks: RwLock<IndexMap<String, Arc<BlockWorker>>>,
    watches: Mutex<IndexMap<WatchKey, Arc<Watch>>>,
}

impl Configuration {
    /// Create an empty configuration
    #[must_use]
    pub fn new(
        name: &str,
        type_name: &str,
        registry: Arc<BlockRegistry>,
        clock: DeviceClock,
    ) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            config: EngineConfig::default(),
            clock,
            registry,
            blocks: RwLock::new(IndexMap::new()),
            watches: Mutex::new(IndexMap::new()),
        }
    }

    /// Replace the engine settings
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Configuration name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration type tag
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Summary for device-level QUERY
    #[must_use]
    pub fn info(&self) -> ConfigurationInfo {
        ConfigurationInfo {
            name: self.name.clone(),
            type_name: self.type_name.clone(),
            blocks: self.block_count(),
        }
    }

    /// Number of blocks
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Number of watches
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches.lock().len()
    }

    /// Look up a block worker
    #[must_use]
    pub fn block(&self, name: &str) -> Option<Arc<BlockWorker>> {
        self.blocks.read().get(name).cloned()
    }

    /// Instantiate a block of `type_name` and start its worker.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AlreadyExists`] if the name is taken, whatever the type
    /// - [`CoreError::NotFound`] if the type is unknown
    /// - [`CoreError::Validation`] if called outside a tokio runtime
    pub fn create_fb(&self, name: &str, type_name: &str) -> CoreResult<Arc<BlockWorker>> {
        if name.is_empty() || name.contains('.') {
            return Err(CoreError::Validation {
                field: "name".to_string(),
                reason: format!("invalid block name {:?}", name),
            });
        }

        let mut blocks = self.blocks.write();
        if blocks.contains_key(name) {
            return Err(CoreError::already_exists("block", format!("{}.{}", self.name, name)));
        }

        let block_type = self.registry.get(type_name)?;

        let worker = Arc::new(BlockWorker::new(
            &self.name,
            name,
            Arc::clone(&block_type.descriptor),
            block_type.instantiate(),
            self.clock,
        ));
        worker.start()?;
        blocks.insert(name.to_string(), Arc::clone(&worker));

        info!(resource = %self.name, block = %name, block_type = %type_name, "created block");
        Ok(worker)
    }

    /// Stop, join and remove one block together with every edge and
    /// watch touching it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the block does not exist
    pub async fn delete_fb(&self, name: &str) -> CoreResult<()> {
        let worker = self
            .blocks
            .write()
            .shift_remove(name)
            .ok_or_else(|| CoreError::not_found("block", format!("{}.{}", self.name, name)))?;

        worker.stop();
        worker.join(self.config.stop_timeout).await;

        {
            let blocks = self.blocks.read();
            let map: &IndexMap<String, Arc<BlockWorker>> = &blocks;
            graph::isolate(worker.cell(), |other| map.get(other).map(|w| w.cell()));
        }
        self.watches.lock().retain(|(port, _), _| port.block != name);

        info!(resource = %self.name, block = %name, "deleted block");
        Ok(())
    }

    /// Connect an output port to an input port, replacing any edge that
    /// already feeds the input.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if either block or port is unknown
    pub fn create_connection(&self, source: &PortRef, destination: &PortRef) -> CoreResult<()> {
        let blocks = self.blocks.read();
        let map: &IndexMap<String, Arc<BlockWorker>> = &blocks;
        let src = self.lookup(map, &source.block)?;
        let dst = self.lookup(map, &destination.block)?;

        let replaced = graph::connect(
            src.cell(),
            &source.port,
            dst.cell(),
            &destination.port,
            |name| map.get(name).map(|w| w.cell()),
        )?;

        match replaced {
            Some(old) => info!(
                resource = %self.name,
                source = %source,
                destination = %destination,
                replaced = %old,
                "replaced connection"
            ),
            None => info!(
                resource = %self.name,
                source = %source,
                destination = %destination,
                "created connection"
            ),
        }
        Ok(())
    }

    /// Remove a connection
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the blocks, ports or edge are unknown
    pub fn delete_connection(&self, source: &PortRef, destination: &PortRef) -> CoreResult<()> {
        let blocks = self.blocks.read();
        let src = self.lookup(&blocks, &source.block)?;
        let dst = self.lookup(&blocks, &destination.block)?;

        graph::disconnect(src.cell(), &source.port, dst.cell(), &destination.port)?;
        info!(
            resource = %self.name,
            source = %source,
            destination = %destination,
            "deleted connection"
        );
        Ok(())
    }

    /// Attach a watch labelled `label` to a port.
    ///
    /// Returns `false` if the same watch already exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the block or port is unknown
    pub fn create_watch(&self, source: &PortRef, label: &str) -> CoreResult<bool> {
        let blocks = self.blocks.read();
        let worker = self.lookup(&blocks, &source.block)?;
        let port = worker.cell().port(&source.port)?;

        let mut watches = self.watches.lock();
        let key = (source.clone(), label.to_string());
        if watches.contains_key(&key) {
            debug!(resource = %self.name, port = %source, label = %label, "watch already present");
            return Ok(false);
        }

        let watch = Arc::new(Watch::new(source.clone(), label));
        port.attach(Arc::clone(&watch));
        watches.insert(key, watch);

        info!(resource = %self.name, port = %source, label = %label, "created watch");
        Ok(true)
    }

    /// Detach a watch
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such watch exists
    pub fn delete_watch(&self, source: &PortRef, label: &str) -> CoreResult<()> {
        let blocks = self.blocks.read();
        let key = (source.clone(), label.to_string());
        let watch = self
            .watches
            .lock()
            .shift_remove(&key)
            .ok_or_else(|| CoreError::not_found("watch", format!("{} -> {}", source, label)))?;

        let port = blocks
            .get(&source.block)
            .and_then(|w| w.cell().port(&source.port).ok());
        if let Some(port) = port {
            port.detach(&watch);
        }

        info!(resource = %self.name, port = %source, label = %label, "deleted watch");
        Ok(())
    }

    /// Inject a literal into an input port and raise its block's event
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the block or input port is unknown
    pub fn write_connection(&self, literal: &str, destination: &PortRef) -> CoreResult<Value> {
        let worker = {
            let blocks = self.blocks.read();
            Arc::clone(self.lookup(&blocks, &destination.block)?)
        };

        let value = Value::parse_literal(literal);
        worker.deliver_input(&destination.port, value.clone())?;
        debug!(resource = %self.name, destination = %destination, %value, "wrote value");
        Ok(value)
    }

    /// Start every worker that has not been started yet; returns how
    /// many were started.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if called outside a tokio runtime
    pub fn start_work(&self) -> CoreResult<usize> {
        let mut started = 0;
        for worker in self.workers() {
            if worker.start()? {
                started += 1;
            }
        }
        info!(resource = %self.name, started, "started resource");
        Ok(started)
    }

    /// Signal stop to every worker and wait for them to exit, bounded by
    /// the configured stop timeout. Returns `false` if some worker was
    /// still inside a step when the timeout expired.
    pub async fn stop_work(&self) -> bool {
        let workers = self.workers();
        let clean = stop_all(&workers, self.config.stop_timeout).await;
        info!(resource = %self.name, blocks = workers.len(), clean, "stopped resource");
        clean
    }

    /// Stop and drop every block and watch
    pub async fn shutdown(&self) -> bool {
        let workers: Vec<_> = std::mem::take(&mut *self.blocks.write()).into_values().collect();
        self.watches.lock().clear();

        let clean = stop_all(&workers, self.config.stop_timeout).await;
        if !clean {
            warn!(resource = %self.name, "resource shut down with blocks still busy");
        }
        info!(resource = %self.name, blocks = workers.len(), "resource shut down");
        clean
    }

    /// Drain every watch. Returns `None` when no watch has samples.
    #[must_use]
    pub fn read_watches(&self, since: Timestamp) -> Option<ResourceWatches> {
        let watches = self.watches.lock();
        let reports: Vec<_> = watches
            .values()
            .filter_map(|watch| {
                let samples = watch.drain(since);
                (!samples.is_empty()).then(|| WatchReport {
                    port: watch.port().to_string(),
                    label: watch.label().to_string(),
                    samples,
                })
            })
            .collect();

        if reports.is_empty() {
            return None;
        }
        Some(ResourceWatches {
            name: self.name.clone(),
            watches: reports,
        })
    }

    /// Snapshot of every block in creation order
    #[must_use]
    pub fn query_blocks(&self) -> Vec<BlockSnapshot> {
        self.workers().iter().map(|w| w.snapshot()).collect()
    }

    /// Every connection, grouped by source block in creation order
    #[must_use]
    pub fn query_connections(&self) -> Vec<Connection> {
        self.blocks
            .read()
            .values()
            .flat_map(|w| graph::outgoing(w.cell()))
            .collect()
    }

    /// Whether every worker has exited
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.blocks
            .read()
            .values()
            .all(|w| w.state() == WorkerState::Stopped)
    }

    fn workers(&self) -> Vec<Arc<BlockWorker>> {
        self.blocks.read().values().cloned().collect()
    }

    fn lookup<'a>(
        &self,
        blocks: &'a IndexMap<String, Arc<BlockWorker>>,
        name: &str,
    ) -> CoreResult<&'a Arc<BlockWorker>> {
        blocks
            .get(name)
            .ok_or_else(|| CoreError::not_found("block", format!("{}.{}", self.name, name)))
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("blocks", &self.block_count())
            .finish_non_exhaustive()
    }
}

async fn stop_all(workers: &[Arc<BlockWorker>], timeout: Duration) -> bool {
    for worker in workers {
        worker.stop();
    }

    let deadline = Instant::now() + timeout;
    let mut clean = true;
    for worker in workers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        clean &= worker.join(remaining).await;
    }
    clean
}
