//! Manager: registry of configurations and command dispatcher.
//!
//! Every dispatch produces exactly one response carrying the request
//! identifier. Operations of one command are applied in order; the
//! first failure stops the command and the response is an empty
//! acknowledgment. Duplicate creates are silent no-ops.

use crate::bridge::{MonitorBridge, NoopBridge};
use crate::command::{Action, CommandIntent, Operation};
use crate::response::{Response, ResponseBody};
use bytes::Bytes;
use fbrun_core::{CoreError, CoreResult, DeviceClock, PortRef, Timestamp};
use fbrun_runtime::{BlockRegistry, Configuration, ConfigurationInfo, EngineConfig};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Device-level supervisor
pub struct Manager {
    clock: DeviceClock,
    registry: Arc<BlockRegistry>,
    config: EngineConfig,
    bridge: Arc<dyn MonitorBridge>,
    configurations: RwLock<IndexMap<String, Arc<Configuration>>>,
}

impl Manager {
    /// Create a manager; the device clock starts now
    #[must_use]
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        Self {
            clock: DeviceClock::start(),
            registry,
            config: EngineConfig::default(),
            bridge: Arc::new(NoopBridge),
            configurations: RwLock::new(IndexMap::new()),
        }
    }

    /// Engine settings applied to every new configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Install a monitoring bridge
    #[must_use]
    pub fn with_bridge(mut self, bridge: Arc<dyn MonitorBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    /// Block types available to CREATE FB
    #[must_use]
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Look up a configuration
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such configuration exists
    pub fn configuration(&self, name: &str) -> CoreResult<Arc<Configuration>> {
        self.configurations
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("configuration", name))
    }

    /// Summaries of every configuration in creation order
    #[must_use]
    pub fn configurations(&self) -> Vec<ConfigurationInfo> {
        self.snapshot().iter().map(|c| c.info()).collect()
    }

    /// Create a configuration
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyExists`] if the name is taken
    pub fn create_configuration(
        &self,
        name: &str,
        type_name: &str,
    ) -> CoreResult<Arc<Configuration>> {
        if name.trim().is_empty() {
            return Err(CoreError::Validation {
                field: "name".to_string(),
                reason: "configuration name is empty".to_string(),
            });
        }

        let configuration = {
            let mut configurations = self.configurations.write();
            if configurations.contains_key(name) {
                return Err(CoreError::already_exists("configuration", name));
            }
            let configuration = Arc::new(
                Configuration::new(name, type_name, Arc::clone(&self.registry), self.clock)
                    .with_config(self.config.clone()),
            );
            configurations.insert(name.to_string(), Arc::clone(&configuration));
            configuration
        };

        info!(resource = %name, resource_type = %type_name, "created configuration");
        self.bridge.on_configuration_created(&configuration);
        Ok(configuration)
    }

    /// Remove a configuration, stop and join its workers and drop them
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such configuration exists
    pub async fn delete_configuration(&self, name: &str) -> CoreResult<()> {
        let configuration = self
            .configurations
            .write()
            .shift_remove(name)
            .ok_or_else(|| CoreError::not_found("configuration", name))?;

        configuration.shutdown().await;
        drop(configuration);

        info!(resource = %name, "deleted configuration");
        self.bridge.on_configuration_deleted(name);
        Ok(())
    }

    /// Stop and drop every configuration
    pub async fn shutdown(&self) {
        let configurations: Vec<_> = std::mem::take(&mut *self.configurations.write())
            .into_values()
            .collect();
        for configuration in configurations {
            configuration.shutdown().await;
        }
        info!("device shut down");
    }

    /// Execute one command and build its response
    pub async fn dispatch(&self, intent: &CommandIntent) -> Response {
        debug!(
            request = %intent.id,
            action = %intent.action,
            target = ?intent.scope(),
            "dispatching command"
        );

        let outcome = match intent.scope() {
            None => self.dispatch_device(intent).await,
            Some(target) => match self.configuration(target) {
                Ok(configuration) => self.dispatch_configuration(&configuration, intent).await,
                Err(err) => Err(err),
            },
        };

        match outcome {
            Ok(result) => Response::new(&intent.id, result),
            Err(err) => {
                warn!(
                    request = %intent.id,
                    action = %intent.action,
                    error = %err,
                    "command failed"
                );
                Response::empty(&intent.id)
            }
        }
    }

    /// [`dispatch`](Self::dispatch), then frame the response
    pub async fn dispatch_framed(&self, intent: &CommandIntent) -> Bytes {
        self.dispatch(intent).await.into_frame()
    }

    async fn dispatch_device(&self, intent: &CommandIntent) -> CoreResult<Option<ResponseBody>> {
        match intent.action {
            Action::Create => {
                for operation in &intent.operations {
                    let Operation::Fb { name, type_name } = operation else {
                        return Err(unsupported(intent.action, operation));
                    };
                    tolerate_existing(self.create_configuration(name, type_name).map(drop))?;
                }
                Ok(None)
            }
            Action::Query => Ok(Some(ResponseBody::Resources(self.configurations()))),
            Action::Read => {
                let since = intent.since.unwrap_or_else(Timestamp::zero);
                let resources = self
                    .snapshot()
                    .iter()
                    .filter_map(|c| c.read_watches(since))
                    .collect();
                Ok(Some(ResponseBody::Watches(resources)))
            }
            Action::Kill => {
                if intent.operations.is_empty() {
                    for configuration in self.snapshot() {
                        configuration.stop_work().await;
                    }
                    info!("device stopped");
                    return Ok(None);
                }
                for operation in &intent.operations {
                    let Operation::Fb { name, .. } = operation else {
                        return Err(unsupported(intent.action, operation));
                    };
                    self.configuration(name)?.stop_work().await;
                }
                Ok(None)
            }
            Action::Delete => {
                for operation in &intent.operations {
                    let Operation::Fb { name, .. } = operation else {
                        return Err(unsupported(intent.action, operation));
                    };
                    self.delete_configuration(name).await?;
                }
                Ok(None)
            }
            Action::Start => {
                for configuration in self.snapshot() {
                    configuration.start_work()?;
                }
                Ok(None)
            }
            Action::Write => Err(CoreError::Validation {
                field: "target".to_string(),
                reason: "WRITE needs a target configuration".to_string(),
            }),
        }
    }

    async fn dispatch_configuration(
        &self,
        configuration: &Configuration,
        intent: &CommandIntent,
    ) -> CoreResult<Option<ResponseBody>> {
        match intent.action {
            Action::Create => {
                for operation in &intent.operations {
                    self.create(configuration, operation)?;
                }
                Ok(None)
            }
            Action::Delete => {
                for operation in &intent.operations {
                    match operation {
                        Operation::Watch { source, destination } => {
                            let port = PortRef::parse(source)?;
                            configuration.delete_watch(&port, watch_label(source, destination))?;
                        }
                        Operation::Connection { source, destination } => {
                            configuration.delete_connection(
                                &PortRef::parse(source)?,
                                &PortRef::parse(destination)?,
                            )?;
                        }
                        Operation::Fb { name, .. } => configuration.delete_fb(name).await?,
                        Operation::Watches => return Err(unsupported(intent.action, operation)),
                    }
                }
                Ok(None)
            }
            Action::Start => {
                configuration.start_work()?;
                Ok(None)
            }
            Action::Kill => {
                configuration.stop_work().await;
                Ok(None)
            }
            Action::Write => {
                for operation in &intent.operations {
                    let Operation::Connection { source, destination } = operation else {
                        return Err(unsupported(intent.action, operation));
                    };
                    configuration.write_connection(source, &PortRef::parse(destination)?)?;
                }
                Ok(None)
            }
            Action::Query => match intent.operations.first() {
                Some(Operation::Connection { .. }) => {
                    Ok(Some(ResponseBody::Connections(configuration.query_connections())))
                }
                None | Some(Operation::Fb { .. }) => {
                    Ok(Some(ResponseBody::Blocks(configuration.query_blocks())))
                }
                Some(operation) => Err(unsupported(intent.action, operation)),
            },
            Action::Read => {
                let since = intent.since.unwrap_or_else(Timestamp::zero);
                let resources = configuration.read_watches(since).into_iter().collect();
                Ok(Some(ResponseBody::Watches(resources)))
            }
        }
    }

    fn create(&self, configuration: &Configuration, operation: &Operation) -> CoreResult<()> {
        match operation {
            Operation::Fb { name, type_name } => {
                let created = configuration.create_fb(name, type_name);
                if let Ok(worker) = &created {
                    self.bridge.on_block_created(configuration.name(), &worker.snapshot());
                }
                tolerate_existing(created.map(drop))
            }
            Operation::Connection { source, destination } => {
                configuration.create_connection(
                    &PortRef::parse(source)?,
                    &PortRef::parse(destination)?,
                )
            }
            Operation::Watch { source, destination } => {
                let port = PortRef::parse(source)?;
                configuration.create_watch(&port, watch_label(source, destination)).map(drop)
            }
            Operation::Watches => Err(unsupported(Action::Create, operation)),
        }
    }

    fn snapshot(&self) -> Vec<Arc<Configuration>> {
        self.configurations.read().values().cloned().collect()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("configurations", &self.configurations.read().keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn watch_label<'a>(source: &'a str, destination: &'a str) -> &'a str {
    if destination.trim().is_empty() {
        source
    } else {
        destination
    }
}

fn tolerate_existing(result: CoreResult<()>) -> CoreResult<()> {
    match result {
        Err(err) if err.is_already_exists() => {
            debug!(error = %err, "ignoring duplicate create");
            Ok(())
        }
        other => other,
    }
}

fn unsupported(action: Action, operation: &Operation) -> CoreError {
    CoreError::Validation {
        field: "operation".to_string(),
        reason: format!("{} does not accept {}", action, operation.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{connection, fb, watch};
    use crate::frame::{decode_header, FRAME_TAG, HEADER_LEN};
    use fbrun_core::Value;
    use fbrun_runtime::{BlockSnapshot, WorkerState};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn manager() -> Manager {
        Manager::new(Arc::new(BlockRegistry::with_builtins()))
            .with_config(EngineConfig::default().with_stop_timeout(Duration::from_secs(2)))
    }

    fn device(id: &str, action: Action) -> CommandIntent {
        CommandIntent::new(id, action)
    }

    fn scoped(id: &str, action: Action) -> CommandIntent {
        CommandIntent::new(id, action).with_target("RES0")
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..400 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    async fn with_resource(m: &Manager) {
        let response = m
            .dispatch(&device("0", Action::Create).with_operation(fb("RES0", "EMB_RES")))
            .await;
        assert!(response.is_empty());
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl MonitorBridge for Recorder {
        fn on_configuration_created(&self, configuration: &Configuration) {
            self.events.lock().push(format!("config:{}", configuration.name()));
        }

        fn on_block_created(&self, configuration: &str, block: &BlockSnapshot) {
            self.events
                .lock()
                .push(format!("block:{}.{}:{}", configuration, block.name, block.inputs.len()));
        }

        fn on_configuration_deleted(&self, configuration: &str) {
            self.events.lock().push(format!("deleted:{}", configuration));
        }
    }

    #[tokio::test]
    async fn test_create_configuration_idempotent() {
        let m = manager();
        with_resource(&m).await;
        with_resource(&m).await;

        let configurations = m.configurations();
        assert_eq!(configurations.len(), 1);
        assert_eq!(configurations[0].type_name, "EMB_RES");
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_block_idempotent() {
        let m = manager();
        with_resource(&m).await;

        let create = scoped("1", Action::Create).with_operation(fb("A", "MOVE"));
        assert_eq!(m.dispatch(&create).await, Response::empty("1"));
        assert_eq!(m.dispatch(&create).await, Response::empty("1"));
        assert_eq!(m.configuration("RES0").unwrap().block_count(), 1);
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_target_yields_empty_ack() {
        let m = manager();
        let response = m
            .dispatch(&scoped("3", Action::Create).with_operation(fb("A", "MOVE")))
            .await;
        assert_eq!(response, Response::empty("3"));
    }

    #[tokio::test]
    async fn test_end_to_end_write_propagates_and_watches() {
        let m = manager();
        with_resource(&m).await;

        let create = scoped("1", Action::Create)
            .with_operation(fb("A", "MOVE"))
            .with_operation(fb("B", "MOVE"))
            .with_operation(connection("A.OUT", "B.IN"))
            .with_operation(watch("B.OUT", "b_out"));
        assert!(m.dispatch(&create).await.is_empty());
        assert!(m.dispatch(&scoped("2", Action::Start)).await.is_empty());

        let write = scoped("3", Action::Write).with_operation(connection("INT#17", "A.IN"));
        assert!(m.dispatch(&write).await.is_empty());

        let b = m.configuration("RES0").unwrap().block("B").unwrap();
        assert!(wait_until(|| b.output_value("OUT") == Some(Value::Int(17))).await);

        let read = device("4", Action::Read).with_operation(Operation::Watches);
        let Some(ResponseBody::Watches(resources)) = m.dispatch(&read).await.result else {
            panic!("expected watches");
        };
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name, "RES0");
        let report = resources[0].get("b_out").unwrap();
        assert_eq!(report.samples.last().map(|s| s.value.clone()), Some(Value::Int(17)));

        let Some(ResponseBody::Watches(again)) = m.dispatch(&read).await.result else {
            panic!("expected watches");
        };
        assert!(again.is_empty());
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_read_with_no_resources_is_explicit_empty() {
        let m = manager();
        let response = m
            .dispatch(&device("1", Action::Read).with_operation(Operation::Watches))
            .await;
        assert_eq!(response.result, Some(ResponseBody::Watches(Vec::new())));
    }

    #[tokio::test]
    async fn test_watch_label_defaults_to_source() {
        let m = manager();
        with_resource(&m).await;
        m.dispatch(
            &scoped("1", Action::Create)
                .with_operation(fb("A", "MOVE"))
                .with_operation(watch("A.IN", "")),
        )
        .await;
        m.dispatch(&scoped("2", Action::Write).with_operation(connection("1", "A.IN")))
            .await;

        let res = m.configuration("RES0").unwrap();
        let report = res.read_watches(Timestamp::zero()).unwrap();
        assert!(report.get("A.IN").is_some());

        m.dispatch(&scoped("3", Action::Delete).with_operation(watch("A.IN", "")))
            .await;
        assert_eq!(res.watch_count(), 0);
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_device_delete_releases_everything() {
        let m = manager();
        with_resource(&m).await;
        m.dispatch(
            &scoped("1", Action::Create)
                .with_operation(fb("A", "MOVE"))
                .with_operation(watch("A.IN", "a")),
        )
        .await;
        m.dispatch(&scoped("2", Action::Write).with_operation(connection("5", "A.IN")))
            .await;
        let a = m.configuration("RES0").unwrap().block("A").unwrap();

        let response = m
            .dispatch(&device("3", Action::Delete).with_operation(fb("RES0", "")))
            .await;
        assert!(response.is_empty());

        assert_eq!(a.state(), WorkerState::Stopped);
        assert_eq!(Arc::strong_count(&a), 1);
        assert!(m.configuration("RES0").is_err());

        let read = m.dispatch(&device("4", Action::Read).with_operation(Operation::Watches)).await;
        assert_eq!(read.result, Some(ResponseBody::Watches(Vec::new())));

        let scoped_write = m
            .dispatch(&scoped("5", Action::Write).with_operation(connection("1", "A.IN")))
            .await;
        assert_eq!(scoped_write, Response::empty("5"));
    }

    #[tokio::test]
    async fn test_kill_configuration_and_device() {
        let m = manager();
        with_resource(&m).await;
        m.dispatch(&device("1", Action::Create).with_operation(fb("RES1", "EMB_RES")))
            .await;
        for res in ["RES0", "RES1"] {
            m.dispatch(
                &CommandIntent::new("2", Action::Create)
                    .with_target(res)
                    .with_operation(fb("A", "MOVE")),
            )
            .await;
        }

        m.dispatch(&device("3", Action::Kill).with_operation(fb("RES0", ""))).await;
        assert!(m.configuration("RES0").unwrap().is_stopped());
        assert!(!m.configuration("RES1").unwrap().is_stopped());

        m.dispatch(&device("4", Action::Kill)).await;
        assert!(m.configuration("RES1").unwrap().is_stopped());
        assert_eq!(m.configurations().len(), 2);
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_query_blocks_connections_and_resources() {
        let m = manager();
        with_resource(&m).await;
        m.dispatch(
            &scoped("1", Action::Create)
                .with_operation(fb("A", "MOVE"))
                .with_operation(fb("B", "ADD"))
                .with_operation(connection("A.OUT", "B.IN1")),
        )
        .await;

        let response = m.dispatch(&scoped("2", Action::Query)).await;
        let Some(ResponseBody::Blocks(blocks)) = response.result else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].type_name, "ADD");

        let query = scoped("3", Action::Query).with_operation(connection("", ""));
        let Some(ResponseBody::Connections(connections)) = m.dispatch(&query).await.result else {
            panic!("expected connections");
        };
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].destination, PortRef::new("B", "IN1"));

        let response = m.dispatch(&device("4", Action::Query)).await;
        let Some(ResponseBody::Resources(resources)) = response.result else {
            panic!("expected resources");
        };
        assert_eq!(resources[0].blocks, 2);
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_first_failing_operation_stops_command() {
        let m = manager();
        with_resource(&m).await;
        let create = scoped("1", Action::Create)
            .with_operation(fb("A", "MOVE"))
            .with_operation(fb("X", "NO_SUCH_TYPE"))
            .with_operation(fb("B", "MOVE"));

        assert_eq!(m.dispatch(&create).await, Response::empty("1"));
        let res = m.configuration("RES0").unwrap();
        assert!(res.block("A").is_some());
        assert!(res.block("B").is_none());
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_existing_block_with_other_type_is_no_op() {
        let m = manager();
        with_resource(&m).await;
        m.dispatch(&scoped("1", Action::Create).with_operation(fb("M", "MOVE")))
            .await;
        m.dispatch(&scoped("2", Action::Create).with_operation(fb("N", "MOVE")))
            .await;

        let create = scoped("3", Action::Create)
            .with_operation(fb("M", "NO_SUCH_TYPE"))
            .with_operation(connection("M.OUT", "N.IN"));
        assert_eq!(m.dispatch(&create).await, Response::empty("3"));

        let res = m.configuration("RES0").unwrap();
        assert_eq!(res.block("M").unwrap().type_name(), "MOVE");
        assert_eq!(res.query_connections().len(), 1);
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_block_and_connection() {
        let m = manager();
        with_resource(&m).await;
        m.dispatch(
            &scoped("1", Action::Create)
                .with_operation(fb("A", "MOVE"))
                .with_operation(fb("B", "MOVE"))
                .with_operation(connection("A.OUT", "B.IN")),
        )
        .await;
        let res = m.configuration("RES0").unwrap();

        m.dispatch(&scoped("2", Action::Delete).with_operation(connection("A.OUT", "B.IN")))
            .await;
        assert!(res.query_connections().is_empty());

        m.dispatch(&scoped("3", Action::Delete).with_operation(fb("B", ""))).await;
        assert!(res.block("B").is_none());
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_bridge_hooks() {
        let recorder = Arc::new(Recorder::default());
        let m = manager().with_bridge(Arc::clone(&recorder) as Arc<dyn MonitorBridge>);
        with_resource(&m).await;
        m.dispatch(&scoped("1", Action::Create).with_operation(fb("A", "MOVE")))
            .await;
        m.dispatch(&device("2", Action::Delete).with_operation(fb("RES0", ""))).await;

        assert_eq!(
            *recorder.events.lock(),
            vec![
                "config:RES0".to_string(),
                "block:RES0.A:2".to_string(),
                "deleted:RES0".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatch_framed() {
        let m = manager();
        let frame = m.dispatch_framed(&device("77", Action::Query)).await;
        assert_eq!(frame[0], FRAME_TAG);
        let len = decode_header(&frame).unwrap().unwrap();
        assert_eq!(frame.len(), HEADER_LEN + len);

        let response: Response = serde_json::from_slice(&frame[HEADER_LEN..]).unwrap();
        assert_eq!(response.id, "77");
        assert_eq!(response.result, Some(ResponseBody::Resources(Vec::new())));
    }

    #[tokio::test]
    async fn test_write_without_target_fails() {
        let m = manager();
        let response = m
            .dispatch(&device("1", Action::Write).with_operation(connection("1", "A.IN")))
            .await;
        assert_eq!(response, Response::empty("1"));
    }
}
