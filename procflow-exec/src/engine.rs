use std::collections::HashMap;
use std::sync::Arc;

use procflow_core::types::{NodeId, ProcessDefinition};
use procflow_store::{InstanceStatus, NewInstance, StateStore, Variables};
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::compile::{CompiledProcess, Compiler};
use crate::config::EngineConfig;
use crate::dynamic::TriggerOutcome;
use crate::error::{EngineError, RuntimeError};
use crate::events::{EventSink, TracingEventSink};
use crate::fault::{Fault, HandlerMatch, PolicyChain};
use crate::path::{NodeInstanceId, NodePath};
use crate::registry::NodeBuilderRegistry;
use crate::runtime::{ProcessInstance, RuntimeServices, TaskAuthorizer};
use crate::transform::TransformerRegistry;

/// Deploys definitions and drives their instances.
///
/// Each instance sits behind its own lock, so operations on one instance are
/// serialized while different instances proceed independently. After every
/// operation the instance's audit events are handed to the sink and its
/// variables and status are written to the store. Completed and aborted
/// instances are dropped from memory once their final status is stored;
/// from then on they are answered from the store.
pub struct Engine {
    compiler: Compiler,
    services: RuntimeServices,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
    processes: RwLock<HashMap<String, Arc<CompiledProcess>>>,
    instances: RwLock<HashMap<Uuid, Arc<Mutex<ProcessInstance>>>>,
}

impl Engine {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            compiler: Compiler::default(),
            services: RuntimeServices::default(),
            store,
            sink: Arc::new(TracingEventSink),
            config: EngineConfig::default(),
            processes: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.compiler = self.compiler.with_options(config.compiler_options());
        self.services.max_region_instances = config.max_region_instances;
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<NodeBuilderRegistry>) -> Self {
        self.compiler = Compiler::new(registry).with_options(self.config.compiler_options());
        self
    }

    pub fn with_policies(mut self, policies: Arc<PolicyChain>) -> Self {
        self.services.policies = policies;
        self
    }

    pub fn with_transformers(mut self, transformers: Arc<TransformerRegistry>) -> Self {
        self.services.transformers = transformers;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn TaskAuthorizer>) -> Self {
        self.services.authorizer = authorizer;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates and compiles `def`, replacing any process with the same id.
    pub async fn deploy(&self, def: &ProcessDefinition) -> Result<Arc<CompiledProcess>, EngineError> {
        let compiled = Arc::new(self.compiler.compile_process(def)?);
        self.processes
            .write()
            .await
            .insert(compiled.id.clone(), Arc::clone(&compiled));
        info!(process_id = %compiled.id, "process deployed");
        Ok(compiled)
    }

    pub async fn process(&self, process_id: &str) -> Option<Arc<CompiledProcess>> {
        self.processes.read().await.get(process_id).cloned()
    }

    pub async fn start_instance(
        &self,
        process_id: &str,
        variables: Variables,
    ) -> Result<Uuid, EngineError> {
        let process = self
            .process(process_id)
            .await
            .ok_or_else(|| EngineError::UnknownProcess(process_id.to_string()))?;

        let id = Uuid::new_v4();
        let mut instance = ProcessInstance::new(id, process, self.services.clone(), variables)?;
        self.store
            .create_instance(NewInstance {
                id,
                process_id: process_id.to_string(),
                variables: instance.variables(),
            })
            .await?;
        let events = instance.drain_events();
        self.instances
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(instance)));
        for e in events {
            self.sink.emit(e).await;
        }
        Ok(id)
    }

    async fn handle(&self, id: Uuid) -> Option<Arc<Mutex<ProcessInstance>>> {
        self.instances.read().await.get(&id).cloned()
    }

    async fn with_instance<R>(
        &self,
        id: Uuid,
        op: impl FnOnce(&mut ProcessInstance) -> Result<R, RuntimeError>,
    ) -> Result<R, EngineError> {
        let Some(handle) = self.handle(id).await else {
            return Err(self.missing(id).await);
        };

        let mut instance = handle.lock().await;
        let before = instance.status();
        let result = op(&mut *instance);
        for e in instance.drain_events() {
            self.sink.emit(e).await;
        }

        let status = instance.status();
        if self.config.persist_variables {
            self.store.save_variables(id, instance.variables()).await?;
        }
        // A finished instance still in memory had its status write fail.
        if status != before || status != InstanceStatus::Active {
            self.store.set_status(id, status).await?;
        }
        drop(instance);
        if status != InstanceStatus::Active {
            self.instances.write().await.remove(&id);
            debug!(instance_id = %id, status = status.as_str(), "process instance released");
        }
        Ok(result?)
    }

    /// Error for an instance that is not in memory: finished instances are
    /// still known to the store.
    async fn missing(&self, id: Uuid) -> EngineError {
        match self.store.instance_exists(id).await {
            Ok(true) => RuntimeError::InstanceNotActive(id).into(),
            Ok(false) => EngineError::UnknownInstance(id),
            Err(e) => e.into(),
        }
    }

    pub async fn status(&self, id: Uuid) -> Result<InstanceStatus, EngineError> {
        if let Some(handle) = self.handle(id).await {
            return Ok(handle.lock().await.status());
        }
        self.store
            .get_instance(id)
            .await?
            .map(|record| record.status)
            .ok_or(EngineError::UnknownInstance(id))
    }

    /// Process-level variables, read from the store once the instance has
    /// finished.
    pub async fn variables(&self, id: Uuid) -> Result<Variables, EngineError> {
        if let Some(handle) = self.handle(id).await {
            return Ok(handle.lock().await.variables());
        }
        if !self.store.instance_exists(id).await? {
            return Err(EngineError::UnknownInstance(id));
        }
        Ok(self.store.load_variables(id).await?)
    }

    pub async fn set_variable(&self, id: Uuid, name: &str, value: JsonValue) -> Result<(), EngineError> {
        self.with_instance(id, |i| i.set_variable(name, value)).await
    }

    pub async fn enter_dynamic(&self, id: Uuid, region: &NodePath) -> Result<NodeInstanceId, EngineError> {
        self.with_instance(id, |i| i.enter_dynamic(region)).await
    }

    pub async fn trigger(
        &self,
        id: Uuid,
        region: &NodePath,
        child: NodeId,
    ) -> Result<TriggerOutcome, EngineError> {
        self.with_instance(id, |i| i.trigger(region, child)).await
    }

    pub async fn complete_child(
        &self,
        id: Uuid,
        region: &NodePath,
        instance: NodeInstanceId,
    ) -> Result<(), EngineError> {
        self.with_instance(id, |i| i.complete_child(region, instance)).await
    }

    pub async fn cancel_child(
        &self,
        id: Uuid,
        region: &NodePath,
        instance: NodeInstanceId,
    ) -> Result<(), EngineError> {
        self.with_instance(id, |i| i.cancel_child(region, instance)).await
    }

    pub async fn cancel_region(&self, id: Uuid, region: &NodePath) -> Result<(), EngineError> {
        self.with_instance(id, |i| i.cancel_region(region)).await
    }

    pub async fn signal_event(
        &self,
        id: Uuid,
        node: &NodePath,
        payload: JsonValue,
    ) -> Result<JsonValue, EngineError> {
        self.with_instance(id, |i| i.signal_event(node, payload)).await
    }

    pub async fn complete_task(
        &self,
        id: Uuid,
        node: &NodePath,
        user: &str,
        results: Variables,
    ) -> Result<(), EngineError> {
        self.with_instance(id, |i| i.complete_task(node, user, &results)).await
    }

    /// Raises `fault` in the instance. An unhandled fault aborts it and is
    /// returned as an error.
    pub async fn raise(&self, id: Uuid, fault: Fault) -> Result<HandlerMatch, EngineError> {
        self.with_instance(id, |i| {
            i.raise(fault).map_err(|unhandled| RuntimeError::Faulted {
                fault: Box::new(unhandled.fault),
                handled_by: None,
            })
        })
        .await
    }

    pub async fn complete(&self, id: Uuid) -> Result<(), EngineError> {
        self.with_instance(id, |i| i.complete()).await
    }

    pub async fn abort(&self, id: Uuid, reason: &str) -> Result<(), EngineError> {
        self.with_instance(id, |i| {
            i.abort(reason);
            Ok(())
        })
        .await
    }
}
