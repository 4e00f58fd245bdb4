use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::fault::{Fault, HandlerMatch};
use crate::path::{NodeInstanceId, NodePath};

/// Something observable that happened to a process instance.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    ProcessStarted {
        instance_id: Uuid,
        process_id: String,
    },
    ProcessCompleted {
        instance_id: Uuid,
    },
    ProcessAborted {
        instance_id: Uuid,
        reason: String,
    },
    NodeTriggered {
        instance_id: Uuid,
        node: NodePath,
        node_instance_id: NodeInstanceId,
    },
    NodeLeft {
        instance_id: Uuid,
        node: NodePath,
        node_instance_id: NodeInstanceId,
    },
    NodeCancelled {
        instance_id: Uuid,
        node: NodePath,
        node_instance_id: NodeInstanceId,
    },
    VariableChanged {
        instance_id: Uuid,
        name: String,
        value: JsonValue,
    },
    EventReceived {
        instance_id: Uuid,
        node: NodePath,
        payload: JsonValue,
    },
    FaultHandled {
        instance_id: Uuid,
        fault: Fault,
        handler: HandlerMatch,
    },
    FaultUnhandled {
        instance_id: Uuid,
        fault: Fault,
    },
}

impl AuditEvent {
    pub fn instance_id(&self) -> Uuid {
        match self {
            AuditEvent::ProcessStarted { instance_id, .. }
            | AuditEvent::ProcessCompleted { instance_id }
            | AuditEvent::ProcessAborted { instance_id, .. }
            | AuditEvent::NodeTriggered { instance_id, .. }
            | AuditEvent::NodeLeft { instance_id, .. }
            | AuditEvent::NodeCancelled { instance_id, .. }
            | AuditEvent::VariableChanged { instance_id, .. }
            | AuditEvent::EventReceived { instance_id, .. }
            | AuditEvent::FaultHandled { instance_id, .. }
            | AuditEvent::FaultUnhandled { instance_id, .. } => *instance_id,
        }
    }

    /// Dotted event type and JSON payload, for sinks that store or print
    /// events.
    pub fn to_record(&self) -> (&'static str, JsonValue) {
        match self {
            AuditEvent::ProcessStarted { process_id, .. } => {
                ("process.started", json!({ "process_id": process_id }))
            }
            AuditEvent::ProcessCompleted { .. } => ("process.completed", json!({})),
            AuditEvent::ProcessAborted { reason, .. } => {
                ("process.aborted", json!({ "reason": reason }))
            }
            AuditEvent::NodeTriggered {
                node,
                node_instance_id,
                ..
            } => (
                "node.triggered",
                json!({ "node": node.to_string(), "node_instance_id": node_instance_id }),
            ),
            AuditEvent::NodeLeft {
                node,
                node_instance_id,
                ..
            } => (
                "node.left",
                json!({ "node": node.to_string(), "node_instance_id": node_instance_id }),
            ),
            AuditEvent::NodeCancelled {
                node,
                node_instance_id,
                ..
            } => (
                "node.cancelled",
                json!({ "node": node.to_string(), "node_instance_id": node_instance_id }),
            ),
            AuditEvent::VariableChanged { name, value, .. } => {
                ("variable.changed", json!({ "name": name, "value": value }))
            }
            AuditEvent::EventReceived { node, payload, .. } => (
                "event.received",
                json!({ "node": node.to_string(), "payload": payload }),
            ),
            AuditEvent::FaultHandled { fault, handler, .. } => (
                "fault.handled",
                json!({
                    "fault": fault.cause.to_string(),
                    "node": fault.node_path.to_string(),
                    "handler": handler.handler.to_string(),
                    "policy": handler.policy,
                }),
            ),
            AuditEvent::FaultUnhandled { fault, .. } => (
                "fault.unhandled",
                json!({ "fault": fault.cause.to_string(), "node": fault.node_path.to_string() }),
            ),
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: AuditEvent);
}

pub struct CompositeEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl Default for CompositeEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn emit(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone()).await;
        }
    }
}

/// Logs every event at info level.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: AuditEvent) {
        let (kind, payload) = event.to_record();
        info!(
            event = kind,
            instance_id = %event.instance_id(),
            payload = %payload,
            "process event"
        );
    }
}

pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: AuditEvent) {}
}

/// Keeps events in memory; meant for tests and embedding.
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    pub async fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.to_record().0).collect()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn emit(&self, event: AuditEvent) {
        self.events.lock().await.push(event);
    }
}
