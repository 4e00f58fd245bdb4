use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use procflow_core::{parse_definition_str, DefinitionFormat, ProcessDefinition};
use procflow_exec::dynamic::BlockReason;
use procflow_exec::{
    Engine, EngineConfig, EngineError, Fault, FaultCause, MemoryEventSink, NodePath, RuntimeError,
    TriggerOutcome,
};
use procflow_store::{
    InMemoryStore, InstanceRecord, InstanceStatus, NewInstance, StateStore, StoreError, Variables,
};
use serde_json::json;
use uuid::Uuid;

const TALLY: &str = r#"
id: engine.tally
variables:
  - name: count
    type: integer
    default: 0
nodes:
  - id: 1
    type: dynamic
    activationCondition: count < 3
    completionCondition: count >= 3
    nodes:
      - id: 1
        type: ruleTask
        ruleFlowGroup: scoring
        metadata:
          autoStart: true
      - id: 2
        type: ruleTask
        ruleFlowGroup: scoring
  - id: 2
    type: event
    eventType: tally
    variableName: count
    transformation:
      expression: msg.amount
"#;

const CONFIG: &str = r#"
eventBinding: msg
maxRegionInstances: 1
"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn definition() -> ProcessDefinition {
    parse_definition_str(TALLY, DefinitionFormat::Auto)
        .unwrap()
        .definition
}

fn engine(store: Arc<InMemoryStore>, sink: Arc<MemoryEventSink>) -> Engine {
    Engine::new(store)
        .with_config(EngineConfig::from_str_auto(CONFIG).unwrap())
        .with_event_sink(sink)
}

#[tokio::test]
async fn instance_state_reaches_store_and_sink() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let sink = Arc::new(MemoryEventSink::new());
    let engine = engine(Arc::clone(&store), Arc::clone(&sink));

    engine.deploy(&definition()).await.unwrap();
    let id = engine
        .start_instance("engine.tally", Variables::new())
        .await
        .unwrap();
    let record = store.get_instance(id).await.unwrap().unwrap();
    assert_eq!(record.status, InstanceStatus::Active);
    assert_eq!(record.variables.get("count"), Some(&json!(0)));

    let region = NodePath::new([1]);
    engine.enter_dynamic(id, &region).await.unwrap();
    assert_eq!(
        engine.trigger(id, &region, 2).await.unwrap(),
        TriggerOutcome::Blocked(BlockReason::Capacity)
    );

    let stored = engine
        .signal_event(id, &NodePath::new([2]), json!({ "amount": 5 }))
        .await
        .unwrap();
    assert_eq!(stored, json!(5));
    assert_eq!(store.load_variables(id).await.unwrap().get("count"), Some(&json!(5)));
    assert!(matches!(
        engine.trigger(id, &region, 1).await,
        Err(EngineError::Runtime(RuntimeError::RegionNotActive(_)))
    ));

    engine.complete(id).await.unwrap();
    assert_eq!(engine.status(id).await.unwrap(), InstanceStatus::Completed);
    assert_eq!(
        store.get_instance(id).await.unwrap().unwrap().status,
        InstanceStatus::Completed
    );

    let kinds = sink.kinds().await;
    assert_eq!(kinds.first(), Some(&"process.started"));
    assert_eq!(kinds.last(), Some(&"process.completed"));
    assert!(kinds.contains(&"event.received"));
    assert!(kinds.iter().all(|k| *k != "fault.unhandled"));
}

#[tokio::test]
async fn unhandled_fault_aborts_the_stored_instance() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let sink = Arc::new(MemoryEventSink::new());
    let engine = engine(Arc::clone(&store), Arc::clone(&sink));
    engine.deploy(&definition()).await.unwrap();
    let id = engine
        .start_instance("engine.tally", Variables::new())
        .await
        .unwrap();

    let fault = Fault::new(NodePath::new([1, 1]), FaultCause::new("ScoringFailed"));
    let err = engine.raise(id, fault).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Runtime(RuntimeError::Faulted { handled_by: None, .. })
    ));
    assert_eq!(
        store.get_instance(id).await.unwrap().unwrap().status,
        InstanceStatus::Aborted
    );
    assert!(sink.kinds().await.contains(&"process.aborted"));

    assert!(matches!(
        engine.set_variable(id, "count", json!(1)).await,
        Err(EngineError::Runtime(RuntimeError::InstanceNotActive(_)))
    ));
}

#[tokio::test]
async fn unknown_processes_and_instances_are_reported() {
    let engine = Engine::new(Arc::new(InMemoryStore::new()));
    assert!(matches!(
        engine.start_instance("missing", Variables::new()).await,
        Err(EngineError::UnknownProcess(_))
    ));
    assert!(matches!(
        engine.status(Uuid::new_v4()).await,
        Err(EngineError::UnknownInstance(_))
    ));
}

#[tokio::test]
async fn region_state_survives_between_operations() {
    let engine = Engine::new(Arc::new(InMemoryStore::new()));
    engine.deploy(&definition()).await.unwrap();
    let id = engine
        .start_instance("engine.tally", Variables::new())
        .await
        .unwrap();

    let region = NodePath::new([1]);
    let first = engine.enter_dynamic(id, &region).await.unwrap();
    assert_eq!(engine.enter_dynamic(id, &region).await.unwrap(), first);

    engine.cancel_region(id, &region).await.unwrap();
    assert!(matches!(
        engine.cancel_region(id, &region).await,
        Err(EngineError::Runtime(RuntimeError::RegionNotActive(_)))
    ));
}

/// In-memory store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn fail_writes(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn create_instance(&self, instance: NewInstance) -> Result<InstanceRecord, StoreError> {
        self.inner.create_instance(instance).await
    }

    async fn instance_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.instance_exists(id).await
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<InstanceRecord>, StoreError> {
        self.inner.get_instance(id).await
    }

    async fn load_variables(&self, id: Uuid) -> Result<Variables, StoreError> {
        self.inner.load_variables(id).await
    }

    async fn save_variables(&self, id: Uuid, variables: Variables) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save_variables(id, variables).await
    }

    async fn set_status(&self, id: Uuid, status: InstanceStatus) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set_status(id, status).await
    }

    async fn remove_instance(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.remove_instance(id).await
    }
}

#[tokio::test]
async fn events_reach_the_sink_when_the_store_fails() {
    init_tracing();
    let store = Arc::new(FlakyStore::default());
    let sink = Arc::new(MemoryEventSink::new());
    let engine = Engine::new(store.clone())
        .with_config(EngineConfig::from_str_auto(CONFIG).unwrap())
        .with_event_sink(sink.clone());
    engine.deploy(&definition()).await.unwrap();
    let id = engine
        .start_instance("engine.tally", Variables::new())
        .await
        .unwrap();

    store.fail_writes(true);
    let err = engine
        .signal_event(id, &NodePath::new([2]), json!({ "amount": 1 }))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Backend(_))));
    let kinds = sink.kinds().await;
    assert!(kinds.contains(&"event.received"));
    assert!(kinds.contains(&"variable.changed"));

    store.fail_writes(false);
    assert_eq!(engine.variables(id).await.unwrap().get("count"), Some(&json!(1)));
    assert_eq!(store.load_variables(id).await.unwrap().get("count"), Some(&json!(0)));
}

#[tokio::test]
async fn finished_instances_are_released_once_their_status_is_stored() {
    init_tracing();
    let store = Arc::new(FlakyStore::default());
    let engine = Engine::new(store.clone());
    engine.deploy(&definition()).await.unwrap();
    let id = engine
        .start_instance("engine.tally", Variables::new())
        .await
        .unwrap();
    engine.set_variable(id, "count", json!(2)).await.unwrap();

    store.fail_writes(true);
    assert!(matches!(
        engine.complete(id).await,
        Err(EngineError::Store(_))
    ));
    assert_eq!(engine.status(id).await.unwrap(), InstanceStatus::Completed);
    assert_eq!(
        store.get_instance(id).await.unwrap().unwrap().status,
        InstanceStatus::Active
    );

    store.fail_writes(false);
    engine.abort(id, "retry").await.unwrap();
    assert_eq!(
        store.get_instance(id).await.unwrap().unwrap().status,
        InstanceStatus::Completed
    );
    assert_eq!(engine.status(id).await.unwrap(), InstanceStatus::Completed);
    assert_eq!(engine.variables(id).await.unwrap().get("count"), Some(&json!(2)));
    assert!(matches!(
        engine.complete(id).await,
        Err(EngineError::Runtime(RuntimeError::InstanceNotActive(_)))
    ));
}
