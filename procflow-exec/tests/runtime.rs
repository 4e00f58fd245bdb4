use std::sync::Arc;

use procflow_core::{parse_definition_str, DefinitionFormat};
use procflow_exec::dynamic::ActiveChild;
use procflow_exec::runtime::PotentialOwners;
use procflow_exec::{
    AuditEvent, CompiledProcess, Compiler, NodePath, ProcessInstance, RegionState, RuntimeError,
    RuntimeServices, TriggerOutcome,
};
use procflow_store::{InstanceStatus, Variables};
use serde_json::json;
use uuid::Uuid;

const AD_HOC: &str = r#"
id: adhoc.review
variables:
  - name: count
    type: integer
    default: 0
  - name: payment
exceptionHandlers:
  - faultName: AuthorizationDenied
    handler: 7
nodes:
  - id: 4
    type: dynamic
    activationCondition: count < 3
    completionCondition: count >= 3
    nodes:
      - id: 1
        type: ruleTask
        ruleFlowGroup: pricing
        metadata:
          autoStart: true
      - id: 2
        type: humanTask
        taskName: review
        actors: [mary]
        groups: [finance]
        outMappings:
          amount: count
  - id: 5
    type: event
    eventType: payment
    variableName: payment
    transformation:
      expression: event.body.total
  - id: 6
    type: dynamic
    variables:
      - name: limit
    completionCondition: count > limit
    exceptionHandlers:
      - faultName: ConditionEvaluation
        handler: 3
    nodes:
      - id: 3
        type: end
  - id: 7
    type: end
  - id: 8
    type: event
    eventType: ping
"#;

fn process() -> Arc<CompiledProcess> {
    let def = parse_definition_str(AD_HOC, DefinitionFormat::Auto)
        .unwrap()
        .definition;
    Arc::new(Compiler::default().compile_process(&def).unwrap())
}

fn instance(services: RuntimeServices) -> ProcessInstance {
    ProcessInstance::new(Uuid::new_v4(), process(), services, Variables::new()).unwrap()
}

fn kinds(events: &[AuditEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.to_record().0).collect()
}

#[test]
fn dynamic_region_follows_its_conditions() {
    let region = NodePath::new([4]);
    let mut pi = instance(RuntimeServices::default());

    let region_instance = pi.enter_dynamic(&region).unwrap();
    assert_eq!(region_instance, 1);
    assert_eq!(
        pi.active_children(&region),
        vec![ActiveChild { instance: 2, child: 1 }]
    );
    assert_eq!(pi.enter_dynamic(&region).unwrap(), region_instance);

    assert_eq!(pi.trigger(&region, 2).unwrap(), TriggerOutcome::Started(3));

    // Activation still holds, so the auto-start batch runs again.
    pi.set_variable("count", json!(1)).unwrap();
    assert_eq!(pi.active_children(&region).len(), 3);
    pi.drain_events();

    pi.set_variable("count", json!(3)).unwrap();
    assert_eq!(pi.region_state(&region), Some(RegionState::Completed));
    assert!(pi.active_children(&region).is_empty());
    assert_eq!(
        kinds(&pi.drain_events()),
        vec![
            "variable.changed",
            "node.cancelled",
            "node.cancelled",
            "node.cancelled",
            "node.left"
        ]
    );

    let err = pi.trigger(&region, 1).unwrap_err();
    assert_eq!(err, RuntimeError::RegionNotActive(region));
}

#[test]
fn unknown_children_are_rejected() {
    let region = NodePath::new([4]);
    let mut pi = instance(RuntimeServices::default());
    pi.enter_dynamic(&region).unwrap();

    assert!(matches!(
        pi.trigger(&region, 9),
        Err(RuntimeError::UnknownChild { child: 9, .. })
    ));
    assert!(matches!(
        pi.complete_child(&region, 42),
        Err(RuntimeError::UnknownChildInstance { instance: 42, .. })
    ));
    assert!(matches!(
        pi.enter_dynamic(&NodePath::new([7])),
        Err(RuntimeError::WrongNodeType { .. })
    ));
}

#[test]
fn cancelled_children_ignore_late_completion() {
    let region = NodePath::new([4]);
    let mut pi = instance(RuntimeServices::default());
    pi.enter_dynamic(&region).unwrap();

    pi.cancel_child(&region, 2).unwrap();
    assert!(pi.active_children(&region).is_empty());
    pi.complete_child(&region, 2).unwrap();
    assert_eq!(pi.region_state(&region), Some(RegionState::Active));

    pi.cancel_region(&region).unwrap();
    assert_eq!(pi.region_state(&region), Some(RegionState::Cancelled));
    assert!(matches!(
        pi.trigger(&region, 1),
        Err(RuntimeError::RegionNotActive(_))
    ));
}

#[test]
fn events_are_transformed_before_they_are_stored() {
    let mut pi = instance(RuntimeServices::default());

    let value = pi
        .signal_event(&NodePath::new([5]), json!({ "body": { "total": 10 } }))
        .unwrap();
    assert_eq!(value, json!(10));
    assert_eq!(pi.variable("payment"), Some(&json!(10)));

    // No transformation: the payload passes through untouched, null included.
    let ping = NodePath::new([8]);
    assert_eq!(pi.signal_event(&ping, json!({ "a": 1 })).unwrap(), json!({ "a": 1 }));
    assert_eq!(pi.signal_event(&ping, json!(null)).unwrap(), json!(null));
}

#[test]
fn failed_transformation_without_handler_aborts() {
    let mut pi = instance(RuntimeServices::default());

    let err = pi
        .signal_event(&NodePath::new([5]), json!({ "body": 5 }))
        .unwrap_err();
    match err {
        RuntimeError::Faulted { fault, handled_by } => {
            assert_eq!(fault.cause.type_name, "TransformationFailed");
            assert_eq!(handled_by, None);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pi.status(), InstanceStatus::Aborted);
    assert!(matches!(
        pi.set_variable("count", json!(1)),
        Err(RuntimeError::InstanceNotActive(_))
    ));
}

#[test]
fn denied_task_completion_raises_authorization_fault() {
    let services = RuntimeServices {
        authorizer: Arc::new(PotentialOwners::new().with_member("bob", "finance")),
        ..RuntimeServices::default()
    };
    let mut pi = instance(services);
    let task = NodePath::new([4, 2]);

    let err = pi.complete_task(&task, "eve", &Variables::new()).unwrap_err();
    match err {
        RuntimeError::Faulted { fault, handled_by } => {
            assert_eq!(fault.cause.type_name, "AuthorizationDenied");
            assert_eq!(
                fault.cause.payload,
                Some(json!(["user 'eve' is not a potential owner of task 'review'"]))
            );
            assert_eq!(handled_by, Some(NodePath::new([7])));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pi.status(), InstanceStatus::Active);
    assert_eq!(pi.handled_faults()[0].policy, "exception-type");
}

#[test]
fn completing_a_region_task_maps_results_and_finishes_the_child() {
    let services = RuntimeServices {
        authorizer: Arc::new(PotentialOwners::new().with_member("bob", "finance")),
        ..RuntimeServices::default()
    };
    let mut pi = instance(services);
    let region = NodePath::new([4]);
    pi.enter_dynamic(&region).unwrap();
    let TriggerOutcome::Started(task_instance) = pi.trigger(&region, 2).unwrap() else {
        panic!("task was not started");
    };

    let results = Variables::from([("amount".to_string(), json!(3))]);
    pi.complete_task(&NodePath::new([4, 2]), "bob", &results).unwrap();

    assert_eq!(pi.variable("count"), Some(&json!(3)));
    assert_eq!(pi.region_state(&region), Some(RegionState::Completed));
    let left: Vec<NodePath> = pi
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            AuditEvent::NodeLeft {
                node,
                node_instance_id,
                ..
            } if node_instance_id == task_instance => Some(node),
            _ => None,
        })
        .collect();
    assert_eq!(left, vec![NodePath::new([4, 2])]);
}

#[test]
fn condition_faults_go_to_the_region_handler() {
    let region = NodePath::new([6]);
    let mut pi = instance(RuntimeServices::default());

    // `limit` is unset, so the completion condition cannot be evaluated.
    pi.enter_dynamic(&region).unwrap();
    let handled = pi.handled_faults().to_vec();
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].scope, region);
    assert_eq!(handled[0].handler, NodePath::new([6, 3]));
    assert_eq!(pi.status(), InstanceStatus::Active);

    pi.set_region_variable(&region, "limit", json!(5)).unwrap();
    assert_eq!(pi.region_state(&region), Some(RegionState::Active));
    assert!(pi.variable("limit").is_none());

    pi.set_variable("count", json!(6)).unwrap();
    assert_eq!(pi.region_state(&region), Some(RegionState::Completed));
    assert_eq!(pi.handled_faults().len(), 1);
}

#[test]
fn completing_the_instance_cancels_live_regions() {
    let region = NodePath::new([4]);
    let mut pi = instance(RuntimeServices::default());
    pi.enter_dynamic(&region).unwrap();

    pi.complete().unwrap();
    assert_eq!(pi.status(), InstanceStatus::Completed);
    assert_eq!(pi.region_state(&region), Some(RegionState::Cancelled));
    assert!(matches!(pi.complete(), Err(RuntimeError::InstanceNotActive(_))));
}

const NESTED_SCOPES: &str = r#"
id: nested.scopes
variables:
  - name: count
    type: integer
    default: 10
nodes:
  - id: 1
    type: composite
    variables:
      - name: count
        type: integer
        default: 0
    nodes:
      - id: 2
        type: dynamic
        completionCondition: count >= 3
        nodes:
          - id: 1
            type: ruleTask
            ruleFlowGroup: scoring
      - id: 3
        type: event
        eventType: tally
        variableName: count
  - id: 4
    type: dynamic
    nodes:
      - id: 1
        type: humanTask
        taskName: check
      - id: 6
        type: dynamic
        nodes:
          - id: 1
            type: ruleTask
            ruleFlowGroup: scoring
"#;

fn nested_instance() -> ProcessInstance {
    let def = parse_definition_str(NESTED_SCOPES, DefinitionFormat::Auto)
        .unwrap()
        .definition;
    let process = Arc::new(Compiler::default().compile_process(&def).unwrap());
    ProcessInstance::new(Uuid::new_v4(), process, RuntimeServices::default(), Variables::new())
        .unwrap()
}

#[test]
fn regions_inside_a_composite_see_its_locals() {
    let region = NodePath::new([1, 2]);
    let mut pi = nested_instance();
    pi.enter_dynamic(&region).unwrap();
    assert_eq!(pi.region_state(&region), Some(RegionState::Active));

    assert_eq!(pi.signal_event(&NodePath::new([1, 3]), json!(3)).unwrap(), json!(3));
    assert_eq!(pi.region_state(&region), Some(RegionState::Completed));
    assert_eq!(pi.variable("count"), Some(&json!(10)));
}

#[test]
fn composite_locals_keep_their_declared_type() {
    let mut pi = nested_instance();
    pi.enter_dynamic(&NodePath::new([1, 2])).unwrap();
    assert!(matches!(
        pi.signal_event(&NodePath::new([1, 3]), json!("three")),
        Err(RuntimeError::TypeMismatch { .. })
    ));
}

#[test]
fn completed_inner_region_finishes_its_parent_child() {
    let outer = NodePath::new([4]);
    let inner = NodePath::new([4, 6]);
    let mut pi = nested_instance();
    pi.enter_dynamic(&outer).unwrap();

    let TriggerOutcome::Started(child) = pi.trigger(&outer, 6).unwrap() else {
        panic!("inner region was not started");
    };
    assert_eq!(pi.enter_dynamic(&inner).unwrap(), child);
    let TriggerOutcome::Started(task) = pi.trigger(&inner, 1).unwrap() else {
        panic!("inner task was not started");
    };
    pi.drain_events();

    pi.complete_child(&inner, task).unwrap();
    assert_eq!(pi.region_state(&inner), Some(RegionState::Completed));
    assert_eq!(pi.region_state(&outer), Some(RegionState::Completed));
    assert!(pi.active_children(&outer).is_empty());

    let left: Vec<_> = pi
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            AuditEvent::NodeLeft {
                node,
                node_instance_id,
                ..
            } => Some((node.to_string(), node_instance_id)),
            _ => None,
        })
        .collect();
    assert_eq!(
        left,
        vec![
            ("/4/6/1".to_string(), task),
            ("/4/6".to_string(), child),
            ("/4".to_string(), 1),
        ]
    );
}

#[test]
fn cancelling_an_inner_region_cancels_its_parent_child() {
    let outer = NodePath::new([4]);
    let inner = NodePath::new([4, 6]);
    let mut pi = nested_instance();
    pi.enter_dynamic(&outer).unwrap();
    let TriggerOutcome::Started(task) = pi.trigger(&outer, 1).unwrap() else {
        panic!("task was not started");
    };
    pi.trigger(&outer, 6).unwrap();
    pi.enter_dynamic(&inner).unwrap();

    pi.cancel_region(&inner).unwrap();
    assert_eq!(pi.region_state(&inner), Some(RegionState::Cancelled));
    assert_eq!(
        pi.active_children(&outer),
        vec![ActiveChild { instance: task, child: 1 }]
    );
    assert_eq!(pi.region_state(&outer), Some(RegionState::Active));
}
