use procflow_core::{parse_definition_str, DefinitionFormat};
use procflow_exec::fault::{ExceptionPolicy, ExceptionScope};
use procflow_exec::{
    CompiledProcess, Compiler, Fault, FaultCause, HandlerDeclaration, NodePath, PolicyChain,
};
use serde_json::json;

const NESTED_HANDLERS: &str = r#"
id: fault.routing
exceptionHandlers:
  - faultName: "^timeout.*"
    handler: 3
  - faultName: RuntimeFault
    handler: 4
nodes:
  - id: 1
    type: composite
    exceptionHandlers:
      - faultName: ServiceFault
        handler: 2
      - faultName: E1
        handler: 3
    nodes:
      - id: 1
        type: humanTask
        taskName: call
      - id: 2
        type: end
      - id: 3
        type: end
  - id: 3
    type: end
  - id: 4
    type: end
"#;

fn compiled() -> CompiledProcess {
    let def = parse_definition_str(NESTED_HANDLERS, DefinitionFormat::Auto)
        .unwrap()
        .definition;
    Compiler::default().compile_process(&def).unwrap()
}

fn route(process: &CompiledProcess, fault: &Fault) -> Option<(&'static str, String)> {
    PolicyChain::standard()
        .route(fault, &process.exception_scopes(&fault.node_path))
        .ok()
        .map(|m| (m.policy, m.handler.to_string()))
}

fn task_fault(cause: FaultCause) -> Fault {
    Fault::new(NodePath::new([1, 1]), cause)
}

#[test]
fn standard_chain_order() {
    assert_eq!(
        PolicyChain::standard().policy_names(),
        vec!["error-code", "exception-type", "message", "wrapped-cause", "message-regex", "subtype"]
    );
}

#[test]
fn error_code_outranks_exception_type() {
    let process = compiled();

    let fault = task_fault(FaultCause::new("ServiceFault")).with_code("E1");
    assert_eq!(route(&process, &fault), Some(("error-code", "/1/3".to_string())));

    let fault = task_fault(FaultCause::new("ServiceFault")).with_code("E2");
    assert_eq!(route(&process, &fault), Some(("exception-type", "/1/2".to_string())));
}

#[test]
fn first_matching_error_code_wins_over_a_type_match() {
    let e2 = HandlerDeclaration::new("E2", 1);
    let e1 = HandlerDeclaration::new("E1", 2);
    let by_type = HandlerDeclaration::new("ServiceFault", 3);
    let fault = task_fault(FaultCause::new("ServiceFault")).with_code("E1");

    let c = PolicyChain::standard()
        .classify(&fault, &[&e2, &e1, &by_type])
        .unwrap();
    assert_eq!(c.policy, "error-code");
    assert_eq!(c.handler.handler(), 2);
}

#[test]
fn message_pattern_is_anchored_at_the_start() {
    let handler = HandlerDeclaration::new("^timeout.*", 1);
    let chain = PolicyChain::standard();

    let fault = task_fault(FaultCause::new("Io").with_message("timeout: socket closed"));
    let c = chain.classify(&fault, &[&handler]).unwrap();
    assert_eq!(c.policy, "message-regex");

    let fault = task_fault(FaultCause::new("Io").with_message("connection timeout"));
    assert!(chain.classify(&fault, &[&handler]).is_none());
}

#[test]
fn unmatched_faults_walk_out_to_the_process() {
    let process = compiled();

    let fault = task_fault(FaultCause::new("Io").with_message("timeout after 5s"));
    assert_eq!(route(&process, &fault), Some(("message-regex", "/3".to_string())));

    let fault = task_fault(FaultCause::new("Io").with_supertype("RuntimeFault"));
    assert_eq!(route(&process, &fault), Some(("subtype", "/4".to_string())));
}

#[test]
fn message_regex_needs_a_full_match() {
    let process = compiled();
    let fault = task_fault(FaultCause::new("Io").with_message("read timeout"));
    assert_eq!(route(&process, &fault), None);
}

#[test]
fn unhandled_faults_keep_the_original_fault() {
    let process = compiled();
    let fault = task_fault(FaultCause::new("Io").with_message("disk full"));
    let err = PolicyChain::standard()
        .route(&fault, &process.exception_scopes(&fault.node_path))
        .unwrap_err();
    assert_eq!(err.fault, fault);
    assert_eq!(err.to_string(), "unhandled fault Io: disk full at node /1/1");
}

/// Matches when the cause payload carries a `reason` equal to the fault name.
struct PayloadReasonPolicy;

impl ExceptionPolicy for PayloadReasonPolicy {
    fn name(&self) -> &'static str {
        "payload-reason"
    }

    fn matches(&self, handler: &HandlerDeclaration, fault: &Fault) -> bool {
        fault
            .cause
            .payload
            .as_ref()
            .and_then(|p| p.get("reason"))
            .and_then(|r| r.as_str())
            .is_some_and(|r| r == handler.fault_name())
    }
}

#[test]
fn appended_policies_run_after_the_standard_ones() {
    let chain = PolicyChain::standard().append(PayloadReasonPolicy);
    assert_eq!(chain.len(), 7);

    let by_reason = HandlerDeclaration::new("quota", 8);
    let by_type = HandlerDeclaration::new("Billing", 9);
    let scope = ExceptionScope {
        path: NodePath::root(),
        handlers: vec![&by_reason, &by_type],
    };

    let fault = Fault::new(
        NodePath::new([2]),
        FaultCause::new("Billing").with_payload(json!({ "reason": "quota" })),
    );
    let m = chain.route(&fault, std::slice::from_ref(&scope)).unwrap();
    assert_eq!(m.policy, "exception-type");
    assert_eq!(m.handler, NodePath::new([9]));

    let fault = Fault::new(
        NodePath::new([2]),
        FaultCause::new("Other").with_payload(json!({ "reason": "quota" })),
    );
    let m = chain.route(&fault, std::slice::from_ref(&scope)).unwrap();
    assert_eq!(m.policy, "payload-reason");
    assert_eq!(m.handler, NodePath::new([8]));
}
