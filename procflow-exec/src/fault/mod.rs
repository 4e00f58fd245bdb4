//! Fault model and handler routing.
//!
//! A [`Fault`] raised by a node is matched against the exception handlers of
//! its enclosing scopes, innermost first. Inside one scope the
//! [`PolicyChain`] decides which handler wins.

mod chain;
mod handler;
mod policy;

pub use chain::{Classification, ExceptionScope, HandlerMatch, PolicyChain};
pub use handler::HandlerDeclaration;
pub use policy::{
    ErrorCodePolicy, ExceptionPolicy, ExceptionTypePolicy, MessageEqualsPolicy,
    MessageRegexPolicy, SubtypePolicy, WrappedCausePolicy,
};

use procflow_core::expr::EvalError;
use serde_json::Value as JsonValue;

use crate::path::{NodeInstanceId, NodePath};

/// Type name of faults raised when a region condition cannot be evaluated.
pub const CONDITION_EVALUATION: &str = "ConditionEvaluation";
/// Type name of faults raised when the task authorizer refuses an operation.
pub const AUTHORIZATION_DENIED: &str = "AuthorizationDenied";
/// Type name of faults raised when an event transformation fails.
pub const TRANSFORMATION_FAILED: &str = "TransformationFailed";
/// Supertype shared by every fault the runtime raises on its own.
pub const RUNTIME_FAULT: &str = "RuntimeFault";

/// What went wrong, independent of where.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FaultCause {
    pub type_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Names this cause is also an instance of, nearest first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supertypes: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,

    /// The cause this one wraps, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<FaultCause>>,
}

impl FaultCause {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: None,
            supertypes: Vec::new(),
            payload: None,
            source: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_supertype(mut self, name: impl Into<String>) -> Self {
        self.supertypes.push(name.into());
        self
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn caused_by(mut self, source: FaultCause) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_a(&self, name: &str) -> bool {
        self.type_name == name || self.supertypes.iter().any(|s| s == name)
    }
}

impl std::fmt::Display for FaultCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{}: {m}", self.type_name),
            None => f.write_str(&self.type_name),
        }
    }
}

/// A cause raised by a specific node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, thiserror::Error)]
#[error("fault {cause} at node {node_path}")]
pub struct Fault {
    pub cause: FaultCause,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    pub node_path: NodePath,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_instance_id: Option<NodeInstanceId>,
}

impl Fault {
    pub fn new(node_path: NodePath, cause: FaultCause) -> Self {
        Self {
            cause,
            error_code: None,
            node_path,
            node_instance_id: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn with_instance(mut self, id: NodeInstanceId) -> Self {
        self.node_instance_id = Some(id);
        self
    }

    pub fn message(&self) -> Option<&str> {
        self.cause.message.as_deref()
    }

    /// A region condition failed to evaluate.
    pub fn condition_evaluation(
        node_path: NodePath,
        node_instance_id: NodeInstanceId,
        condition: &str,
        err: &EvalError,
    ) -> Self {
        let cause = FaultCause::new(CONDITION_EVALUATION)
            .with_message(format!("{condition} condition: {err}"))
            .with_supertype(RUNTIME_FAULT)
            .caused_by(FaultCause::new(eval_error_name(err)).with_message(err.to_string()));
        Self::new(node_path, cause).with_instance(node_instance_id)
    }

    pub fn authorization_denied(node_path: NodePath, reasons: &[String]) -> Self {
        let cause = FaultCause::new(AUTHORIZATION_DENIED)
            .with_message(reasons.join("; "))
            .with_supertype(RUNTIME_FAULT)
            .with_payload(JsonValue::from(reasons.to_vec()));
        Self::new(node_path, cause)
    }

    pub fn transformation_failed(node_path: NodePath, message: impl Into<String>) -> Self {
        let cause = FaultCause::new(TRANSFORMATION_FAILED)
            .with_message(message)
            .with_supertype(RUNTIME_FAULT);
        Self::new(node_path, cause)
    }
}

fn eval_error_name(err: &EvalError) -> &'static str {
    match err {
        EvalError::TypeMismatch(_) => "TypeMismatch",
        EvalError::DivisionByZero => "DivisionByZero",
        EvalError::NotBoolean(_) => "NotBoolean",
        EvalError::InvalidRegex(_) => "InvalidRegex",
        EvalError::NotNative(_) => "NotNative",
    }
}

/// No handler in any enclosing scope accepted the fault.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unhandled {fault}")]
pub struct UnhandledFault {
    pub fault: Fault,
}
