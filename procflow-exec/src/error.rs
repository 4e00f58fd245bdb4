use procflow_core::expr::ExprError;
use procflow_core::types::{NodeId, NodeType, VariableType};
use procflow_core::ValidationError;
use procflow_store::StoreError;
use uuid::Uuid;

use crate::fault::Fault;
use crate::path::{NodeInstanceId, NodePath};

/// Fatal for the definition being compiled; never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("unsupported node type {node_type} (node {node_id})")]
    UnsupportedNodeType { node_type: NodeType, node_id: NodeId },
    #[error("node {node_id}: invalid {attribute}: {source}")]
    Expression {
        node_id: NodeId,
        attribute: String,
        #[source]
        source: ExprError,
    },
    #[error("node {node_id}: {attribute} uses unsupported language '{language}'")]
    UnsupportedLanguage {
        node_id: NodeId,
        attribute: String,
        language: String,
    },
    #[error("node {node_id}: {message}")]
    Configuration { node_id: NodeId, message: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl CompileError {
    pub(crate) fn expression(node_id: NodeId, attribute: impl Into<String>, err: ExprError) -> Self {
        let attribute = attribute.into();
        match err {
            ExprError::UnsupportedLanguage(language) => CompileError::UnsupportedLanguage {
                node_id,
                attribute,
                language,
            },
            source => CompileError::Expression {
                node_id,
                attribute,
                source,
            },
        }
    }

    pub(crate) fn missing(node_id: NodeId, attribute: &str) -> Self {
        CompileError::Configuration {
            node_id,
            message: format!("missing required attribute '{attribute}'"),
        }
    }
}

/// Misuse of a process instance, or a fault that surfaced to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("no node at {0}")]
    UnknownNode(NodePath),
    #[error("node {path} is a {found} node, expected {expected}")]
    WrongNodeType {
        path: NodePath,
        expected: NodeType,
        found: NodeType,
    },
    #[error("dynamic region {0} is not active")]
    RegionNotActive(NodePath),
    #[error("dynamic region {region} has no child {child}")]
    UnknownChild { region: NodePath, child: NodeId },
    #[error("dynamic region {region} has no active child instance {instance}")]
    UnknownChildInstance {
        region: NodePath,
        instance: NodeInstanceId,
    },
    #[error("process instance {0} is not active")]
    InstanceNotActive(Uuid),
    #[error("variable '{name}' is declared as {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: VariableType,
        found: String,
    },
    #[error("{}", faulted_message(.fault, .handled_by.as_ref()))]
    Faulted {
        fault: Box<Fault>,
        handled_by: Option<NodePath>,
    },
}

fn faulted_message(fault: &Fault, handled_by: Option<&NodePath>) -> String {
    match handled_by {
        Some(handler) => format!("{fault} (handled by {handler})"),
        None => format!("{fault} (unhandled)"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("process '{0}' is not deployed")]
    UnknownProcess(String),
    #[error("process instance {0} not found")]
    UnknownInstance(Uuid),
}
