use procflow_core::types::{ExceptionHandlerSpec, NodeId};
use regex::Regex;

/// A compiled exception handler: the fault name every policy reads, the
/// handler node inside the declaring scope, and the fault name precompiled
/// as a message pattern.
#[derive(Debug, Clone)]
pub struct HandlerDeclaration {
    fault_name: String,
    handler: NodeId,
    pattern: Option<Regex>,
}

impl HandlerDeclaration {
    pub fn new(fault_name: impl Into<String>, handler: NodeId) -> Self {
        let fault_name = fault_name.into();
        // Not every fault name is a valid pattern; those simply never match by regex.
        let pattern = Regex::new(&format!("^(?:{fault_name})$")).ok();
        Self {
            fault_name,
            handler,
            pattern,
        }
    }

    pub fn from_spec(spec: &ExceptionHandlerSpec) -> Self {
        Self::new(spec.fault_name.trim(), spec.handler)
    }

    pub fn fault_name(&self) -> &str {
        &self.fault_name
    }

    pub fn handler(&self) -> NodeId {
        self.handler
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }
}

impl PartialEq for HandlerDeclaration {
    fn eq(&self, other: &Self) -> bool {
        self.fault_name == other.fault_name && self.handler == other.handler
    }
}
