use std::collections::BTreeMap;

use procflow_core::expr::CompiledExpr;
use procflow_core::types::{
    EventScope, JoinType, NodeId, NodeType, SplitType, VariableDeclaration,
};
use serde_json::Value as JsonValue;

use crate::compile::timer::TimerExpr;
use crate::fault::HandlerDeclaration;
use crate::transform::EventTransformation;

/// Guard on one outgoing split connection, with its condition compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledConstraint {
    pub to: NodeId,
    pub priority: i32,
    pub is_default: bool,
    pub condition: Option<CompiledExpr>,
}

/// One configuration step of an executable unit. Units are compared by their
/// op sequence, so ops carry only structural data.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    SetId(NodeId),
    SetName(String),
    SetMetaData { key: String, value: JsonValue },

    // Containers.
    DeclareVariable(VariableDeclaration),
    LinkChild { index: usize, node_id: NodeId },
    Connect { from: NodeId, to: NodeId },
    AddExceptionHandler(HandlerDeclaration),

    SetTerminate(bool),
    SetSplitType(SplitType),
    AddConstraint(CompiledConstraint),
    SetJoinType(JoinType),
    SetJoinCount(u32),

    SetTaskName(String),
    AddActor(String),
    AddGroup(String),
    SetTaskPriority(i64),
    SetSkippable(bool),
    SetComment(String),
    AddInMapping { parameter: String, variable: String },
    AddOutMapping { result: String, variable: String },

    SetRuleFlowGroup(String),
    SetRuleLanguage(String),
    SetDecision(String),

    SetProcessId(String),
    SetWaitForCompletion(bool),
    SetIndependent(bool),

    SetTimerDelay(TimerExpr),
    SetTimerPeriod(TimerExpr),
    SetTimerDate(TimerExpr),

    SetEventType(String),
    SetEventScope(EventScope),
    SetVariableName(String),
    SetTransformation(EventTransformation),

    SetFaultName(String),
    SetFaultVariable(String),

    SetActivationCondition(CompiledExpr),
    SetCompletionCondition(CompiledExpr),

    /// Attribute of a custom node, passed through untouched.
    SetAttribute { key: String, value: JsonValue },
}

/// Ops collected by a node builder.
#[derive(Debug, Default)]
pub struct UnitBuilder {
    ops: Vec<Op>,
}

impl UnitBuilder {
    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = Op>) {
        self.ops.extend(ops);
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub(crate) fn into_ops(self) -> Vec<Op> {
        self.ops
    }
}

/// A node compiled for execution: its configuration ops in emission order and
/// the compiled units of its children, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableUnit {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub ops: Vec<Op>,
    pub children: Vec<ExecutableUnit>,
}

impl ExecutableUnit {
    fn find<'a, T>(&'a self, f: impl Fn(&'a Op) -> Option<T>) -> Option<T> {
        self.ops.iter().find_map(f)
    }

    pub fn name(&self) -> &str {
        self.find(|op| match op {
            Op::SetName(n) => Some(n.as_str()),
            _ => None,
        })
        .unwrap_or_default()
    }

    pub fn metadata(&self) -> BTreeMap<&str, &JsonValue> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::SetMetaData { key, value } => Some((key.as_str(), value)),
                _ => None,
            })
            .collect()
    }

    pub fn child(&self, id: NodeId) -> Option<&ExecutableUnit> {
        self.children.iter().find(|c| c.node_id == id)
    }

    pub fn is_container(&self) -> bool {
        matches!(self.node_type, NodeType::Composite | NodeType::Dynamic)
    }

    pub fn variables(&self) -> Vec<&VariableDeclaration> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::DeclareVariable(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn exception_handlers(&self) -> Vec<&HandlerDeclaration> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::AddExceptionHandler(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    pub fn activation_condition(&self) -> Option<&CompiledExpr> {
        self.find(|op| match op {
            Op::SetActivationCondition(e) => Some(e),
            _ => None,
        })
    }

    pub fn completion_condition(&self) -> Option<&CompiledExpr> {
        self.find(|op| match op {
            Op::SetCompletionCondition(e) => Some(e),
            _ => None,
        })
    }

    pub fn transformation(&self) -> Option<&EventTransformation> {
        self.find(|op| match op {
            Op::SetTransformation(t) => Some(t),
            _ => None,
        })
    }

    pub fn event_variable(&self) -> Option<&str> {
        self.find(|op| match op {
            Op::SetVariableName(v) => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn task_name(&self) -> Option<&str> {
        self.find(|op| match op {
            Op::SetTaskName(v) => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn actors(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::AddActor(a) => Some(a.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn groups(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::AddGroup(g) => Some(g.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Task result name -> variable written when the task completes.
    pub fn out_mappings(&self) -> Vec<(&str, &str)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::AddOutMapping { result, variable } => Some((result.as_str(), variable.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Children whose metadata asks to be started when the region activates.
    pub fn auto_start_children(&self) -> Vec<NodeId> {
        self.children
            .iter()
            .filter(|c| matches!(c.metadata().get("autoStart"), Some(JsonValue::Bool(true))))
            .map(|c| c.node_id)
            .collect()
    }
}
