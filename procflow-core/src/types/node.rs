use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::types::{Connection, ExceptionHandlerSpec, Metadata, NodeId, VariableDeclaration};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub kind: NodeKind,

    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl NodeDescriptor {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            name: None,
            kind,
            metadata: Metadata::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn container(&self) -> Option<Container<'_>> {
        self.kind.container()
    }

    pub fn children(&self) -> &[NodeDescriptor] {
        self.container().map(|c| c.nodes).unwrap_or(&[])
    }

    pub fn is_auto_start(&self) -> bool {
        matches!(self.metadata.get("autoStart"), Some(JsonValue::Bool(true)))
    }
}

/// Type-specific payload of a node. Known kinds are closed; anything else goes
/// through [`NodeKind::Custom`] and is dispatched by its `customType` name.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    Start,
    End(EndNode),
    Split(SplitNode),
    Join(JoinNode),
    HumanTask(HumanTaskNode),
    RuleTask(RuleTaskNode),
    SubProcess(SubProcessNode),
    Timer(TimerNode),
    Event(EventNode),
    Fault(FaultNode),
    Composite(CompositeNode),
    Dynamic(DynamicNode),
    Custom(CustomNode),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Start => NodeType::Start,
            NodeKind::End(_) => NodeType::End,
            NodeKind::Split(_) => NodeType::Split,
            NodeKind::Join(_) => NodeType::Join,
            NodeKind::HumanTask(_) => NodeType::HumanTask,
            NodeKind::RuleTask(_) => NodeType::RuleTask,
            NodeKind::SubProcess(_) => NodeType::SubProcess,
            NodeKind::Timer(_) => NodeType::Timer,
            NodeKind::Event(_) => NodeType::Event,
            NodeKind::Fault(_) => NodeType::Fault,
            NodeKind::Composite(_) => NodeType::Composite,
            NodeKind::Dynamic(_) => NodeType::Dynamic,
            NodeKind::Custom(c) => NodeType::Custom(c.custom_type.clone()),
        }
    }

    pub fn container(&self) -> Option<Container<'_>> {
        match self {
            NodeKind::Composite(c) => Some(Container {
                variables: &c.variables,
                nodes: &c.nodes,
                connections: &c.connections,
                exception_handlers: &c.exception_handlers,
            }),
            NodeKind::Dynamic(d) => Some(Container {
                variables: &d.variables,
                nodes: &d.nodes,
                connections: &d.connections,
                exception_handlers: &d.exception_handlers,
            }),
            _ => None,
        }
    }
}

/// Borrowed view over the parts shared by every node that owns a sub-graph.
#[derive(Debug, Clone, Copy)]
pub struct Container<'a> {
    pub variables: &'a [VariableDeclaration],
    pub nodes: &'a [NodeDescriptor],
    pub connections: &'a [Connection],
    pub exception_handlers: &'a [ExceptionHandlerSpec],
}

/// Dispatch key for the builder registry: the node's kind without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum NodeType {
    Start,
    End,
    Split,
    Join,
    HumanTask,
    RuleTask,
    SubProcess,
    Timer,
    Event,
    Fault,
    Composite,
    Dynamic,
    Custom(String),
}

impl NodeType {
    pub const BUILTIN: [NodeType; 12] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Split,
        NodeType::Join,
        NodeType::HumanTask,
        NodeType::RuleTask,
        NodeType::SubProcess,
        NodeType::Timer,
        NodeType::Event,
        NodeType::Fault,
        NodeType::Composite,
        NodeType::Dynamic,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Split => "split",
            NodeType::Join => "join",
            NodeType::HumanTask => "humanTask",
            NodeType::RuleTask => "ruleTask",
            NodeType::SubProcess => "subProcess",
            NodeType::Timer => "timer",
            NodeType::Event => "event",
            NodeType::Fault => "fault",
            NodeType::Composite => "composite",
            NodeType::Dynamic => "dynamic",
            NodeType::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Custom(name) => write!(f, "custom:{name}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EndNode {
    #[serde(default)]
    pub terminate: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitType {
    And,
    #[default]
    Xor,
    Or,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SplitNode {
    #[serde(default, rename = "splitType")]
    pub split_type: SplitType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

/// Guard on one outgoing connection of a split.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Constraint {
    pub to: NodeId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default, rename = "default")]
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinType {
    #[default]
    And,
    Xor,
    Discriminator,
    NOfM,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JoinNode {
    #[serde(default, rename = "joinType")]
    pub join_type: JoinType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanTaskNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(default)]
    pub skippable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Task parameter name -> process variable read when the task is created.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub in_mappings: BTreeMap<String, String>,

    /// Task result name -> process variable written when the task completes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub out_mappings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTaskNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_flow_group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubProcessNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,

    #[serde(default = "default_true")]
    pub wait_for_completion: bool,

    #[serde(default = "default_true")]
    pub independent: bool,
}

impl Default for SubProcessNode {
    fn default() -> Self {
        Self {
            process_id: None,
            wait_for_completion: true,
            independent: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimerNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventScope {
    #[default]
    Internal,
    External,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    #[serde(default)]
    pub scope: EventScope,

    /// Process variable that receives the (transformed) event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<TransformationSpec>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransformationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    pub expression: String,

    /// Name the event payload is bound to while the expression runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_variable: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeNode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDeclaration>,

    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception_handlers: Vec<ExceptionHandlerSpec>,
}

/// Ad-hoc region: children are started and stopped by condition evaluation,
/// not by connections. `connections` exists only so that validation can reject it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicNode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDeclaration>,

    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception_handlers: Vec<ExceptionHandlerSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomNode {
    pub custom_type: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, JsonValue>,
}
