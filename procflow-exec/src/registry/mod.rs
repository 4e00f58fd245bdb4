//! Node builder registry: maps a node type to the builder that turns a node
//! descriptor of that type into executable configuration.

use std::collections::HashMap;
use std::sync::Arc;

use procflow_core::types::{NodeDescriptor, NodeType};

use crate::compile::builders::{
    CompositeBuilder, DynamicBuilder, EndBuilder, EventBuilder, FaultBuilder, HumanTaskBuilder,
    JoinBuilder, RuleTaskBuilder, SplitBuilder, StartBuilder, SubProcessBuilder, TimerBuilder,
};
use crate::compile::{BuildContext, UnitBuilder};
use crate::error::CompileError;

/// Per-type compilation hook.
///
/// The compiler emits identity, name and metadata for every node, and the
/// sub-graph of every container; a builder adds only what its type carries.
pub trait NodeBuilder: Send + Sync {
    /// Name used when the descriptor has none.
    fn default_name(&self, node: &NodeDescriptor) -> String {
        default_label(&node.node_type())
    }

    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError>;
}

pub fn default_label(node_type: &NodeType) -> String {
    match node_type {
        NodeType::Start => "Start",
        NodeType::End => "End",
        NodeType::Split => "Gateway",
        NodeType::Join => "Join",
        NodeType::HumanTask => "Human Task",
        NodeType::RuleTask => "Rule Task",
        NodeType::SubProcess => "Sub-Process",
        NodeType::Timer => "Timer",
        NodeType::Event => "Event",
        NodeType::Fault => "Fault",
        NodeType::Composite => "Composite",
        NodeType::Dynamic => "Dynamic Node",
        NodeType::Custom(name) => name.as_str(),
    }
    .to_string()
}

/// Builders keyed by node type. Read-only once handed to a compiler, so it is
/// shared freely across threads.
#[derive(Clone, Default)]
pub struct NodeBuilderRegistry {
    builders: HashMap<NodeType, Arc<dyn NodeBuilder>>,
}

impl std::fmt::Debug for NodeBuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeBuilderRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}

impl NodeBuilderRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry covering every built-in node type.
    pub fn standard() -> Self {
        Self::empty()
            .with(NodeType::Start, Arc::new(StartBuilder))
            .with(NodeType::End, Arc::new(EndBuilder))
            .with(NodeType::Split, Arc::new(SplitBuilder))
            .with(NodeType::Join, Arc::new(JoinBuilder))
            .with(NodeType::HumanTask, Arc::new(HumanTaskBuilder))
            .with(NodeType::RuleTask, Arc::new(RuleTaskBuilder))
            .with(NodeType::SubProcess, Arc::new(SubProcessBuilder))
            .with(NodeType::Timer, Arc::new(TimerBuilder))
            .with(NodeType::Event, Arc::new(EventBuilder))
            .with(NodeType::Fault, Arc::new(FaultBuilder))
            .with(NodeType::Composite, Arc::new(CompositeBuilder))
            .with(NodeType::Dynamic, Arc::new(DynamicBuilder))
    }

    pub fn with(mut self, node_type: NodeType, builder: Arc<dyn NodeBuilder>) -> Self {
        self.register(node_type, builder);
        self
    }

    /// Returns the builder previously registered for `node_type`, if any.
    pub fn register(
        &mut self,
        node_type: NodeType,
        builder: Arc<dyn NodeBuilder>,
    ) -> Option<Arc<dyn NodeBuilder>> {
        self.builders.insert(node_type, builder)
    }

    /// Registers one builder for several types.
    pub fn register_all(
        &mut self,
        node_types: impl IntoIterator<Item = NodeType>,
        builder: Arc<dyn NodeBuilder>,
    ) {
        for t in node_types {
            self.builders.insert(t, Arc::clone(&builder));
        }
    }

    pub fn resolve(&self, node: &NodeDescriptor) -> Result<&dyn NodeBuilder, CompileError> {
        let node_type = node.node_type();
        match self.builders.get(&node_type) {
            Some(b) => Ok(b.as_ref()),
            None => Err(CompileError::UnsupportedNodeType {
                node_type,
                node_id: node.id,
            }),
        }
    }

    pub fn contains(&self, node_type: &NodeType) -> bool {
        self.builders.contains_key(node_type)
    }

    pub fn node_types(&self) -> Vec<NodeType> {
        let mut out: Vec<NodeType> = self.builders.keys().cloned().collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::builders::AttributeBuilder;
    use procflow_core::types::{CustomNode, NodeKind};
    use std::collections::BTreeMap;

    fn custom(id: i64, ty: &str) -> NodeDescriptor {
        NodeDescriptor::new(
            id,
            NodeKind::Custom(CustomNode {
                custom_type: ty.to_string(),
                attributes: BTreeMap::new(),
            }),
        )
    }

    #[test]
    fn standard_registry_covers_builtins_only() {
        let r = NodeBuilderRegistry::standard();
        for t in NodeType::BUILTIN.iter() {
            assert!(r.contains(t), "missing builder for {t}");
        }
        assert_eq!(r.node_types().len(), NodeType::BUILTIN.len());

        let err = r.resolve(&custom(7, "webhook")).err().unwrap();
        match err {
            CompileError::UnsupportedNodeType { node_type, node_id } => {
                assert_eq!(node_type, NodeType::Custom("webhook".to_string()));
                assert_eq!(node_id, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn custom_types_resolve_once_registered() {
        let mut r = NodeBuilderRegistry::standard();
        let previous = r.register(NodeType::Custom("webhook".into()), Arc::new(AttributeBuilder));
        assert!(previous.is_none());
        let b = r.resolve(&custom(1, "webhook")).unwrap();
        assert_eq!(b.default_name(&custom(1, "webhook")), "webhook");
        assert!(r.resolve(&custom(1, "other")).is_err());
    }

    #[test]
    fn one_builder_for_several_types() {
        let mut r = NodeBuilderRegistry::empty();
        r.register_all(
            [NodeType::Custom("a".into()), NodeType::Custom("b".into())],
            Arc::new(AttributeBuilder),
        );
        assert_eq!(
            r.node_types(),
            vec![NodeType::Custom("a".into()), NodeType::Custom("b".into())]
        );
    }

    #[test]
    fn default_labels() {
        assert_eq!(default_label(&NodeType::Split), "Gateway");
        assert_eq!(default_label(&NodeType::Dynamic), "Dynamic Node");
    }
}
