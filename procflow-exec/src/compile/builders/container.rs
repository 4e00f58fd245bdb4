use procflow_core::types::{non_blank, NodeDescriptor, NodeKind, NodeType};

use super::wrong_kind;
use crate::compile::{BuildContext, Op, UnitBuilder};
use crate::error::CompileError;
use crate::registry::NodeBuilder;

/// Plain sub-graph. Variables, children, connections and handlers are emitted
/// by the compiler for every container.
pub struct CompositeBuilder;

impl NodeBuilder for CompositeBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        _ctx: &BuildContext<'_>,
        _out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        match node.kind {
            NodeKind::Composite(_) => Ok(()),
            _ => Err(wrong_kind(node, NodeType::Composite)),
        }
    }
}

/// Ad-hoc region. Both conditions see the region's own variables.
pub struct DynamicBuilder;

impl NodeBuilder for DynamicBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::Dynamic(region) = &node.kind else {
            return Err(wrong_kind(node, NodeType::Dynamic));
        };
        let language = region.language.as_deref();
        if let Some(text) = non_blank(region.activation_condition.as_deref()) {
            let e = ctx.expression(node.id, "activationCondition", language, text)?;
            out.push(Op::SetActivationCondition(e));
        }
        if let Some(text) = non_blank(region.completion_condition.as_deref()) {
            let e = ctx.expression(node.id, "completionCondition", language, text)?;
            out.push(Op::SetCompletionCondition(e));
        }
        Ok(())
    }
}
