use procflow_core::types::{non_blank, JoinType, NodeDescriptor, NodeKind, NodeType, SplitType};

use super::wrong_kind;
use crate::compile::{BuildContext, CompiledConstraint, Op, UnitBuilder};
use crate::error::CompileError;
use crate::registry::NodeBuilder;

pub struct StartBuilder;

impl NodeBuilder for StartBuilder {
    fn visit_custom_fields(
        &self,
        _node: &NodeDescriptor,
        _ctx: &BuildContext<'_>,
        _out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        Ok(())
    }
}

pub struct EndBuilder;

impl NodeBuilder for EndBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        _ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::End(end) = &node.kind else {
            return Err(wrong_kind(node, NodeType::End));
        };
        out.push(Op::SetTerminate(end.terminate));
        Ok(())
    }
}

pub struct SplitBuilder;

impl NodeBuilder for SplitBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::Split(split) = &node.kind else {
            return Err(wrong_kind(node, NodeType::Split));
        };
        out.push(Op::SetSplitType(split.split_type));

        for (i, c) in split.constraints.iter().enumerate() {
            let condition = match non_blank(c.expression.as_deref()) {
                Some(text) => Some(ctx.expression(
                    node.id,
                    format!("constraints[{i}].expression"),
                    c.language.as_deref(),
                    text,
                )?),
                None => None,
            };
            if condition.is_none() && !c.is_default && split.split_type != SplitType::And {
                return Err(CompileError::Configuration {
                    node_id: node.id,
                    message: format!("constraint to node {} has no expression", c.to),
                });
            }
            out.push(Op::AddConstraint(CompiledConstraint {
                to: c.to,
                priority: c.priority,
                is_default: c.is_default,
                condition,
            }));
        }
        Ok(())
    }
}

pub struct JoinBuilder;

impl NodeBuilder for JoinBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        _ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::Join(join) = &node.kind else {
            return Err(wrong_kind(node, NodeType::Join));
        };
        out.push(Op::SetJoinType(join.join_type));
        if join.join_type == JoinType::NOfM {
            match join.n {
                Some(n) if n > 0 => out.push(Op::SetJoinCount(n)),
                _ => {
                    return Err(CompileError::Configuration {
                        node_id: node.id,
                        message: "n-of-m join needs a positive 'n'".to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}
