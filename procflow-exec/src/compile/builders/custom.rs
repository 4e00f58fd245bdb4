use procflow_core::types::{NodeDescriptor, NodeKind};

use crate::compile::{BuildContext, Op, UnitBuilder};
use crate::error::CompileError;
use crate::registry::NodeBuilder;

/// Generic builder for custom node types: every attribute is passed through
/// as-is. Register it under each custom type name that needs no validation.
pub struct AttributeBuilder;

impl NodeBuilder for AttributeBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        _ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        if let NodeKind::Custom(custom) = &node.kind {
            out.extend(custom.attributes.iter().map(|(key, value)| Op::SetAttribute {
                key: key.clone(),
                value: value.clone(),
            }));
        }
        Ok(())
    }
}
