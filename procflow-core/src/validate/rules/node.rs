use std::collections::HashSet;

use crate::types::{NodeDescriptor, NodeKind};
use crate::validate::rules::container::{validate_graph, Graph};
use crate::validate::validator::Validator;

pub(crate) fn validate_node(v: &mut Validator, path: &str, node: &NodeDescriptor) {
    match &node.kind {
        NodeKind::Split(split) => {
            let mut targets = HashSet::new();
            let mut defaults = 0;
            for (idx, c) in split.constraints.iter().enumerate() {
                if !targets.insert(c.to) {
                    v.push(
                        format!("{path}.constraints[{idx}].to"),
                        format!("duplicate constraint for target {}", c.to),
                    );
                }
                if c.is_default {
                    defaults += 1;
                }
            }
            if defaults > 1 {
                v.push(
                    format!("{path}.constraints"),
                    "at most one constraint may be marked default",
                );
            }
        }
        NodeKind::Custom(custom) if custom.custom_type.trim().is_empty() => {
            v.push(format!("{path}.customType"), "must not be empty");
        }
        NodeKind::Composite(c) => validate_graph(
            v,
            path,
            Graph {
                variables: &c.variables,
                nodes: &c.nodes,
                connections: &c.connections,
                exception_handlers: &c.exception_handlers,
            },
        ),
        NodeKind::Dynamic(d) => {
            if !d.connections.is_empty() {
                v.push(
                    format!("{path}.connections"),
                    "dynamic regions start children by condition, connections are not allowed",
                );
            }
            validate_graph(
                v,
                path,
                Graph {
                    variables: &d.variables,
                    nodes: &d.nodes,
                    connections: &[],
                    exception_handlers: &d.exception_handlers,
                },
            );
        }
        _ => {}
    }
}
