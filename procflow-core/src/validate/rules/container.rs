use std::collections::HashSet;

use crate::types::{Connection, ExceptionHandlerSpec, NodeDescriptor, VariableDeclaration};
use crate::validate::rules::node::validate_node;
use crate::validate::validator::{Validator, VARIABLE_NAME_RE};

/// The parts shared by the process root and every composite node.
pub(crate) struct Graph<'a> {
    pub variables: &'a [VariableDeclaration],
    pub nodes: &'a [NodeDescriptor],
    pub connections: &'a [Connection],
    pub exception_handlers: &'a [ExceptionHandlerSpec],
}

pub(crate) fn validate_graph(v: &mut Validator, path: &str, graph: Graph<'_>) {
    let mut names = HashSet::new();
    for (idx, var) in graph.variables.iter().enumerate() {
        let vpath = format!("{path}.variables[{idx}]");
        if !VARIABLE_NAME_RE.is_match(&var.name) {
            v.push(format!("{vpath}.name"), "must be a valid identifier");
        }
        if !names.insert(var.name.as_str()) {
            v.push(
                format!("{vpath}.name"),
                format!("variable '{}' is declared twice in the same scope", var.name),
            );
        }
        if let Some(default) = &var.default {
            if !var.ty.accepts(default) {
                v.push(
                    format!("{vpath}.default"),
                    format!("default value does not match declared type {}", var.ty),
                );
            }
        }
    }

    let mut ids = HashSet::new();
    for (idx, node) in graph.nodes.iter().enumerate() {
        let npath = format!("{path}.nodes[{idx}]");
        if !ids.insert(node.id) {
            v.push(
                format!("{npath}.id"),
                format!("node id {} must be unique within its composite", node.id),
            );
        }
        validate_node(v, &npath, node);
    }

    for (idx, c) in graph.connections.iter().enumerate() {
        let cpath = format!("{path}.connections[{idx}]");
        if !ids.contains(&c.from) {
            v.push(format!("{cpath}.from"), format!("unknown node id {}", c.from));
        }
        if !ids.contains(&c.to) {
            v.push(format!("{cpath}.to"), format!("unknown node id {}", c.to));
        }
    }

    for (idx, h) in graph.exception_handlers.iter().enumerate() {
        let hpath = format!("{path}.exceptionHandlers[{idx}]");
        if h.fault_name.trim().is_empty() {
            v.push(format!("{hpath}.faultName"), "must not be empty");
        }
        if !ids.contains(&h.handler) {
            v.push(
                format!("{hpath}.handler"),
                format!("handler node {} is not declared in this scope", h.handler),
            );
        }
    }
}
