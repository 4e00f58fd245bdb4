use crate::types::{non_blank, ProcessDefinition};
use crate::validate::rules::container::{validate_graph, Graph};
use crate::validate::validator::{Validator, PROCESS_ID_RE};

pub(crate) fn validate_process(v: &mut Validator, def: &ProcessDefinition) {
    match non_blank(Some(&def.id)) {
        None => v.push("$.id", "must not be empty"),
        Some(id) if !PROCESS_ID_RE.is_match(id) => {
            v.push("$.id", "must match regex ^[A-Za-z0-9_\\-\\.]+$")
        }
        Some(_) => {}
    }

    if def.nodes.is_empty() {
        v.push("$.nodes", "process must declare at least one node");
    }

    validate_graph(
        v,
        "$",
        Graph {
            variables: &def.variables,
            nodes: &def.nodes,
            connections: &def.connections,
            exception_handlers: &def.exception_handlers,
        },
    );
}
