//! Visitor-style compilation of process definitions into executable units.
//!
//! Every node is dispatched by type to a [`NodeBuilder`]; containers recurse
//! into their children with a nested variable scope. Compilation is
//! deterministic: the same definition and registry always produce equal
//! units.

pub(crate) mod builders;
mod context;
mod timer;
mod unit;

use std::sync::Arc;

use procflow_core::types::{
    non_blank, Connection, Container, NodeDescriptor, ProcessDefinition, VariableDeclaration,
};
use procflow_core::{validate_definition, Scope};
use tracing::{debug, info};

use crate::error::CompileError;
use crate::fault::{ExceptionScope, HandlerDeclaration};
use crate::path::NodePath;
use crate::registry::{NodeBuilder, NodeBuilderRegistry};

pub use builders::AttributeBuilder;
pub use context::BuildContext;
pub use timer::{parse_duration, TimerExpr};
pub use unit::{CompiledConstraint, ExecutableUnit, Op, UnitBuilder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Name the payload is bound to in event transformations that do not
    /// name a source.
    pub event_binding: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            event_binding: "event".to_string(),
        }
    }
}

/// A whole process compiled for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProcess {
    pub id: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub variables: Vec<VariableDeclaration>,
    pub nodes: Vec<ExecutableUnit>,
    pub connections: Vec<Connection>,
    pub exception_handlers: Vec<HandlerDeclaration>,
}

impl CompiledProcess {
    pub fn unit(&self, path: &NodePath) -> Option<&ExecutableUnit> {
        let (first, rest) = path.ids().split_first()?;
        let mut cur = self.nodes.iter().find(|n| n.node_id == *first)?;
        for id in rest {
            cur = cur.child(*id)?;
        }
        Some(cur)
    }

    /// Handler scopes a fault raised at `path` is routed through: the node
    /// itself when it is a container, each enclosing container, then the
    /// process.
    pub fn exception_scopes(&self, path: &NodePath) -> Vec<ExceptionScope<'_>> {
        let mut scopes = Vec::new();
        for prefix in path.ancestry() {
            if prefix.is_root() {
                scopes.push(ExceptionScope {
                    path: prefix,
                    handlers: self.exception_handlers.iter().collect(),
                });
            } else if let Some(unit) = self.unit(&prefix).filter(|u| u.is_container()) {
                let handlers = unit.exception_handlers();
                scopes.push(ExceptionScope {
                    path: prefix,
                    handlers,
                });
            }
        }
        scopes
    }

    pub fn node_count(&self) -> usize {
        fn count(units: &[ExecutableUnit]) -> usize {
            units.iter().map(|u| 1 + count(&u.children)).sum()
        }
        count(&self.nodes)
    }
}

#[derive(Debug, Clone)]
pub struct Compiler {
    registry: Arc<NodeBuilderRegistry>,
    options: CompilerOptions,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(Arc::new(NodeBuilderRegistry::standard()))
    }
}

impl Compiler {
    pub fn new(registry: Arc<NodeBuilderRegistry>) -> Self {
        Self {
            registry,
            options: CompilerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &NodeBuilderRegistry {
        &self.registry
    }

    /// Compiles one node, and its children when it is a container, against
    /// the scope it is declared in.
    pub fn compile(
        &self,
        node: &NodeDescriptor,
        scope: &Scope<'_>,
    ) -> Result<ExecutableUnit, CompileError> {
        let builder = self.registry.resolve(node)?;
        let mut out = UnitBuilder::default();
        emit_identity(node, builder, &mut out);

        let children = match node.container() {
            None => {
                let ctx = BuildContext {
                    scope,
                    options: &self.options,
                };
                builder.visit_custom_fields(node, &ctx, &mut out)?;
                Vec::new()
            }
            Some(container) => {
                let local = scope.child(container.variables);
                let ctx = BuildContext {
                    scope: &local,
                    options: &self.options,
                };
                builder.visit_custom_fields(node, &ctx, &mut out)?;
                self.compile_container(node, container, &local, &mut out)?
            }
        };

        let ops = out.into_ops();
        debug!(
            node_id = node.id,
            node_type = %node.node_type(),
            ops = ops.len(),
            children = children.len(),
            "compiled node"
        );
        Ok(ExecutableUnit {
            node_id: node.id,
            node_type: node.node_type(),
            ops,
            children,
        })
    }

    fn compile_container(
        &self,
        node: &NodeDescriptor,
        container: Container<'_>,
        scope: &Scope<'_>,
        out: &mut UnitBuilder,
    ) -> Result<Vec<ExecutableUnit>, CompileError> {
        out.extend(container.variables.iter().cloned().map(Op::DeclareVariable));

        let mut children = Vec::with_capacity(container.nodes.len());
        for (index, child) in container.nodes.iter().enumerate() {
            children.push(self.compile(child, scope)?);
            out.push(Op::LinkChild {
                index,
                node_id: child.id,
            });
        }

        out.extend(container.connections.iter().map(|c| Op::Connect {
            from: c.from,
            to: c.to,
        }));

        for h in container.exception_handlers {
            if !container.nodes.iter().any(|n| n.id == h.handler) {
                return Err(CompileError::Configuration {
                    node_id: node.id,
                    message: format!("exception handler node {} is not a child", h.handler),
                });
            }
            out.push(Op::AddExceptionHandler(HandlerDeclaration::from_spec(h)));
        }
        Ok(children)
    }

    /// Validates and compiles a whole definition.
    pub fn compile_process(&self, def: &ProcessDefinition) -> Result<CompiledProcess, CompileError> {
        validate_definition(def)?;

        let scope = Scope::from_declarations(&def.variables);
        let nodes = def
            .nodes
            .iter()
            .map(|n| self.compile(n, &scope))
            .collect::<Result<Vec<_>, _>>()?;

        let process = CompiledProcess {
            id: def.id.clone(),
            name: def.name.clone(),
            version: def.version.clone(),
            variables: def.variables.clone(),
            nodes,
            connections: def.connections.clone(),
            exception_handlers: def
                .exception_handlers
                .iter()
                .map(HandlerDeclaration::from_spec)
                .collect(),
        };
        info!(
            process_id = %process.id,
            nodes = process.node_count(),
            "compiled process"
        );
        Ok(process)
    }
}

fn emit_identity(node: &NodeDescriptor, builder: &dyn NodeBuilder, out: &mut UnitBuilder) {
    out.push(Op::SetId(node.id));
    let name = match non_blank(node.name.as_deref()) {
        Some(n) => n.to_string(),
        None => builder.default_name(node),
    };
    out.push(Op::SetName(name));
    out.extend(node.metadata.iter().map(|(key, value)| Op::SetMetaData {
        key: key.clone(),
        value: value.clone(),
    }));
}
