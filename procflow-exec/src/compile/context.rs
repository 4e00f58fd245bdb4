use procflow_core::expr::{compile_expression, CompiledExpr, Language};
use procflow_core::types::NodeId;
use procflow_core::Scope;

use crate::compile::CompilerOptions;
use crate::error::CompileError;

/// What a node builder may consult: the variable scope the node sits in
/// (for containers, the scope they open) and compiler options.
pub struct BuildContext<'a> {
    pub scope: &'a Scope<'a>,
    pub options: &'a CompilerOptions,
}

impl BuildContext<'_> {
    /// Compiles an expression attribute, reporting failures against `node_id`.
    pub fn expression(
        &self,
        node_id: NodeId,
        attribute: impl Into<String>,
        language: Option<&str>,
        text: &str,
    ) -> Result<CompiledExpr, CompileError> {
        compile_expression(&Language::parse(language), text, self.scope)
            .map_err(|e| CompileError::expression(node_id, attribute, e))
    }

    /// Fails unless `variable` is visible from the node's scope.
    pub fn require_variable(
        &self,
        node_id: NodeId,
        attribute: &str,
        variable: &str,
    ) -> Result<(), CompileError> {
        if self.scope.contains(variable) {
            Ok(())
        } else {
            Err(CompileError::Configuration {
                node_id,
                message: format!("{attribute} refers to undeclared variable '{variable}'"),
            })
        }
    }
}
