//! Event payload transformation.
//!
//! An event node may carry a transformation: an expression with the payload
//! bound to a source name. Built-in expressions are evaluated natively; other
//! languages go to a [`Transformer`] registered for them.

use std::collections::HashMap;
use std::sync::Arc;

use procflow_core::expr::{compile_expression, Binding, CompiledExpr, EvalError, ExprError, Language};
use procflow_core::types::{non_blank, TransformationSpec, VariableType};
use procflow_core::Scope;
use serde_json::Value as JsonValue;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("transformer '{language}' failed: {message}")]
    Failed { language: String, message: String },
}

/// Evaluates transformation expressions of one language.
pub trait Transformer: Send + Sync {
    fn transform(
        &self,
        expression: &CompiledExpr,
        source_name: &str,
        event: &JsonValue,
    ) -> Result<JsonValue, TransformError>;
}

/// Native evaluator for the built-in expression language.
pub struct SimpleTransformer;

impl Transformer for SimpleTransformer {
    fn transform(
        &self,
        expression: &CompiledExpr,
        source_name: &str,
        event: &JsonValue,
    ) -> Result<JsonValue, TransformError> {
        let binding = Binding {
            name: source_name,
            value: event,
        };
        Ok(expression.evaluate(&binding)?)
    }
}

/// Transformers keyed by language tag.
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    by_language: HashMap<String, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut r = Self::empty();
        r.register(Language::SIMPLE, Arc::new(SimpleTransformer));
        r
    }

    pub fn register(&mut self, language: impl Into<String>, transformer: Arc<dyn Transformer>) {
        self.by_language.insert(language.into(), transformer);
    }

    pub fn get(&self, language: &Language) -> Option<&Arc<dyn Transformer>> {
        self.by_language.get(language.as_str())
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.by_language.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }
}

/// Compiled transformation attached to an event node.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTransformation {
    source_name: String,
    expression: CompiledExpr,
}

impl EventTransformation {
    /// Compiles the expression with only the source name in scope. Text in a
    /// foreign language is kept as-is for an external transformer.
    pub fn compile(spec: &TransformationSpec, default_source: &str) -> Result<Self, ExprError> {
        let source_name = non_blank(spec.source.as_deref())
            .unwrap_or(default_source)
            .to_string();
        let expression = match Language::parse(spec.language.as_deref()) {
            Language::Simple => {
                let mut scope = Scope::root();
                scope.declare(source_name.clone(), VariableType::Any);
                compile_expression(&Language::Simple, &spec.expression, &scope)?
            }
            Language::Other(tag) => CompiledExpr::external(tag, spec.expression.as_str()),
        };
        Ok(Self {
            source_name,
            expression,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn expression(&self) -> &CompiledExpr {
        &self.expression
    }

    pub fn language(&self) -> &Language {
        self.expression.language()
    }
}

/// Applies an optional transformation to incoming event payloads.
pub struct EventTransformer<'a> {
    transformation: Option<&'a EventTransformation>,
    registry: &'a TransformerRegistry,
}

impl<'a> EventTransformer<'a> {
    pub fn new(
        transformation: Option<&'a EventTransformation>,
        registry: &'a TransformerRegistry,
    ) -> Self {
        Self {
            transformation,
            registry,
        }
    }

    /// Without a transformation, or without a transformer for its language,
    /// the payload is returned unchanged, `null` included.
    pub fn transform(&self, event: JsonValue) -> Result<JsonValue, TransformError> {
        let Some(t) = self.transformation else {
            return Ok(event);
        };
        let Some(transformer) = self.registry.get(t.language()) else {
            debug!(language = %t.language(), "no transformer registered, event passed through");
            return Ok(event);
        };
        debug!(language = %t.language(), source = t.source_name(), "transforming event");
        transformer.transform(&t.expression, &t.source_name, &event)
    }
}
