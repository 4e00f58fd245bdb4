//! The `simple` expression language used by conditions, split constraints,
//! timer expressions and event transformations.
//!
//! Expressions are parsed and checked against a [`Scope`] when a definition is
//! compiled; evaluation at run time only reads variables.

mod ast;
mod eval;
mod lexer;
mod parser;

use std::collections::BTreeSet;

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::scope::Scope;

pub use ast::{BinaryOp, Expr, Function, UnaryOp};
pub use eval::{json_eq, Binding, Bindings};
pub use parser::parse_expr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("expression is empty")]
    Empty,
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),
    #[error("invalid number literal: {0}")]
    InvalidNumber(String),
    #[error("unexpected token {found} at offset {pos}")]
    UnexpectedToken { found: String, pos: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("function {name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid regex: {0}")]
    InvalidRegex(String),
    #[error("unsupported expression language: {0}")]
    UnsupportedLanguage(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("condition must evaluate to a boolean, got {0}")]
    NotBoolean(String),
    #[error("invalid regex: {0}")]
    InvalidRegex(String),
    #[error("expression in language '{0}' has no native evaluator")]
    NotNative(String),
}

/// Expression language tag as written on a node attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Simple,
    Other(String),
}

impl Language {
    pub const SIMPLE: &'static str = "simple";

    /// Blank means the built-in language; `mvel` and `java` are accepted aliases
    /// since most definitions in the wild tag plain conditions with them.
    pub fn parse(tag: Option<&str>) -> Language {
        match crate::types::non_blank(tag) {
            None => Language::Simple,
            Some(t) if t.eq_ignore_ascii_case(Self::SIMPLE) => Language::Simple,
            Some(t) if t.eq_ignore_ascii_case("mvel") || t.eq_ignore_ascii_case("java") => {
                Language::Simple
            }
            Some(t) => Language::Other(t.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Language::Simple => Self::SIMPLE,
            Language::Other(s) => s,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Program {
    Native(Expr),
    /// Text handed verbatim to an external evaluator.
    External,
}

/// Expression compiled against a scope. Structural equality compares the
/// language, source text and parsed program.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    language: Language,
    source: String,
    program: Program,
}

/// Parses `source` in `language` and checks that every variable it reads is
/// visible from `scope`. Only the built-in language can be compiled here.
pub fn compile_expression(
    language: &Language,
    source: &str,
    scope: &Scope<'_>,
) -> Result<CompiledExpr, ExprError> {
    if let Language::Other(tag) = language {
        return Err(ExprError::UnsupportedLanguage(tag.clone()));
    }
    let source = source.trim();
    let expr = parse_expr(source)?;
    for name in expr.variables() {
        if !scope.contains(&name) {
            return Err(ExprError::UnknownVariable(name));
        }
    }
    check_regex_literals(&expr)?;
    Ok(CompiledExpr {
        language: Language::Simple,
        source: source.to_string(),
        program: Program::Native(expr),
    })
}

fn check_regex_literals(expr: &Expr) -> Result<(), ExprError> {
    match expr {
        Expr::Call(Function::Matches, args) => {
            if let Some(Expr::Literal(JsonValue::String(p))) = args.get(1) {
                Regex::new(p).map_err(|e| ExprError::InvalidRegex(e.to_string()))?;
            }
            args.iter().try_for_each(check_regex_literals)
        }
        Expr::Call(_, args) => args.iter().try_for_each(check_regex_literals),
        Expr::Member(b, _) | Expr::Unary(_, b) => check_regex_literals(b),
        Expr::Index(a, b) | Expr::Binary(_, a, b) => {
            check_regex_literals(a)?;
            check_regex_literals(b)
        }
        Expr::Literal(_) | Expr::Var(_) => Ok(()),
    }
}

impl CompiledExpr {
    /// Wraps text in a language this crate cannot evaluate; an external
    /// transformer receives it as-is.
    pub fn external(language: impl Into<String>, source: impl Into<String>) -> Self {
        let language = language.into();
        Self {
            language: Language::Other(language),
            source: source.into().trim().to_string(),
            program: Program::External,
        }
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_native(&self) -> bool {
        matches!(self.program, Program::Native(_))
    }

    pub fn ast(&self) -> Option<&Expr> {
        match &self.program {
            Program::Native(e) => Some(e),
            Program::External => None,
        }
    }

    pub fn variables(&self) -> BTreeSet<String> {
        self.ast().map(Expr::variables).unwrap_or_default()
    }

    pub fn evaluate(&self, vars: &dyn Bindings) -> Result<JsonValue, EvalError> {
        match &self.program {
            Program::Native(e) => eval::eval(e, vars),
            Program::External => Err(EvalError::NotNative(self.language.to_string())),
        }
    }

    /// Evaluates the expression as a predicate.
    pub fn test(&self, vars: &dyn Bindings) -> Result<bool, EvalError> {
        match self.evaluate(vars)? {
            JsonValue::Bool(b) => Ok(b),
            other => Err(EvalError::NotBoolean(eval::type_name(&other).to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VariableDeclaration, VariableType};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn scope() -> Scope<'static> {
        Scope::from_declarations(&[
            VariableDeclaration::new("count", VariableType::Integer),
            VariableDeclaration::new("order", VariableType::Object),
            VariableDeclaration::new("name", VariableType::String),
            VariableDeclaration::new("tags", VariableType::List),
        ])
    }

    fn vars(v: JsonValue) -> BTreeMap<String, JsonValue> {
        serde_json::from_value(v).unwrap()
    }

    fn compile(src: &str) -> CompiledExpr {
        compile_expression(&Language::Simple, src, &scope()).unwrap()
    }

    #[test]
    fn comparison_against_variables() {
        let e = compile("count < 3");
        assert!(e.test(&vars(json!({"count": 0}))).unwrap());
        assert!(!e.test(&vars(json!({"count": 3}))).unwrap());
    }

    #[test]
    fn nested_member_access_and_arithmetic() {
        let e = compile("order.total * 2 >= 100 && size(order.lines) > 0");
        let v = vars(json!({"order": {"total": 50, "lines": [1]}}));
        assert!(e.test(&v).unwrap());
    }

    #[test]
    fn string_concatenation_and_functions() {
        let e = compile("'hello ' + name");
        assert_eq!(e.evaluate(&vars(json!({"name": "bob"}))).unwrap(), json!("hello bob"));

        let e = compile("contains(tags, 'vip') && startsWith(name, 'b') && matches(name, '^b.b$')");
        assert!(e.test(&vars(json!({"name": "bob", "tags": ["vip"]}))).unwrap());
    }

    #[test]
    fn unset_variables_read_as_null() {
        let e = compile("order == null && isEmpty(tags)");
        assert!(e.test(&vars(json!({}))).unwrap());
    }

    #[test]
    fn unknown_variable_fails_compilation() {
        let err = compile_expression(&Language::Simple, "missing > 1", &scope()).unwrap_err();
        assert_eq!(err, ExprError::UnknownVariable("missing".to_string()));
    }

    #[test]
    fn invalid_regex_literal_fails_compilation() {
        let err = compile_expression(&Language::Simple, "matches(name, '(')", &scope()).unwrap_err();
        assert!(matches!(err, ExprError::InvalidRegex(_)));
    }

    #[test]
    fn foreign_languages_are_not_compiled() {
        let err = compile_expression(&Language::parse(Some("drl")), "x", &scope()).unwrap_err();
        assert_eq!(err, ExprError::UnsupportedLanguage("drl".to_string()));
        assert_eq!(Language::parse(Some("  ")), Language::Simple);
        assert_eq!(Language::parse(Some("MVEL")), Language::Simple);
    }

    #[test]
    fn predicate_must_be_boolean() {
        let e = compile("count + 1");
        assert_eq!(
            e.test(&vars(json!({"count": 1}))),
            Err(EvalError::NotBoolean("number".to_string()))
        );
    }

    #[test]
    fn type_errors_surface_at_evaluation() {
        let e = compile("count < 3");
        assert!(matches!(
            e.test(&vars(json!({"count": "x"}))),
            Err(EvalError::TypeMismatch(_))
        ));
        let e = compile("count / 0 == 1");
        assert_eq!(e.test(&vars(json!({"count": 4}))), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn single_binding_exposes_only_its_name() {
        let event = json!({"id": 7});
        let b = Binding {
            name: "event",
            value: &event,
        };
        let mut s = Scope::root();
        s.declare("event", VariableType::Any);
        let e = compile_expression(&Language::Simple, "event.id + 1", &s).unwrap();
        assert_eq!(e.evaluate(&b).unwrap(), json!(8));
    }

    #[test]
    fn external_expressions_do_not_evaluate_natively() {
        let e = CompiledExpr::external("jq", ".id");
        assert!(!e.is_native());
        assert_eq!(
            e.evaluate(&BTreeMap::<String, JsonValue>::new()),
            Err(EvalError::NotNative("jq".to_string()))
        );
    }
}
