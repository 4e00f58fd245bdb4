#![forbid(unsafe_code)]

pub mod error;
pub mod expr;
pub mod parser;
pub mod scope;
pub mod types;
pub mod validate;

pub use crate::error::{DefinitionError, ParseError, ValidationError, Violation};
pub use crate::expr::{compile_expression, Bindings, CompiledExpr, EvalError, ExprError, Language};
pub use crate::parser::{load_definition, parse_definition_str, DefinitionFormat, ParsedDefinition};
pub use crate::scope::Scope;
pub use crate::types::{NodeDescriptor, NodeId, NodeKind, NodeType, ProcessDefinition};
pub use crate::validate::{validate_definition, Validate};
