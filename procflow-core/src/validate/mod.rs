mod rules;
mod validator;

use crate::error::ValidationError;
use crate::types::ProcessDefinition;
use validator::Validator;

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for ProcessDefinition {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_definition(self)
    }
}

/// Structural checks that do not need a compiler: identifiers, id uniqueness
/// per composite, connection and handler references, region shape.
pub fn validate_definition(def: &ProcessDefinition) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    v.validate_definition(def);
    v.finish()
}
