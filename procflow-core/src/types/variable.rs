use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    List,
    #[default]
    Any,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::String => "string",
            VariableType::Integer => "integer",
            VariableType::Float => "float",
            VariableType::Boolean => "boolean",
            VariableType::Object => "object",
            VariableType::List => "list",
            VariableType::Any => "any",
        }
    }

    /// Whether a runtime value may be stored in a variable of this type.
    /// `null` is accepted everywhere (unset variable).
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match (self, value) {
            (_, JsonValue::Null) | (VariableType::Any, _) => true,
            (VariableType::String, JsonValue::String(_)) => true,
            (VariableType::Integer, JsonValue::Number(n)) => n.is_i64() || n.is_u64(),
            (VariableType::Float, JsonValue::Number(_)) => true,
            (VariableType::Boolean, JsonValue::Bool(_)) => true,
            (VariableType::Object, JsonValue::Object(_)) => true,
            (VariableType::List, JsonValue::Array(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariableDeclaration {
    pub name: String,

    #[serde(default, rename = "type")]
    pub ty: VariableType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

impl VariableDeclaration {
    pub fn new(name: impl Into<String>, ty: VariableType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(mut self, value: JsonValue) -> Self {
        self.default = Some(value);
        self
    }
}
