use std::path::Path;

use crate::error::ParseError;
use crate::types::ProcessDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Yaml,
    Auto,
}

#[derive(Debug, Clone)]
pub struct ParsedDefinition {
    pub definition: ProcessDefinition,
    pub format: DefinitionFormat,
}

pub fn parse_definition_str(
    input: &str,
    format: DefinitionFormat,
) -> Result<ParsedDefinition, ParseError> {
    match format {
        DefinitionFormat::Json => Ok(ParsedDefinition {
            definition: serde_json::from_str::<ProcessDefinition>(input)?,
            format,
        }),
        DefinitionFormat::Yaml => Ok(ParsedDefinition {
            definition: serde_yaml::from_str::<ProcessDefinition>(input)?,
            format,
        }),
        DefinitionFormat::Auto => parse_definition_auto(input),
    }
}

/// Reads a definition file; `.json`, `.yaml` and `.yml` pick the format, anything
/// else is auto-detected.
pub fn load_definition(path: impl AsRef<Path>) -> Result<ParsedDefinition, ParseError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => DefinitionFormat::Json,
        Some("yaml") | Some("yml") => DefinitionFormat::Yaml,
        _ => DefinitionFormat::Auto,
    };
    parse_definition_str(&content, format)
}

fn parse_definition_auto(input: &str) -> Result<ParsedDefinition, ParseError> {
    // JSON always starts with `{` after trimming.
    if input.trim_start().starts_with('{') {
        return match serde_json::from_str::<ProcessDefinition>(input) {
            Ok(definition) => Ok(ParsedDefinition {
                definition,
                format: DefinitionFormat::Json,
            }),
            Err(e) => match serde_yaml::from_str::<ProcessDefinition>(input) {
                Ok(definition) => Ok(ParsedDefinition {
                    definition,
                    format: DefinitionFormat::Yaml,
                }),
                Err(_) => Err(ParseError::Json(e)),
            },
        };
    }

    match serde_yaml::from_str::<ProcessDefinition>(input) {
        Ok(definition) => Ok(ParsedDefinition {
            definition,
            format: DefinitionFormat::Yaml,
        }),
        Err(e) => Err(ParseError::Yaml(e)),
    }
}
