use std::collections::BTreeMap;

use procflow_core::expr::Bindings;
use procflow_core::types::{VariableDeclaration, VariableType};
use procflow_store::Variables;
use serde_json::Value as JsonValue;

use crate::error::RuntimeError;

pub(crate) type FrameId = usize;

pub(crate) const ROOT_FRAME: FrameId = 0;

#[derive(Debug, Clone, Default)]
struct Frame {
    declared: BTreeMap<String, VariableType>,
    values: Variables,
    parent: Option<FrameId>,
}

/// Runtime variable scopes, one frame per entered container. Frames only
/// point at their parent, so a lookup walks outward to the process frame.
#[derive(Debug, Clone)]
pub(crate) struct Frames {
    frames: Vec<Frame>,
}

impl Frames {
    pub(crate) fn new(declarations: &[VariableDeclaration]) -> Self {
        let mut frames = Self { frames: Vec::new() };
        frames.open(None, declarations.iter());
        frames
    }

    pub(crate) fn push<'d>(
        &mut self,
        parent: FrameId,
        declarations: impl IntoIterator<Item = &'d VariableDeclaration>,
    ) -> FrameId {
        self.open(Some(parent), declarations)
    }

    fn open<'d>(
        &mut self,
        parent: Option<FrameId>,
        declarations: impl IntoIterator<Item = &'d VariableDeclaration>,
    ) -> FrameId {
        let mut frame = Frame {
            parent,
            ..Frame::default()
        };
        for d in declarations {
            frame.declared.insert(d.name.clone(), d.ty);
            if let Some(v) = &d.default {
                frame.values.insert(d.name.clone(), v.clone());
            }
        }
        self.frames.push(frame);
        self.frames.len() - 1
    }

    fn chain(&self, start: FrameId) -> impl Iterator<Item = (FrameId, &Frame)> + '_ {
        std::iter::successors(Some(start), move |id| self.frames[*id].parent)
            .map(move |id| (id, &self.frames[id]))
    }

    pub(crate) fn get(&self, frame: FrameId, name: &str) -> Option<&JsonValue> {
        self.chain(frame)
            .find(|(_, f)| f.declared.contains_key(name) || f.values.contains_key(name))
            .and_then(|(_, f)| f.values.get(name))
    }

    /// Writes to the nearest frame declaring `name`; undeclared names land in
    /// the process frame untyped.
    pub(crate) fn set(
        &mut self,
        frame: FrameId,
        name: &str,
        value: JsonValue,
    ) -> Result<(), RuntimeError> {
        let owner = self
            .chain(frame)
            .find(|(_, f)| f.declared.contains_key(name))
            .map(|(id, _)| id)
            .unwrap_or(ROOT_FRAME);
        let target = &mut self.frames[owner];
        if let Some(ty) = target.declared.get(name) {
            if !ty.accepts(&value) {
                return Err(RuntimeError::TypeMismatch {
                    name: name.to_string(),
                    expected: *ty,
                    found: type_label(&value).to_string(),
                });
            }
        }
        target.values.insert(name.to_string(), value);
        Ok(())
    }

    pub(crate) fn view(&self, frame: FrameId) -> FrameView<'_> {
        FrameView {
            frames: self,
            frame,
        }
    }

    pub(crate) fn root_values(&self) -> Variables {
        self.frames[ROOT_FRAME].values.clone()
    }
}

fn type_label(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_f64() => "float",
        JsonValue::Number(_) => "integer",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "object",
    }
}

/// Variables visible from one frame.
pub(crate) struct FrameView<'a> {
    frames: &'a Frames,
    frame: FrameId,
}

impl Bindings for FrameView<'_> {
    fn lookup(&self, name: &str) -> Option<JsonValue> {
        self.frames.get(self.frame, name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inner_frames_shadow_and_write_to_owner() {
        let mut frames = Frames::new(&[
            VariableDeclaration::new("count", VariableType::Integer).with_default(json!(0)),
            VariableDeclaration::new("owner", VariableType::String),
        ]);
        let decls = [VariableDeclaration::new("count", VariableType::Any)];
        let inner = frames.push(ROOT_FRAME, decls.iter());

        frames.set(inner, "count", json!("local")).unwrap();
        frames.set(inner, "owner", json!("mary")).unwrap();

        assert_eq!(frames.view(inner).lookup("count"), Some(json!("local")));
        assert_eq!(frames.view(ROOT_FRAME).lookup("count"), Some(json!(0)));
        assert_eq!(frames.view(ROOT_FRAME).lookup("owner"), Some(json!("mary")));
    }

    #[test]
    fn declared_types_are_enforced() {
        let mut frames = Frames::new(&[VariableDeclaration::new("count", VariableType::Integer)]);
        let err = frames.set(ROOT_FRAME, "count", json!(1.5)).unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { ref found, .. } if found == "float"));
        frames.set(ROOT_FRAME, "count", JsonValue::Null).unwrap();
        frames.set(ROOT_FRAME, "extra", json!([1])).unwrap();
        assert_eq!(frames.root_values().len(), 2);
    }

    #[test]
    fn declared_but_unset_reads_as_absent() {
        let frames = Frames::new(&[VariableDeclaration::new("x", VariableType::Any)]);
        assert_eq!(frames.view(ROOT_FRAME).lookup("x"), None);
    }
}
