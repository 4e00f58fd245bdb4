use std::collections::{BTreeMap, BTreeSet};

use crate::types::{VariableDeclaration, VariableType};

/// Compile-time variable scope.
///
/// Each scope owns the variables declared at its level and borrows its parent,
/// so lookups walk outward and a nested declaration shadows an outer one.
/// Scopes are created strictly in nesting order, which rules out cycles.
#[derive(Debug, Clone, Default)]
pub struct Scope<'a> {
    vars: BTreeMap<String, VariableType>,
    parent: Option<&'a Scope<'a>>,
}

impl Scope<'static> {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_declarations(decls: &[VariableDeclaration]) -> Self {
        let mut scope = Self::root();
        scope.declare_all(decls);
        scope
    }
}

impl<'a> Scope<'a> {
    /// Opens a nested scope holding `decls`.
    pub fn child<'b>(&'b self, decls: &[VariableDeclaration]) -> Scope<'b>
    where
        'a: 'b,
    {
        let mut scope = Scope {
            vars: BTreeMap::new(),
            parent: Some(self),
        };
        scope.declare_all(decls);
        scope
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: VariableType) {
        self.vars.insert(name.into(), ty);
    }

    fn declare_all(&mut self, decls: &[VariableDeclaration]) {
        for d in decls {
            self.declare(d.name.clone(), d.ty);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<VariableType> {
        let mut cur = Some(self);
        while let Some(scope) = cur {
            if let Some(ty) = scope.vars.get(name) {
                return Some(*ty);
            }
            cur = scope.parent;
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn declares_locally(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn parent(&self) -> Option<&'a Scope<'a>> {
        self.parent
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.parent;
        while let Some(scope) = cur {
            depth += 1;
            cur = scope.parent;
        }
        depth
    }

    /// Every name visible from this scope.
    pub fn visible_names(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut cur = Some(self);
        while let Some(scope) = cur {
            out.extend(scope.vars.keys().cloned());
            cur = scope.parent;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_declarations_shadow_outer_ones() {
        let root = Scope::from_declarations(&[
            VariableDeclaration::new("count", VariableType::Integer),
            VariableDeclaration::new("owner", VariableType::String),
        ]);
        let inner = root.child(&[VariableDeclaration::new("count", VariableType::Float)]);

        assert_eq!(inner.lookup("count"), Some(VariableType::Float));
        assert_eq!(inner.lookup("owner"), Some(VariableType::String));
        assert_eq!(root.lookup("count"), Some(VariableType::Integer));
        assert!(inner.declares_locally("count"));
        assert!(!inner.declares_locally("owner"));
        assert_eq!(inner.depth(), 1);
    }

    #[test]
    fn unknown_names_are_not_found() {
        let root = Scope::root();
        let inner = root.child(&[]);
        assert!(!inner.contains("missing"));
        assert!(inner.visible_names().is_empty());
    }
}
