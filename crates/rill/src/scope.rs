//! Lexical scopes: three per-namespace mappings from name to definition,
//! plus the include chain used for recursion detection.
//!
//! Scope values are always expressions (or, for classes, the class
//! statement), never runtime values. Copying a scope is shallow over the
//! maps: the bindings are arena indices and the maps themselves are cheap
//! to clone, which is exactly what capture-at-definition-site needs.

use indexmap::IndexMap;

use crate::{
    ast::{ExprId, StmtId},
    errors::{LangError, LangResult, NameKind},
    span::SrcSpan,
};

/// A lexical scope.
///
/// Names imported under an alias are merged in dotted form
/// (`alias.name`), which keeps all three namespaces flat while still
/// making the alias part of the lookup key.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scope {
    pub variables: IndexMap<String, ExprId>,
    pub functions: IndexMap<String, ExprId>,
    pub classes: IndexMap<String, StmtId>,
    /// Original include statements visited on the way to this scope.
    /// An include whose original is already present is recursive.
    pub chain: Vec<StmtId>,
    /// True when this scope lies inside a for/forkv body.
    pub iterated: bool,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(&self, name: &str) -> Option<ExprId> {
        self.variables.get(name).copied()
    }

    pub fn func(&self, name: &str) -> Option<ExprId> {
        self.functions.get(name).copied()
    }

    pub fn class(&self, name: &str) -> Option<StmtId> {
        self.classes.get(name).copied()
    }

    /// Binds a variable, rejecting a name already bound in this scope's
    /// variable namespace.
    ///
    /// Duplicates within one lexical scope are errors no matter how the
    /// first binding arrived — a plain statement or a flattening import.
    /// A child scope that legitimately redefines an inherited name uses
    /// [`Scope::shadow_var`] instead.
    pub fn bind_var(&mut self, name: impl Into<String>, def: ExprId, span: SrcSpan) -> LangResult<()> {
        let name = name.into();
        if self.variables.contains_key(&name) {
            return Err(LangError::duplicate(NameKind::Variable, name, span));
        }
        self.variables.insert(name, def);
        Ok(())
    }

    /// As [`Scope::bind_var`], for the function namespace.
    pub fn bind_func(&mut self, name: impl Into<String>, def: ExprId, span: SrcSpan) -> LangResult<()> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(LangError::duplicate(NameKind::Function, name, span));
        }
        self.functions.insert(name, def);
        Ok(())
    }

    /// As [`Scope::bind_var`], for the class namespace.
    pub fn bind_class(&mut self, name: impl Into<String>, def: StmtId, span: SrcSpan) -> LangResult<()> {
        let name = name.into();
        if self.classes.contains_key(&name) {
            return Err(LangError::duplicate(NameKind::Class, name, span));
        }
        self.classes.insert(name, def);
        Ok(())
    }

    /// Introduces a variable binding that may shadow an inherited one.
    ///
    /// Only where shadowing is the intent: names entering a fresh lexical
    /// frame (loop variables, class parameters), and the working-scope
    /// side of a statement binding whose duplicate check already ran
    /// against the program's own namespace via [`Scope::bind_var`].
    pub fn shadow_var(&mut self, name: impl Into<String>, def: ExprId) {
        self.variables.insert(name.into(), def);
    }

    /// As [`Scope::shadow_var`], for the function namespace.
    pub fn shadow_func(&mut self, name: impl Into<String>, def: ExprId) {
        self.functions.insert(name.into(), def);
    }

    /// As [`Scope::shadow_var`], for the class namespace.
    pub fn shadow_class(&mut self, name: impl Into<String>, def: StmtId) {
        self.classes.insert(name.into(), def);
    }

    /// Merges another scope into this one under an optional alias prefix,
    /// rejecting collisions with names that already exist.
    ///
    /// With `alias` of `None` the other scope is flattened directly into
    /// this one (the bare-symbol import form).
    pub fn merge(&mut self, other: &Self, alias: Option<&str>, span: SrcSpan) -> LangResult<()> {
        let key = |name: &str| match alias {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.to_owned(),
        };
        for (name, def) in &other.variables {
            let k = key(name);
            if self.variables.contains_key(&k) {
                return Err(LangError::duplicate(NameKind::Variable, k, span));
            }
            self.variables.insert(k, *def);
        }
        for (name, def) in &other.functions {
            let k = key(name);
            if self.functions.contains_key(&k) {
                return Err(LangError::duplicate(NameKind::Function, k, span));
            }
            self.functions.insert(k, *def);
        }
        for (name, def) in &other.classes {
            let k = key(name);
            if self.classes.contains_key(&k) {
                return Err(LangError::duplicate(NameKind::Class, k, span));
            }
            self.classes.insert(k, *def);
        }
        Ok(())
    }
}
