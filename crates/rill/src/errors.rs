//! The error taxonomy observable at the core boundary.
//!
//! Every surfaced error carries the [`SrcSpan`](crate::span::SrcSpan) of the
//! offending node so hosts can decorate diagnostics with source context. The
//! speculation sentinel [`Stall`] lives here too but is deliberately *not* a
//! [`LangError`]: it marks a value that cannot be produced yet and must never
//! reach the user as a failure.

use std::{borrow::Cow, fmt};

use crate::span::SrcSpan;

/// Result alias for fallible operations in the elaboration pipeline.
pub type LangResult<T> = Result<T, LangError>;

/// Result alias for speculative evaluation. `Err` is recoverable by design.
pub type SpecResult<T> = Result<T, Stall>;

/// Which namespace a name belongs to.
///
/// Variables, functions, classes and import aliases live in separate
/// namespaces; duplicate detection and unresolved-name reporting are all
/// per-namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NameKind {
    Variable,
    Function,
    Class,
    /// An import- or include-aliased scope.
    Scope,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Variable => "variable",
            Self::Function => "function",
            Self::Class => "class",
            Self::Scope => "scope",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during elaboration or output emission.
#[derive(Debug, Clone, PartialEq)]
pub enum LangError {
    /// Structural validation failure: empty names, invalid kinds, duplicate
    /// fields or meta properties, statements where they may not appear.
    Structural { msg: Cow<'static, str>, span: SrcSpan },
    /// Malformed `${…}` interpolation syntax inside a string literal.
    Interpolation { msg: Cow<'static, str>, span: SrcSpan },
    /// A name did not resolve in its namespace.
    Unresolved {
        kind: NameKind,
        name: String,
        span: SrcSpan,
    },
    /// Two definitions of the same name in the same lexical namespace.
    Duplicate {
        kind: NameKind,
        name: String,
        span: SrcSpan,
    },
    /// A class (transitively) includes itself.
    RecursiveClass { name: String, span: SrcSpan },
    /// The module import graph is not a DAG.
    RecursiveImport { name: String, span: SrcSpan },
    /// The ordering graph of a program is not a DAG.
    RecursiveReference { msg: Cow<'static, str>, span: SrcSpan },
    /// Import resolution failure (unknown system module, unreadable file,
    /// missing module directory, disabled bare import, …).
    Import { msg: Cow<'static, str>, span: SrcSpan },
    /// Locally raised type error: send/recv field incompatibility, resource
    /// field type mismatch, unknown meta property.
    Type { msg: Cow<'static, str>, span: SrcSpan },
    /// Unification failure reported by the solver, already rendered against
    /// the minimal conflicting invariant.
    Unification { msg: Cow<'static, str>, span: SrcSpan },
    /// Environment lookup miss during FG construction. These indicate a bug
    /// in the elaborator rather than in user input.
    Graph { msg: Cow<'static, str>, span: SrcSpan },
    /// Output emission failure: missing FG vertex, missing value in the
    /// table, unknown resource kind, unhandled resource-name value shape.
    Output { msg: Cow<'static, str>, span: SrcSpan },
}

impl LangError {
    pub(crate) fn structural(msg: impl Into<Cow<'static, str>>, span: SrcSpan) -> Self {
        Self::Structural { msg: msg.into(), span }
    }

    pub(crate) fn interpolation(msg: impl Into<Cow<'static, str>>, span: SrcSpan) -> Self {
        Self::Interpolation { msg: msg.into(), span }
    }

    pub(crate) fn unresolved(kind: NameKind, name: impl Into<String>, span: SrcSpan) -> Self {
        Self::Unresolved {
            kind,
            name: name.into(),
            span,
        }
    }

    pub(crate) fn duplicate(kind: NameKind, name: impl Into<String>, span: SrcSpan) -> Self {
        Self::Duplicate {
            kind,
            name: name.into(),
            span,
        }
    }

    pub(crate) fn import(msg: impl Into<Cow<'static, str>>, span: SrcSpan) -> Self {
        Self::Import { msg: msg.into(), span }
    }

    pub(crate) fn recursive_reference(msg: impl Into<Cow<'static, str>>, span: SrcSpan) -> Self {
        Self::RecursiveReference { msg: msg.into(), span }
    }

    pub(crate) fn type_error(msg: impl Into<Cow<'static, str>>, span: SrcSpan) -> Self {
        Self::Type { msg: msg.into(), span }
    }

    pub(crate) fn unification(msg: impl Into<Cow<'static, str>>, span: SrcSpan) -> Self {
        Self::Unification { msg: msg.into(), span }
    }

    pub(crate) fn graph(msg: impl Into<Cow<'static, str>>, span: SrcSpan) -> Self {
        Self::Graph { msg: msg.into(), span }
    }

    pub(crate) fn output(msg: impl Into<Cow<'static, str>>, span: SrcSpan) -> Self {
        Self::Output { msg: msg.into(), span }
    }

    /// The span of the offending node.
    pub fn span(&self) -> SrcSpan {
        match self {
            Self::Structural { span, .. }
            | Self::Interpolation { span, .. }
            | Self::Unresolved { span, .. }
            | Self::Duplicate { span, .. }
            | Self::RecursiveClass { span, .. }
            | Self::RecursiveImport { span, .. }
            | Self::RecursiveReference { span, .. }
            | Self::Import { span, .. }
            | Self::Type { span, .. }
            | Self::Unification { span, .. }
            | Self::Graph { span, .. }
            | Self::Output { span, .. } => *span,
        }
    }
}

impl fmt::Display for LangError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural { msg, .. } => write!(f, "invalid structure: {msg}"),
            Self::Interpolation { msg, .. } => write!(f, "bad interpolation: {msg}"),
            Self::Unresolved { kind, name, .. } => write!(f, "unresolved {kind}: `{name}`"),
            Self::Duplicate { kind, name, .. } => write!(f, "duplicate {kind}: `{name}`"),
            Self::RecursiveClass { name, .. } => write!(f, "recursive class: `{name}`"),
            Self::RecursiveImport { name, .. } => write!(f, "recursive import: `{name}`"),
            Self::RecursiveReference { msg, .. } => write!(f, "recursive reference: {msg}"),
            Self::Import { msg, .. } => write!(f, "import error: {msg}"),
            Self::Type { msg, .. } => write!(f, "type error: {msg}"),
            Self::Unification { msg, .. } => write!(f, "could not unify: {msg}"),
            Self::Graph { msg, .. } => write!(f, "graph error: {msg}"),
            Self::Output { msg, .. } => write!(f, "output error: {msg}"),
        }
    }
}

impl std::error::Error for LangError {}

/// Why a speculative `value()` could not produce a result.
///
/// Both variants are recoverable: the caller falls back to building FG
/// vertices and letting the engine produce the value at run time. Neither
/// variant is ever surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    /// The value depends on inputs that only exist at run time.
    Unknown,
    /// The value is a call whose closure cannot be executed inside the
    /// elaborator (impure builtin, lambda with unknown captures, …).
    CantSpeculate,
}
