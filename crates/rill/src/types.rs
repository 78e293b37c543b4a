//! The type language: primitives, containers, structs, function types and
//! the unification variables that exist only during inference.
//!
//! A type is *ground* when it contains no [`Type::Unif`] variable. Ground
//! types compare structurally with [`Type::cmp`]; [`Type::unify_cmp`] is the
//! looser comparison used while inference is still running, where a variable
//! is compatible with anything.

use std::fmt;

use indexmap::IndexMap;

/// Identifier of a unification variable.
///
/// Variables are allocated from a counter owned by the
/// [`ElaborationContext`](crate::context::ElaborationContext) so that two
/// elaborations never share variable ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TypeVar(pub u32);

impl fmt::Display for TypeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// A type in the language.
///
/// Struct fields are ordered: `struct{a:int, b:str}` and
/// `struct{b:str, a:int}` are distinct types. Function argument names are
/// part of the type for display and named-argument generation but do not
/// participate in compatibility checks.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Type {
    Bool,
    Str,
    Int,
    Float,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Struct(IndexMap<String, Type>),
    Func {
        args: Vec<(String, Type)>,
        ret: Box<Type>,
    },
    /// A unification variable; only present during inference.
    Unif(TypeVar),
}

impl Type {
    /// Shorthand for `list<str>`, the other admissible resource-name type.
    pub fn list_of(elem: Type) -> Self {
        Self::List(Box::new(elem))
    }

    pub fn map_of(key: Type, val: Type) -> Self {
        Self::Map(Box::new(key), Box::new(val))
    }

    pub fn func_of(args: Vec<(String, Type)>, ret: Type) -> Self {
        Self::Func {
            args,
            ret: Box::new(ret),
        }
    }

    /// Returns true when this type contains no unification variable.
    pub fn is_ground(&self) -> bool {
        match self {
            Self::Bool | Self::Str | Self::Int | Self::Float => true,
            Self::List(t) => t.is_ground(),
            Self::Map(k, v) => k.is_ground() && v.is_ground(),
            Self::Struct(fields) => fields.values().all(Self::is_ground),
            Self::Func { args, ret } => args.iter().all(|(_, t)| t.is_ground()) && ret.is_ground(),
            Self::Unif(_) => false,
        }
    }

    /// Structural comparison of ground types.
    ///
    /// Returns false when either side contains a unification variable; a
    /// non-ground type is never equal to anything under this comparison.
    pub fn cmp(&self, other: &Self) -> bool {
        self.is_ground() && other.is_ground() && self.unify_cmp(other)
    }

    /// Compatibility comparison tolerating unification variables.
    ///
    /// A variable on either side matches anything. This does not *solve*
    /// anything; it only answers "could these two unify".
    pub fn unify_cmp(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unif(_), _) | (_, Self::Unif(_)) => true,
            (Self::Bool, Self::Bool)
            | (Self::Str, Self::Str)
            | (Self::Int, Self::Int)
            | (Self::Float, Self::Float) => true,
            (Self::List(a), Self::List(b)) => a.unify_cmp(b),
            (Self::Map(ak, av), Self::Map(bk, bv)) => ak.unify_cmp(bk) && av.unify_cmp(bv),
            (Self::Struct(a), Self::Struct(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((an, at), (bn, bt))| an == bn && at.unify_cmp(bt))
            }
            (Self::Func { args: aa, ret: ar }, Self::Func { args: ba, ret: br }) => {
                aa.len() == ba.len()
                    && aa.iter().zip(ba.iter()).all(|((_, at), (_, bt))| at.unify_cmp(bt))
                    && ar.unify_cmp(br)
            }
            _ => false,
        }
    }

    /// Collects every variable occurring in this type, in occurrence order.
    pub fn vars(&self, out: &mut Vec<TypeVar>) {
        match self {
            Self::Bool | Self::Str | Self::Int | Self::Float => {}
            Self::List(t) => t.vars(out),
            Self::Map(k, v) => {
                k.vars(out);
                v.vars(out);
            }
            Self::Struct(fields) => {
                for t in fields.values() {
                    t.vars(out);
                }
            }
            Self::Func { args, ret } => {
                for (_, t) in args {
                    t.vars(out);
                }
                ret.vars(out);
            }
            Self::Unif(v) => out.push(*v),
        }
    }

    /// Returns true when the variable occurs anywhere inside this type.
    pub fn occurs(&self, var: TypeVar) -> bool {
        match self {
            Self::Bool | Self::Str | Self::Int | Self::Float => false,
            Self::List(t) => t.occurs(var),
            Self::Map(k, v) => k.occurs(var) || v.occurs(var),
            Self::Struct(fields) => fields.values().any(|t| t.occurs(var)),
            Self::Func { args, ret } => args.iter().any(|(_, t)| t.occurs(var)) || ret.occurs(var),
            Self::Unif(v) => *v == var,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Str => f.write_str("str"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::List(t) => write!(f, "list<{t}>"),
            Self::Map(k, v) => write!(f, "map<{k},{v}>"),
            Self::Struct(fields) => {
                f.write_str("struct{")?;
                for (i, (name, t)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}:{t}")?;
                }
                f.write_str("}")
            }
            Self::Func { args, ret } => {
                f.write_str("func(")?;
                for (i, (name, t)) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if name.is_empty() {
                        write!(f, "{t}")?;
                    } else {
                        write!(f, "{name}:{t}")?;
                    }
                }
                write!(f, ") -> {ret}")
            }
            Self::Unif(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_types_compare_structurally() {
        let a = Type::map_of(Type::Str, Type::list_of(Type::Int));
        let b = Type::map_of(Type::Str, Type::list_of(Type::Int));
        assert!(a.cmp(&b));
        assert!(!a.cmp(&Type::map_of(Type::Str, Type::list_of(Type::Float))));
    }

    #[test]
    fn non_ground_types_never_cmp_equal() {
        let a = Type::list_of(Type::Unif(TypeVar(0)));
        assert!(!a.cmp(&a));
        assert!(a.unify_cmp(&Type::list_of(Type::Int)));
    }

    #[test]
    fn struct_field_order_is_significant() {
        let mut ab = IndexMap::new();
        ab.insert("a".to_owned(), Type::Int);
        ab.insert("b".to_owned(), Type::Str);
        let mut ba = IndexMap::new();
        ba.insert("b".to_owned(), Type::Str);
        ba.insert("a".to_owned(), Type::Int);
        assert!(!Type::Struct(ab).cmp(&Type::Struct(ba)));
    }

    #[test]
    fn occurs_check_finds_nested_vars() {
        let t = Type::func_of(vec![(String::new(), Type::list_of(Type::Unif(TypeVar(7))))], Type::Bool);
        assert!(t.occurs(TypeVar(7)));
        assert!(!t.occurs(TypeVar(8)));
        assert!(!t.is_ground());
    }

    #[test]
    fn display_matches_surface_syntax() {
        let t = Type::func_of(vec![("x".to_owned(), Type::Int)], Type::list_of(Type::Str));
        assert_eq!(t.to_string(), "func(x:int) -> list<str>");
    }
}
