//! Runtime values flowing along FG edges and stored in the engine's value
//! table.
//!
//! Values are plain data except for [`Value::Func`]: a first-class closure
//! value carrying the lambda body (as an arena index), the environment
//! captured when the closure vertex was evaluated, and the closure's type.
//! The captured environment is runtime-only state and is skipped during
//! serialization; a deserialized closure value is inert and only good for
//! display.

use std::fmt;

use indexmap::IndexMap;

use crate::{
    ast::ExprId,
    fg::env::Env,
    types::Type,
};

/// A runtime value.
///
/// Map entries keep insertion order and are compared pairwise; map keys are
/// values of one ground key type, so order is part of the observable value
/// just as it is for struct fields.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Bool(bool),
    Str(String),
    Int(i64),
    Float(f64),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Struct(IndexMap<String, Value>),
    Func(FuncValue),
}

/// A first-class closure value produced by evaluating a `func` expression.
///
/// Invoking the closure is a separate step: the caller's apply vertex uses
/// `body`/`env` to splice the function body into the FG inside a reversible
/// transaction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FuncValue {
    /// The lambda body, or the argument-less marker for builtin bindings.
    pub body: FuncBody,
    /// Environment captured at the closure vertex. Runtime-only.
    #[serde(skip, default)]
    pub env: Env,
    /// The (monomorphic) function type of this closure.
    pub typ: Type,
}

/// What a closure executes when applied.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FuncBody {
    /// A user-written lambda; the id points at the elaborated body expression.
    Lambda { body: ExprId, params: Vec<ExprId> },
    /// A builtin registered in the function registry, bound by name.
    Builtin { name: String },
}

impl PartialEq for FuncValue {
    /// Captured environments are identity-like runtime state; two closure
    /// values are the same closure iff they share body and type.
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body && self.typ == other.typ
    }
}

impl Value {
    /// The ground type of this value, when one is determined by the value
    /// alone. Empty lists and maps carry no element type, so they return
    /// `None` and the solver's answer is authoritative instead.
    pub fn type_of(&self) -> Option<Type> {
        match self {
            Self::Bool(_) => Some(Type::Bool),
            Self::Str(_) => Some(Type::Str),
            Self::Int(_) => Some(Type::Int),
            Self::Float(_) => Some(Type::Float),
            Self::List(items) => {
                let elem = items.first()?.type_of()?;
                Some(Type::list_of(elem))
            }
            Self::Map(pairs) => {
                let (k, v) = pairs.first()?;
                Some(Type::map_of(k.type_of()?, v.type_of()?))
            }
            Self::Struct(fields) => {
                let mut out = IndexMap::with_capacity(fields.len());
                for (name, value) in fields {
                    out.insert(name.clone(), value.type_of()?);
                }
                Some(Type::Struct(out))
            }
            Self::Func(fv) => Some(fv.typ.clone()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => {
                let mut buf = ryu::Buffer::new();
                f.write_str(buf.format(*x))
            }
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} => {v}")?;
                }
                f.write_str("}")
            }
            Self::Struct(fields) => {
                f.write_str("struct{")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Func(fv) => write!(f, "func<{}>", fv.typ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_display_uses_shortest_roundtrip_form() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(0.1).to_string(), "0.1");
    }

    #[test]
    fn type_of_infers_from_first_element() {
        let v = Value::List(vec![Value::Str("a".to_owned()), Value::Str("b".to_owned())]);
        assert_eq!(v.type_of(), Some(Type::list_of(Type::Str)));
        assert_eq!(Value::List(vec![]).type_of(), None);
    }

    #[test]
    fn closure_values_compare_by_body_and_type() {
        let typ = Type::func_of(vec![], Type::Int);
        let a = FuncValue {
            body: FuncBody::Builtin { name: "+".to_owned() },
            env: Env::default(),
            typ: typ.clone(),
        };
        let b = FuncValue {
            body: FuncBody::Builtin { name: "+".to_owned() },
            env: Env::default(),
            typ,
        };
        assert_eq!(a, b);
    }
}
