//! Speculative evaluation: computing an expression's value during
//! elaboration, when that is possible at all.
//!
//! Speculation may fail at any time with a [`Stall`], which is a normal
//! outcome, not an error: a parameter has no value until the engine binds
//! it, and a call through an impure builtin must not run early. Callers
//! fall back to building FG vertices and letting the engine produce the
//! value.

use crate::{
    ast::{Arena, Expr, ExprId, FuncCore},
    errors::{SpecResult, Stall},
    funcs::FuncRegistry,
    value::Value,
};

/// Attempts to evaluate an expression inside the elaborator.
pub fn speculate(arena: &Arena, funcs: &FuncRegistry, id: ExprId) -> SpecResult<Value> {
    match arena.expr(id) {
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Float(x) => Ok(Value::Float(*x)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::List(items) => items
            .iter()
            .map(|e| speculate(arena, funcs, *e))
            .collect::<SpecResult<Vec<Value>>>()
            .map(Value::List),
        Expr::Map(pairs) => pairs
            .iter()
            .map(|(k, v)| Ok((speculate(arena, funcs, *k)?, speculate(arena, funcs, *v)?)))
            .collect::<SpecResult<Vec<(Value, Value)>>>()
            .map(Value::Map),
        Expr::Struct(fields) => {
            let mut out = indexmap::IndexMap::with_capacity(fields.len());
            for f in fields {
                out.insert(f.name.clone(), speculate(arena, funcs, f.value)?);
            }
            Ok(Value::Struct(out))
        }
        Expr::Var(v) => match v.target {
            Some(target) => speculate(arena, funcs, target),
            None => Err(Stall::Unknown),
        },
        // Parameters and per-iteration keys only exist at run time.
        Expr::Param(_) | Expr::Iterated(_) => Err(Stall::Unknown),
        Expr::TopLevel(w) => speculate(arena, funcs, w.def),
        Expr::Singleton(w) => speculate(arena, funcs, w.def),
        Expr::Poly(w) => speculate(arena, funcs, w.def),
        Expr::If(e) => match speculate(arena, funcs, e.cond)? {
            Value::Bool(true) => speculate(arena, funcs, e.then_),
            Value::Bool(false) => speculate(arena, funcs, e.else_),
            _ => Err(Stall::CantSpeculate),
        },
        // A closure value needs a runtime environment.
        Expr::Func(_) => Err(Stall::CantSpeculate),
        Expr::Call(call) => {
            let Some(callee) = call.callee else {
                return Err(Stall::Unknown);
            };
            let Some(name) = builtin_name(arena, callee) else {
                return Err(Stall::CantSpeculate);
            };
            let Some(builtin) = funcs.lookup(&name) else {
                return Err(Stall::CantSpeculate);
            };
            if !builtin.info().pure {
                return Err(Stall::CantSpeculate);
            }
            let args = call
                .args
                .iter()
                .map(|a| speculate(arena, funcs, *a))
                .collect::<SpecResult<Vec<Value>>>()?;
            builtin.call(&args).map_err(|_| Stall::CantSpeculate)
        }
    }
}

/// The builtin a callee resolves to, when it statically resolves to one.
pub(crate) fn builtin_name(arena: &Arena, mut id: ExprId) -> Option<String> {
    loop {
        match arena.expr(id) {
            Expr::Func(f) => {
                return match &f.body {
                    FuncCore::Builtin(name) => Some(name.clone()),
                    FuncCore::Lambda(_) => None,
                };
            }
            Expr::TopLevel(w) => id = w.def,
            Expr::Singleton(w) => id = w.def,
            Expr::Poly(w) => id = w.def,
            Expr::Var(v) => id = v.target?,
            _ => return None,
        }
    }
}
