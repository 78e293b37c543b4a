//! Unification invariants and the solver seam.
//!
//! Type checking never solves anything itself: it emits an ordered list of
//! [`Invariant`]s, hands them to a [`UnificationSolver`], and applies the
//! returned substitution. The baseline solver shipped here does structural
//! first-order unification with an occurs check; hosts with fancier solvers
//! plug in through the trait.

use std::fmt::Write as _;

use ahash::AHashMap;

use crate::{
    ast::{Arena, ExprId, Node},
    errors::{LangError, LangResult},
    types::{Type, TypeVar},
};

/// One unification invariant: `expect` and `actual` must unify.
///
/// `node` is the statement or expression that generated the invariant and
/// `expr` the expression whose solved type should be cached, which is how
/// the solver's answer finds its way back onto the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Invariant {
    pub node: Node,
    pub expr: ExprId,
    pub expect: Type,
    pub actual: Type,
}

/// A solved substitution from type variables to types.
#[derive(Debug, Default, Clone)]
pub struct Substitution {
    map: AHashMap<TypeVar, Type>,
}

impl Substitution {
    /// Applies the substitution deeply, leaving unsolved variables behind.
    pub fn apply(&self, t: &Type) -> Type {
        match t {
            Type::Bool | Type::Str | Type::Int | Type::Float => t.clone(),
            Type::List(e) => Type::List(Box::new(self.apply(e))),
            Type::Map(k, v) => Type::Map(Box::new(self.apply(k)), Box::new(self.apply(v))),
            Type::Struct(fields) => Type::Struct(
                fields
                    .iter()
                    .map(|(name, ft)| (name.clone(), self.apply(ft)))
                    .collect(),
            ),
            Type::Func { args, ret } => Type::Func {
                args: args.iter().map(|(n, at)| (n.clone(), self.apply(at))).collect(),
                ret: Box::new(self.apply(ret)),
            },
            Type::Unif(v) => match self.map.get(v) {
                Some(bound) => self.apply(bound),
                None => t.clone(),
            },
        }
    }

    fn resolve(&self, mut t: Type) -> Type {
        while let Type::Unif(v) = &t {
            match self.map.get(v) {
                Some(bound) => t = bound.clone(),
                None => break,
            }
        }
        t
    }
}

/// The solver interface: consumes the ordered invariant list, returns a
/// substitution or an error pinpointing a minimal conflicting invariant.
pub trait UnificationSolver: std::fmt::Debug {
    fn solve(&self, invariants: &[Invariant], arena: &Arena) -> LangResult<Substitution>;
}

/// The baseline solver: structural first-order unification processed in
/// invariant order, so the first conflicting invariant is the one reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleSolver;

impl UnificationSolver for SimpleSolver {
    fn solve(&self, invariants: &[Invariant], arena: &Arena) -> LangResult<Substitution> {
        let mut subst = Substitution::default();
        for inv in invariants {
            unify(&mut subst, &inv.expect, &inv.actual).map_err(|(a, b)| {
                let mut msg = String::new();
                let _ = write!(msg, "`{a}` with `{b}`");
                let _ = write!(msg, " in `{}`", arena.expr_string(inv.expr));
                LangError::unification(msg, arena.expr_span(inv.expr))
            })?;
        }
        Ok(subst)
    }
}

/// Unifies two types under the substitution, binding variables as needed.
/// On conflict returns the two irreconcilable types for the error message.
fn unify(subst: &mut Substitution, a: &Type, b: &Type) -> Result<(), (Type, Type)> {
    let a = subst.resolve(a.clone());
    let b = subst.resolve(b.clone());
    match (&a, &b) {
        (Type::Unif(va), Type::Unif(vb)) if va == vb => Ok(()),
        (Type::Unif(v), other) | (other, Type::Unif(v)) => {
            let resolved = subst.apply(other);
            if resolved.occurs(*v) {
                return Err((Type::Unif(*v), resolved));
            }
            subst.map.insert(*v, resolved);
            Ok(())
        }
        (Type::Bool, Type::Bool) | (Type::Str, Type::Str) | (Type::Int, Type::Int) | (Type::Float, Type::Float) => {
            Ok(())
        }
        (Type::List(ea), Type::List(eb)) => unify(subst, ea, eb),
        (Type::Map(ka, va), Type::Map(kb, vb)) => {
            unify(subst, ka, kb)?;
            unify(subst, va, vb)
        }
        (Type::Struct(fa), Type::Struct(fb)) => {
            if fa.len() != fb.len() {
                return Err((a.clone(), b.clone()));
            }
            for ((na, ta), (nb, tb)) in fa.iter().zip(fb.iter()) {
                if na != nb {
                    return Err((a.clone(), b.clone()));
                }
                unify(subst, ta, tb)?;
            }
            Ok(())
        }
        (Type::Func { args: aa, ret: ra }, Type::Func { args: ab, ret: rb }) => {
            if aa.len() != ab.len() {
                return Err((a.clone(), b.clone()));
            }
            for ((_, ta), (_, tb)) in aa.iter().zip(ab.iter()) {
                unify(subst, ta, tb)?;
            }
            unify(subst, ra, rb)
        }
        _ => Err((a, b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::Expr, span::SrcSpan};

    fn arena_with_expr() -> (Arena, ExprId) {
        let mut arena = Arena::new();
        let id = arena.alloc_expr(Expr::Bool(true), SrcSpan::default());
        (arena, id)
    }

    fn inv(expr: ExprId, expect: Type, actual: Type) -> Invariant {
        Invariant {
            node: Node::Expr(expr),
            expr,
            expect,
            actual,
        }
    }

    #[test]
    fn simple_variable_binding_solves() {
        let (arena, e) = arena_with_expr();
        let v = Type::Unif(TypeVar(0));
        let subst = SimpleSolver
            .solve(&[inv(e, v.clone(), Type::Int)], &arena)
            .expect("solvable");
        assert_eq!(subst.apply(&v), Type::Int);
    }

    #[test]
    fn transitive_bindings_resolve_deeply() {
        let (arena, e) = arena_with_expr();
        let a = Type::Unif(TypeVar(0));
        let b = Type::Unif(TypeVar(1));
        let subst = SimpleSolver
            .solve(
                &[
                    inv(e, a.clone(), b.clone()),
                    inv(e, b, Type::list_of(Type::Str)),
                ],
                &arena,
            )
            .expect("solvable");
        assert_eq!(subst.apply(&a), Type::list_of(Type::Str));
    }

    #[test]
    fn conflict_reports_unification_error() {
        let (arena, e) = arena_with_expr();
        let v = Type::Unif(TypeVar(0));
        let err = SimpleSolver
            .solve(&[inv(e, v.clone(), Type::Int), inv(e, v, Type::Str)], &arena)
            .unwrap_err();
        assert!(matches!(err, LangError::Unification { .. }));
    }

    #[test]
    fn occurs_check_rejects_infinite_types() {
        let (arena, e) = arena_with_expr();
        let v = Type::Unif(TypeVar(0));
        let err = SimpleSolver
            .solve(&[inv(e, v.clone(), Type::list_of(v))], &arena)
            .unwrap_err();
        assert!(matches!(err, LangError::Unification { .. }));
    }
}
