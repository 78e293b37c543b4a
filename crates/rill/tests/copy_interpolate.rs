//! Copy fidelity and interpolation behavior at the AST level.

mod common;

use common::B;
use pretty_assertions::assert_eq;
use rill::{
    ast::{CopyMap, Expr, Stmt},
    LangError,
};

/// A subtree with no dynamic descendant copies to the identical node.
#[test]
fn constant_subtree_copies_to_itself() {
    let mut b = B::new();
    let one = b.i(1);
    let two = b.i(2);
    let list = b.list(vec![one, two]);
    let mut map = CopyMap::default();
    let copied = b.arena.copy_expr(list, &mut map);
    assert_eq!(copied, list);
    assert!(map.exprs.is_empty());
}

/// A subtree containing an unresolved variable is dynamic: the copy gets
/// fresh nodes, structurally equal to the original.
#[test]
fn dynamic_subtree_copies_fresh_but_equal() {
    let mut b = B::new();
    let v = b.var("x");
    let lit = b.s("suffix");
    let call = b.call("+", vec![v, lit]);
    let mut map = CopyMap::default();
    let copied = b.arena.copy_expr(call, &mut map);
    assert_ne!(copied, call);
    assert_eq!(b.arena.expr_string(copied), b.arena.expr_string(call));
    // The constant fragment is shared, the dynamic part is not.
    assert!(map.exprs.contains_key(&v));
    assert!(!map.exprs.contains_key(&lit));
}

/// Interpolation of constants is the identity, node id included.
#[test]
fn interpolate_is_identity_on_constants() {
    let mut b = B::new();
    for expr in [b.b(true), b.i(42), b.f(1.5)] {
        let out = b.arena.interpolate_expr(expr).expect("interpolate");
        assert_eq!(out, expr);
    }
    let plain = b.s("no dollars here");
    let out = b.arena.interpolate_expr(plain).expect("interpolate");
    assert_eq!(out, plain);
    assert_eq!(b.arena.expr(out), &Expr::Str("no dollars here".to_owned()));
}

/// `"t${blah}"` lowers to a call of the `+` operator over the fragments.
#[test]
fn interpolated_literal_lowers_to_concat_call() {
    let mut b = B::new();
    let lit = b.s("t${blah}");
    let out = b.arena.interpolate_expr(lit).expect("interpolate");
    assert_ne!(out, lit);
    let Expr::Call(call) = b.arena.expr(out) else {
        panic!("expected a call, got {}", b.arena.expr_string(out));
    };
    assert_eq!(call.name, "+");
    assert_eq!(call.args.len(), 2);
    assert_eq!(b.arena.expr(call.args[0]), &Expr::Str("t".to_owned()));
    assert!(matches!(b.arena.expr(call.args[1]), Expr::Var(v) if v.name == "blah"));
}

/// Malformed interpolation surfaces as an interpolation error with the
/// literal's span attached.
#[test]
fn malformed_interpolation_is_rejected() {
    let mut b = B::new();
    let lit = b.s("broken ${");
    let err = b.arena.interpolate_expr(lit).unwrap_err();
    assert!(matches!(err, LangError::Interpolation { .. }));
}

/// `class a:b { … }` moves into the body of class `a`, renamed to `b`.
#[test]
fn colon_class_lowers_into_parent_body() {
    let mut b = B::new();
    let parent = b.class("a", &[], vec![]);
    let name = b.s("n");
    let res = b.res("test", name, vec![]);
    let nested = b.class("a:b", &[], vec![res]);
    let program = b.program(vec![parent, nested]);

    b.arena.interpolate_stmt(program, true).expect("interpolate");

    let Stmt::Program(prog) = b.arena.stmt(program) else {
        panic!("not a program");
    };
    assert_eq!(prog.body, vec![parent], "nested class still at top level");
    let Stmt::Class(a) = b.arena.stmt(parent) else {
        panic!("not a class");
    };
    let Stmt::Program(a_body) = b.arena.stmt(a.body) else {
        panic!("class body is not a program");
    };
    assert_eq!(a_body.body, vec![nested]);
    let Stmt::Class(inner) = b.arena.stmt(nested) else {
        panic!("not a class");
    };
    assert_eq!(inner.name, "b");
}

/// A nested class without its parent is an error.
#[test]
fn colon_class_without_parent_is_rejected() {
    let mut b = B::new();
    let nested = b.class("a:b", &[], vec![]);
    let program = b.program(vec![nested]);
    let err = b.arena.interpolate_stmt(program, true).unwrap_err();
    assert!(matches!(err, LangError::Structural { .. }));
}
