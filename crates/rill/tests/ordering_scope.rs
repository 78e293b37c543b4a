//! Ordering determinism, duplicate detection, dead-code pruning and
//! recursion detection.

mod common;

use ahash::AHashSet;
use common::{resource_ids, run, session_of, B};
use pretty_assertions::assert_eq;
use rill::{
    elaborate::set_scope, ordering::order_program, scope::Scope, ElaborationContext, LangError, Session,
};

fn out_of_order_program(b: &mut B) -> (rill::StmtId, Vec<rill::StmtId>) {
    // Use-before-define: the resource consumes $name, which consumes $base.
    let nm = b.var("name");
    let res = b.res("test", nm, vec![]);
    let base = b.var("base");
    let suffix = b.s("!");
    let concat = b.call("+", vec![base, suffix]);
    let bind_name = b.bind("name", concat);
    let v = b.s("t");
    let bind_base = b.bind("base", v);
    let body = vec![res, bind_name, bind_base];
    (b.program(body.clone()), body)
}

/// The topological sort orders producers before consumers and is
/// deterministic across runs.
#[test]
fn ordering_is_topological_and_deterministic() {
    let orders: Vec<Vec<usize>> = (0..2)
        .map(|_| {
            let mut b = B::new();
            let (program, body) = out_of_order_program(&mut b);
            let result = order_program(&b.arena, program, &AHashSet::new()).expect("orderable");
            result
                .order
                .iter()
                .map(|s| body.iter().position(|c| c == s).expect("known statement"))
                .collect()
        })
        .collect();
    assert_eq!(orders[0], orders[1]);
    // base before name before the resource.
    let pos = |i: usize| orders[0].iter().position(|x| *x == i).expect("present");
    assert!(pos(2) < pos(1));
    assert!(pos(1) < pos(0));
}

/// Statements using names defined later still elaborate and produce the
/// right output.
#[test]
fn use_before_define_elaborates() {
    let mut b = B::new();
    let (program, _) = out_of_order_program(&mut b);
    let og = run(b, program);
    assert_eq!(resource_ids(&og), vec!["test/t!".to_owned()]);
}

/// Two scope resolutions of the same program bind the same name sets.
#[test]
fn scope_resolution_is_deterministic() {
    let names: Vec<Vec<String>> = (0..2)
        .map(|_| {
            let mut b = B::new();
            let v1 = b.s("1");
            let bind1 = b.bind("x", v1);
            let v2 = b.s("2");
            let bind2 = b.bind("y", v2);
            let x = b.var("x");
            let y = b.var("y");
            let concat = b.call("+", vec![x, y]);
            let res = b.res("test", concat, vec![]);
            let program = b.program(vec![bind1, bind2, res]);
            let mut ctx = ElaborationContext::new();
            let result = set_scope(&mut b.arena, &mut ctx, program, &Scope::new()).expect("scopes");
            result.scope.variables.keys().cloned().collect()
        })
        .collect();
    assert_eq!(names[0], names[1]);
    assert_eq!(names[0], vec!["x".to_owned(), "y".to_owned()]);
}

/// Duplicate names in one namespace are rejected; the same name across
/// namespaces is fine.
#[test]
fn duplicate_bind_is_rejected() {
    let mut b = B::new();
    let v1 = b.s("1");
    let v2 = b.s("2");
    let bind1 = b.bind("x", v1);
    let bind2 = b.bind("x", v2);
    let x = b.var("x");
    let res = b.res("test", x, vec![]);
    let program = b.program(vec![bind1, bind2, res]);
    let mut session = Session::new(b.arena, program);
    let err = session.elaborate().unwrap_err();
    assert!(matches!(err, LangError::Duplicate { .. }), "got {err}");
}

#[test]
fn same_name_across_namespaces_is_fine() {
    let mut b = B::new();
    let v = b.s("n");
    let bind = b.bind("x", v);
    let class = b.class("x", &[], vec![]);
    let x = b.var("x");
    let res = b.res("test", x, vec![]);
    let program = b.program(vec![bind, class, res]);
    let og = run(b, program);
    assert_eq!(resource_ids(&og), vec!["test/n".to_owned()]);
}

/// Statements unreachable from any consumer contribute no FG vertices and
/// no output.
#[test]
fn unreachable_statements_are_pruned() {
    let mut b = B::new();
    let dead_value = b.s("dead");
    let dead = b.bind("unused", dead_value);
    let live_value = b.s("live");
    let live = b.bind("used", live_value);
    let used = b.var("used");
    let res = b.res("test", used, vec![]);
    let program = b.program(vec![dead, live, res]);

    let session = session_of(b, program);
    let og = session.output().expect("output");
    assert_eq!(resource_ids(&og), vec!["test/live".to_owned()]);
    assert!(session.arena().is_pruned(dead));
    assert!(
        session.vertex_of(dead_value).is_none(),
        "dead code must not materialise vertices"
    );
    assert!(session.vertex_of(live_value).is_some());
}

/// A variable cycle is not a DAG and fails as a recursive reference.
#[test]
fn variable_cycle_is_rejected() {
    let mut b = B::new();
    let vb = b.var("b");
    let bind_a = b.bind("a", vb);
    let va = b.var("a");
    let bind_b = b.bind("b", va);
    let a = b.var("a");
    let res = b.res("test", a, vec![]);
    let program = b.program(vec![bind_a, bind_b, res]);
    let mut session = Session::new(b.arena, program);
    let err = session.elaborate().unwrap_err();
    assert!(matches!(err, LangError::RecursiveReference { .. }), "got {err}");
}

/// A class that includes itself fails with a recursive-class error.
#[test]
fn self_including_class_is_rejected() {
    let mut b = B::new();
    let inner = b.include("c0", vec![]);
    let class = b.class("c0", &[], vec![inner]);
    let outer = b.include("c0", vec![]);
    let program = b.program(vec![class, outer]);
    let mut session = Session::new(b.arena, program);
    let err = session.elaborate().unwrap_err();
    assert!(matches!(err, LangError::RecursiveClass { .. }), "got {err}");
}

/// Imports may not appear inside loop bodies.
#[test]
fn import_inside_for_body_is_rejected() {
    let mut b = B::new();
    let import = b.import("fmt", None);
    let a = b.s("a");
    let list = b.list(vec![a]);
    let for_stmt = b.for_stmt("i", "v", list, vec![import]);
    let program = b.program(vec![for_stmt]);
    let mut session = Session::new(b.arena, program);
    let err = session.elaborate().unwrap_err();
    assert!(matches!(err, LangError::Structural { .. }), "got {err}");
}

/// An unresolved variable names the missing binding.
#[test]
fn unresolved_variable_is_reported() {
    let mut b = B::new();
    let ghost = b.var("ghost");
    let res = b.res("test", ghost, vec![]);
    let program = b.program(vec![res]);
    let mut session = Session::new(b.arena, program);
    let err = session.elaborate().unwrap_err();
    match err {
        LangError::Unresolved { name, .. } => assert_eq!(name, "ghost"),
        other => panic!("expected unresolved variable, got {other}"),
    }
}
