//! End-to-end scenarios: parsed program in, output graph out.

mod common;

use common::{resource_ids, run, session_of, B};
use pretty_assertions::assert_eq;
use rill::{LangError, Session, Value};

/// `test "t1" { stringptr => "foo" }` produces one resource with one
/// field and no edges.
#[test]
fn basic_string_resource() {
    let mut b = B::new();
    let name = b.s("t1");
    let foo = b.s("foo");
    let res = b.res("test", name, vec![("stringptr", foo)]);
    let program = b.program(vec![res]);

    let og = run(b, program);
    assert_eq!(resource_ids(&og), vec!["test/t1".to_owned()]);
    assert_eq!(
        og.resources[0].fields.get("string_ptr"),
        Some(&Value::Str("foo".to_owned()))
    );
    assert!(og.edges.is_empty());
}

/// `test "t${blah}" {}` with `$blah = "x"`: interpolation lowers the name
/// to a concatenation call and the OG resource is named `tx`.
#[test]
fn interpolated_name_concatenates() {
    let mut b = B::new();
    let x = b.s("x");
    let bind = b.bind("blah", x);
    let name = b.s("t${blah}");
    let foo = b.s("foo");
    let res = b.res("test", name, vec![("stringptr", foo)]);
    let program = b.program(vec![bind, res]);

    let og = run(b, program);
    assert_eq!(resource_ids(&og), vec!["test/tx".to_owned()]);
}

/// `test ["a","b"] { stringptr => "foo" }` fans out into two resources
/// sharing the field.
#[test]
fn list_name_fans_out() {
    let mut b = B::new();
    let a = b.s("a");
    let bb = b.s("b");
    let name = b.list(vec![a, bb]);
    let foo = b.s("foo");
    let res = b.res("test", name, vec![("stringptr", foo)]);
    let program = b.program(vec![res]);

    let og = run(b, program);
    assert_eq!(resource_ids(&og), vec!["test/a".to_owned(), "test/b".to_owned()]);
    for res in &og.resources {
        assert_eq!(res.fields.get("string_ptr"), Some(&Value::Str("foo".to_owned())));
    }
}

/// `for $i, $v in ["a","b","c"] { test $v {} }`: three resources, and
/// removing an element keeps the other iterations' FG vertices.
#[test]
fn for_over_list_tracks_elements() {
    let mut b = B::new();
    let a = b.s("a");
    let bb = b.s("b");
    let c = b.s("c");
    let list = b.list(vec![a, bb, c]);
    let v = b.var("v");
    let res = b.res("test", v, vec![]);
    let for_stmt = b.for_stmt("i", "v", list, vec![res]);
    let program = b.program(vec![for_stmt]);

    let mut session = session_of(b, program);
    let og = session.output().expect("output");
    assert_eq!(
        resource_ids(&og),
        vec!["test/a".to_owned(), "test/b".to_owned(), "test/c".to_owned()]
    );

    let bodies_before = session.iteration_bodies(for_stmt);
    assert_eq!(bodies_before.len(), 3);

    // Remove "b" from the list: the a/c iterations keep their identity.
    let list_vertex = session.vertex_of(list).expect("list vertex");
    session.set_input(
        list_vertex,
        Value::List(vec![Value::Str("a".to_owned()), Value::Str("c".to_owned())]),
    );
    session.tick().expect("second tick");
    let og = session.output().expect("output after change");
    assert_eq!(resource_ids(&og), vec!["test/a".to_owned(), "test/c".to_owned()]);

    let bodies_after = session.iteration_bodies(for_stmt);
    assert_eq!(bodies_after.len(), 2);
    assert_eq!(bodies_after[0], bodies_before[0], "iteration `a` was rebuilt");
    assert_eq!(bodies_after[1], bodies_before[2], "iteration `c` was rebuilt");
}

/// `class c1($s) { test $s {} } include c1("x") include c1("y")`: one
/// resource per include, from separate body copies.
#[test]
fn class_with_param_instantiates_per_include() {
    let mut b = B::new();
    let s = b.var("s");
    let res = b.res("test", s, vec![]);
    let class = b.class("c1", &["s"], vec![res]);
    let x = b.s("x");
    let y = b.s("y");
    let inc1 = b.include("c1", vec![x]);
    let inc2 = b.include("c1", vec![y]);
    let program = b.program(vec![class, inc1, inc2]);

    let session = session_of(b, program);
    let og = session.output().expect("output");
    assert_eq!(resource_ids(&og), vec!["test/x".to_owned(), "test/y".to_owned()]);

    // The include sites instantiated distinct body copies.
    let body_of = |id| match session.arena().stmt(id) {
        rill::Stmt::Include(inc) => inc.body.expect("include was instantiated"),
        _ => panic!("not an include"),
    };
    assert_ne!(body_of(inc1), body_of(inc2));
}

/// `Test["a"].out -> Test["b"].in` with compatible str fields admits the
/// edge; sending `code` (int) into `in` (str) is rejected.
#[test]
fn edge_with_send_recv_checks_compatibility() {
    let mut b = B::new();
    let a = b.s("a");
    let bb = b.s("b");
    let ra = b.res("test", a, vec![]);
    let rb = b.res("test", bb, vec![]);
    let a2 = b.s("a");
    let b2 = b.s("b");
    let edge = b.edge(
        vec![("test", a2, Some("out")), ("test", b2, Some("in"))],
        false,
    );
    let program = b.program(vec![ra, rb, edge]);

    let og = run(b, program);
    assert_eq!(og.edges.len(), 1);
    let e = &og.edges[0];
    assert_eq!((e.kind1.as_str(), e.name1.as_str()), ("test", "a"));
    assert_eq!((e.kind2.as_str(), e.name2.as_str()), ("test", "b"));
    assert_eq!(e.send.as_deref(), Some("out"));
    assert_eq!(e.recv.as_deref(), Some("in"));
    assert!(!e.notify);

    // Incompatible field types are raised locally during type checking.
    let mut b = B::new();
    let a = b.s("a");
    let bb = b.s("b");
    let ra = b.res("test", a, vec![]);
    let rb = b.res("test", bb, vec![]);
    let a2 = b.s("a");
    let b2 = b.s("b");
    let edge = b.edge(
        vec![("test", a2, Some("code")), ("test", b2, Some("in"))],
        false,
    );
    let program = b.program(vec![ra, rb, edge]);
    let mut session = Session::new(b.arena, program);
    let err = session.elaborate().unwrap_err();
    assert!(matches!(err, LangError::Type { .. }), "got {err}");
}
