//! Function-graph behavior: closure capture, singleton sharing, dynamic
//! call expansion and per-iteration vertex independence.

mod common;

use common::{resource_ids, session_of, B};
use pretty_assertions::assert_eq;
use rill::{ast::Stmt, Value};

/// A closure reads the `x` captured at its definition site, not the one
/// at its use site.
#[test]
fn closure_captures_definition_site_scope() {
    let mut b = B::new();
    // class k() { $x = "captured"; $f = func() { $x } }
    let inner_val = b.s("captured");
    let bind_x = b.bind("x", inner_val);
    let body_x = b.var("x");
    let lambda = b.lambda(&[], body_x);
    let bind_f = b.bind("f", lambda);
    let class = b.class("k", &[], vec![bind_x, bind_f]);
    // Outer scope redefines $x and calls $z.f().
    let inc = b.include_as("k", vec![], Some("z"));
    let outer_val = b.s("outer");
    let bind_outer = b.bind("x", outer_val);
    let call = b.var_call("z.f", vec![]);
    let res = b.res("test", call, vec![]);
    let program = b.program(vec![class, inc, bind_outer, res]);

    let session = session_of(b, program);
    let og = session.output().expect("output");
    assert_eq!(resource_ids(&og), vec!["test/captured".to_owned()]);
}

/// A singleton-wrapped binding materialises exactly one vertex no matter
/// how many use sites reference it.
#[test]
fn singleton_binding_shares_one_vertex() {
    let mut b = B::new();
    let val = b.s("shared");
    let bind = b.bind("x", val);
    let n1 = b.s("t1");
    let x1 = b.var("x");
    let r1 = b.res("test", n1, vec![("stringptr", x1)]);
    let n2 = b.s("t2");
    let x2 = b.var("x");
    let r2 = b.res("test", n2, vec![("stringptr", x2)]);
    let program = b.program(vec![bind, r1, r2]);

    let session = session_of(b, program);
    let v1 = session.vertex_of(x1).expect("vertex for first use");
    let v2 = session.vertex_of(x2).expect("vertex for second use");
    assert_eq!(v1, v2, "both uses must delegate to the singleton's vertex");
}

/// A call through a runtime-selected closure expands transactionally and
/// re-expands when the closure value changes.
#[test]
fn dynamic_call_re_expands_on_closure_change() {
    let mut b = B::new();
    let cond = b.b(true);
    let bind_c = b.bind("c", cond);
    // $f = if $c { func($a) { $a + 1 } } else { func($a) { $a * 2 } }
    let a1 = b.var("a");
    let one = b.i(1);
    let plus = b.call("+", vec![a1, one]);
    let inc_fn = b.lambda(&["a"], plus);
    let a2 = b.var("a");
    let two = b.i(2);
    let times = b.call("*", vec![a2, two]);
    let dbl_fn = b.lambda(&["a"], times);
    let c = b.var("c");
    let chosen = b.if_expr(c, inc_fn, dbl_fn);
    let bind_f = b.bind("f", chosen);
    let five = b.i(5);
    let call = b.var_call("f", vec![five]);
    let n = b.s("t1");
    let res = b.res("test", n, vec![("int64ptr", call)]);
    let program = b.program(vec![bind_c, bind_f, res]);

    let mut session = session_of(b, program);
    assert_eq!(session.value_of(call), Some(&Value::Int(6)));

    let cond_vertex = session.vertex_of(cond).expect("condition vertex");
    session.set_input(cond_vertex, Value::Bool(false));
    session.tick().expect("tick after closure change");
    assert_eq!(session.value_of(call), Some(&Value::Int(10)));
}

/// Each loop iteration gets its own vertices; changing the list only
/// rebuilds the affected iteration.
#[test]
fn iterations_have_independent_vertices() {
    let mut b = B::new();
    let a = b.s("a");
    let bb = b.s("b");
    let list = b.list(vec![a, bb]);
    let v = b.var("v");
    let bang = b.s("!");
    let concat = b.call("+", vec![v, bang]);
    let bind_w = b.bind("w", concat);
    let w = b.var("w");
    let res = b.res("test", w, vec![]);
    let for_stmt = b.for_stmt("i", "v", list, vec![bind_w, res]);
    let program = b.program(vec![for_stmt]);

    let session = session_of(b, program);
    let og = session.output().expect("output");
    assert_eq!(resource_ids(&og), vec!["test/a!".to_owned(), "test/b!".to_owned()]);

    // The per-iteration copies materialised distinct name vertices.
    let bodies = session.iteration_bodies(for_stmt);
    assert_eq!(bodies.len(), 2);
    let name_vertex = |body| {
        let Stmt::Program(prog) = session.arena().stmt(body) else {
            panic!("iteration body is not a program");
        };
        let res_stmt = prog
            .body
            .iter()
            .find_map(|s| match session.arena().stmt(*s) {
                Stmt::Res(r) => Some(r.name),
                _ => None,
            })
            .expect("iteration body holds a resource");
        session.vertex_of(res_stmt).expect("name vertex")
    };
    assert_ne!(name_vertex(bodies[0]), name_vertex(bodies[1]));
}

/// Both branches of a statement-level if materialise; the condition picks
/// the branch at output time and can flip between ticks.
#[test]
fn statement_if_selects_at_output_time() {
    let mut b = B::new();
    let cond = b.b(true);
    let bind_c = b.bind("c", cond);
    let then_name = b.s("then");
    let then_res = b.res("test", then_name, vec![]);
    let else_name = b.s("else");
    let else_res = b.res("test", else_name, vec![]);
    let c = b.var("c");
    let if_stmt = b.if_stmt(c, vec![then_res], Some(vec![else_res]));
    let program = b.program(vec![bind_c, if_stmt]);

    let mut session = session_of(b, program);
    let og = session.output().expect("output");
    assert_eq!(resource_ids(&og), vec!["test/then".to_owned()]);

    // Both branches were built eagerly.
    assert!(session.vertex_of(then_name).is_some());
    assert!(session.vertex_of(else_name).is_some());

    let cond_vertex = session.vertex_of(cond).expect("condition vertex");
    session.set_input(cond_vertex, Value::Bool(false));
    session.tick().expect("tick after condition change");
    let og = session.output().expect("output after flip");
    assert_eq!(resource_ids(&og), vec!["test/else".to_owned()]);
}
