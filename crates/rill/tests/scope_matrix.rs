//! Resolution matrix: {lambda, class include, for loop} × {variable,
//! function, class}. The loop column is the delicate one, since names
//! defined outside an iterated scope must keep one identity while names
//! bound inside it get one per iteration.

mod common;

use common::{resource_ids, run, B};
use pretty_assertions::assert_eq;

/// lambda × variable: a lambda body reads an enclosing binding.
#[test]
fn lambda_reads_enclosing_variable() {
    let mut b = B::new();
    let val = b.s("v");
    let bind = b.bind("x", val);
    let x = b.var("x");
    let lambda = b.lambda(&[], x);
    let bind_f = b.bind("f", lambda);
    let call = b.var_call("f", vec![]);
    let res = b.res("test", call, vec![]);
    let program = b.program(vec![bind, bind_f, res]);
    assert_eq!(resource_ids(&run(b, program)), vec!["test/v".to_owned()]);
}

/// lambda × function: a lambda body calls a top-level function.
#[test]
fn lambda_calls_toplevel_function() {
    let mut b = B::new();
    let p = b.var("p");
    let bang = b.s("!");
    let fbody = b.call("+", vec![p, bang]);
    let decorated = b.lambda(&["p"], fbody);
    let func = b.func_stmt("decorate", decorated);

    let a = b.var("a");
    let inner_call = b.call("decorate", vec![a]);
    let outer_lambda = b.lambda(&["a"], inner_call);
    let bind_f = b.bind("f", outer_lambda);
    let arg = b.s("n");
    let call = b.var_call("f", vec![arg]);
    let res = b.res("test", call, vec![]);
    let program = b.program(vec![func, bind_f, res]);
    assert_eq!(resource_ids(&run(b, program)), vec!["test/n!".to_owned()]);
}

/// include × variable: a class body reads a binding from its definition
/// site.
#[test]
fn class_body_reads_definition_site_variable() {
    let mut b = B::new();
    let val = b.s("site");
    let bind = b.bind("x", val);
    let x = b.var("x");
    let res = b.res("test", x, vec![]);
    let class = b.class("k", &[], vec![res]);
    let inc = b.include("k", vec![]);
    let program = b.program(vec![bind, class, inc]);
    assert_eq!(resource_ids(&run(b, program)), vec!["test/site".to_owned()]);
}

/// include × function: a class body calls a function from its definition
/// site.
#[test]
fn class_body_calls_definition_site_function() {
    let mut b = B::new();
    let p = b.var("p");
    let sfx = b.s("-done");
    let fbody = b.call("+", vec![p, sfx]);
    let lambda = b.lambda(&["p"], fbody);
    let func = b.func_stmt("suffix", lambda);

    let arg = b.s("task");
    let call = b.call("suffix", vec![arg]);
    let res = b.res("test", call, vec![]);
    let class = b.class("k", &[], vec![res]);
    let inc = b.include("k", vec![]);
    let program = b.program(vec![func, class, inc]);
    assert_eq!(resource_ids(&run(b, program)), vec!["test/task-done".to_owned()]);
}

/// include × class: a class body includes another class.
#[test]
fn class_body_includes_other_class() {
    let mut b = B::new();
    let name = b.s("inner");
    let res = b.res("test", name, vec![]);
    let inner = b.class("inner_k", &[], vec![res]);
    let inc_inner = b.include("inner_k", vec![]);
    let outer = b.class("outer_k", &[], vec![inc_inner]);
    let inc_outer = b.include("outer_k", vec![]);
    let program = b.program(vec![inner, outer, inc_outer]);
    assert_eq!(resource_ids(&run(b, program)), vec!["test/inner".to_owned()]);
}

/// for × variable: the loop body reads both the iteration variable and an
/// outer binding.
#[test]
fn loop_body_mixes_iteration_and_outer_variables() {
    let mut b = B::new();
    let pre = b.s("p-");
    let bind = b.bind("prefix", pre);
    let a = b.s("a");
    let bb = b.s("b");
    let list = b.list(vec![a, bb]);
    let prefix = b.var("prefix");
    let v = b.var("v");
    let name = b.call("+", vec![prefix, v]);
    let res = b.res("test", name, vec![]);
    let for_stmt = b.for_stmt("i", "v", list, vec![res]);
    let program = b.program(vec![bind, for_stmt]);
    assert_eq!(
        resource_ids(&run(b, program)),
        vec!["test/p-a".to_owned(), "test/p-b".to_owned()]
    );
}

/// for × function: the loop body calls a top-level function on the loop
/// variable.
#[test]
fn loop_body_calls_function_on_iteration_variable() {
    let mut b = B::new();
    let p = b.var("p");
    let sfx = b.s("?");
    let fbody = b.call("+", vec![p, sfx]);
    let lambda = b.lambda(&["p"], fbody);
    let func = b.func_stmt("ask", lambda);

    let a = b.s("x");
    let bb = b.s("y");
    let list = b.list(vec![a, bb]);
    let v = b.var("v");
    let call = b.call("ask", vec![v]);
    let res = b.res("test", call, vec![]);
    let for_stmt = b.for_stmt("i", "v", list, vec![res]);
    let program = b.program(vec![func, for_stmt]);
    assert_eq!(
        resource_ids(&run(b, program)),
        vec!["test/x?".to_owned(), "test/y?".to_owned()]
    );
}

/// for × class: including a class with the loop variable as its argument.
/// The class parameter binds through a per-iteration key, so each
/// iteration instantiates independently.
#[test]
fn loop_body_includes_class_with_iteration_argument() {
    let mut b = B::new();
    let p = b.var("p");
    let res = b.res("test", p, vec![]);
    let class = b.class("k", &["p"], vec![res]);

    let a = b.s("one");
    let bb = b.s("two");
    let list = b.list(vec![a, bb]);
    let v = b.var("v");
    let inc = b.include("k", vec![v]);
    let for_stmt = b.for_stmt("i", "v", list, vec![inc]);
    let program = b.program(vec![class, for_stmt]);
    assert_eq!(
        resource_ids(&run(b, program)),
        vec!["test/one".to_owned(), "test/two".to_owned()]
    );
}

/// for × index: the iteration index is usable as an int.
#[test]
fn loop_index_is_an_int() {
    let mut b = B::new();
    let a = b.s("a");
    let bb = b.s("b");
    let list = b.list(vec![a, bb]);
    let n = b.s("t");
    let res = b.res("test", n, vec![]);
    let i = b.var("i");
    let limit = b.i(0);
    let cond = b.call("==", vec![i, limit]);
    let if_stmt = b.if_stmt(cond, vec![res], None);
    let for_stmt = b.for_stmt("i", "v", list, vec![if_stmt]);
    let program = b.program(vec![for_stmt]);
    // Only the first iteration's branch is live.
    assert_eq!(resource_ids(&run(b, program)), vec!["test/t".to_owned()]);
}

/// forkv × variable: keys and values both reach the body.
#[test]
fn forkv_binds_key_and_value() {
    let mut b = B::new();
    let k1 = b.s("host");
    let v1 = b.s("web");
    let pairs = b.map(vec![(k1, v1)]);
    let k = b.var("k");
    let dash = b.s("-");
    let v = b.var("v");
    let left = b.call("+", vec![k, dash]);
    let name = b.call("+", vec![left, v]);
    let res = b.res("test", name, vec![]);
    let forkv = b.forkv_stmt("k", "v", pairs, vec![res]);
    let program = b.program(vec![forkv]);
    assert_eq!(resource_ids(&run(b, program)), vec!["test/host-web".to_owned()]);
}
