//! Import machinery end to end: registered modules, builtin-prefix system
//! imports, aliasing and recursion detection.

mod common;

use common::{resource_ids, B};
use pretty_assertions::assert_eq;
use rill::{
    errors::LangResult,
    funcs::{BuiltFunc, FuncInfo},
    LangError, Session, Type, Value,
};

/// A registered module's bindings are visible under its alias.
#[test]
fn registered_module_import_resolves_dotted_names() {
    let mut b = B::new();
    // Module "util.rl": $greeting = "hello"
    let val = b.s("hello");
    let bind = b.bind("greeting", val);
    let module = b.program(vec![bind]);

    let import = b.import("util.rl", None);
    let g = b.var("util.greeting");
    let res = b.res("test", g, vec![]);
    let program = b.program(vec![import, res]);

    let mut session = Session::new(b.arena, program);
    session.context_mut().modules.register_parsed("util.rl", module);
    session.elaborate().expect("elaborate");
    session.build().expect("build");
    session.tick().expect("tick");
    let og = session.output().expect("output");
    assert_eq!(resource_ids(&og), vec!["test/hello".to_owned()]);
}

/// An explicit alias replaces the default one.
#[test]
fn import_alias_overrides_default() {
    let mut b = B::new();
    let val = b.s("x");
    let bind = b.bind("v", val);
    let module = b.program(vec![bind]);

    let import = b.import("util.rl", Some("u"));
    let g = b.var("u.v");
    let res = b.res("test", g, vec![]);
    let program = b.program(vec![import, res]);

    let mut session = Session::new(b.arena, program);
    session.context_mut().modules.register_parsed("util.rl", module);
    session.elaborate().expect("elaborate");
    session.build().expect("build");
    session.tick().expect("tick");
    assert_eq!(resource_ids(&session.output().expect("output")), vec!["test/x".to_owned()]);
}

/// Modules importing each other fail with a recursive-import error.
#[test]
fn mutually_importing_modules_are_rejected() {
    let mut b = B::new();
    let import_b = b.import("b.rl", None);
    let module_a = b.program(vec![import_b]);
    let import_a = b.import("a.rl", None);
    let module_b = b.program(vec![import_a]);

    let entry = b.import("a.rl", None);
    let program = b.program(vec![entry]);

    let mut session = Session::new(b.arena, program);
    session.context_mut().modules.register_parsed("a.rl", module_a);
    session.context_mut().modules.register_parsed("b.rl", module_b);
    let err = session.elaborate().unwrap_err();
    assert!(matches!(err, LangError::RecursiveImport { .. }), "got {err}");
}

/// Bare (flattening) imports are disabled unless the host opts in.
#[test]
fn bare_import_is_disabled_by_default() {
    let mut b = B::new();
    let val = b.s("x");
    let bind = b.bind("v", val);
    let module = b.program(vec![bind]);
    let import = b.import("util.rl", Some("*"));
    let v = b.var("v");
    let res = b.res("test", v, vec![]);
    let program = b.program(vec![import, res]);

    let mut session = Session::new(b.arena, program);
    session.context_mut().modules.register_parsed("util.rl", module);
    let err = session.elaborate().unwrap_err();
    assert!(matches!(err, LangError::Import { .. }), "got {err}");
}

#[test]
fn bare_import_flattens_when_enabled() {
    let mut b = B::new();
    let val = b.s("flat");
    let bind = b.bind("v", val);
    let module = b.program(vec![bind]);
    let import = b.import("util.rl", Some("*"));
    let v = b.var("v");
    let res = b.res("test", v, vec![]);
    let program = b.program(vec![import, res]);

    let mut session = Session::new(b.arena, program);
    session.context_mut().allow_bare_imports = true;
    session.context_mut().modules.register_parsed("util.rl", module);
    session.elaborate().expect("elaborate");
    session.build().expect("build");
    session.tick().expect("tick");
    assert_eq!(resource_ids(&session.output().expect("output")), vec!["test/flat".to_owned()]);
}

/// A flattened import and a local binding share one lexical scope, so a
/// later `$v = …` colliding with an imported `v` is a duplicate, not a
/// silent overwrite.
#[test]
fn bare_import_collision_with_later_bind_is_rejected() {
    let mut b = B::new();
    let flat = b.s("flat");
    let module_bind = b.bind("v", flat);
    let module = b.program(vec![module_bind]);

    let import = b.import("util.rl", Some("*"));
    let local = b.s("local");
    let bind = b.bind("v", local);
    let v = b.var("v");
    let res = b.res("test", v, vec![]);
    let program = b.program(vec![import, bind, res]);

    let mut session = Session::new(b.arena, program);
    session.context_mut().allow_bare_imports = true;
    session.context_mut().modules.register_parsed("util.rl", module);
    let err = session.elaborate().unwrap_err();
    match err {
        LangError::Duplicate { kind, name, .. } => {
            assert_eq!(kind, rill::NameKind::Variable);
            assert_eq!(name, "v");
        }
        other => panic!("expected a duplicate variable error, got {other}"),
    }
}

/// Same invariant for the function namespace: a local `func f` after a
/// flattened import of `f` is rejected.
#[test]
fn bare_import_collision_with_later_func_is_rejected() {
    let mut b = B::new();
    let p1 = b.var("p");
    let module_lambda = b.lambda(&["p"], p1);
    let module_func = b.func_stmt("f", module_lambda);
    let module = b.program(vec![module_func]);

    let import = b.import("util.rl", Some("*"));
    let p2 = b.var("p");
    let local_lambda = b.lambda(&["p"], p2);
    let local_func = b.func_stmt("f", local_lambda);
    let arg = b.s("n");
    let call = b.call("f", vec![arg]);
    let res = b.res("test", call, vec![]);
    let program = b.program(vec![import, local_func, res]);

    let mut session = Session::new(b.arena, program);
    session.context_mut().allow_bare_imports = true;
    session.context_mut().modules.register_parsed("util.rl", module);
    let err = session.elaborate().unwrap_err();
    match err {
        LangError::Duplicate { kind, name, .. } => {
            assert_eq!(kind, rill::NameKind::Function);
            assert_eq!(name, "f");
        }
        other => panic!("expected a duplicate function error, got {other}"),
    }
}

/// A host builtin registered under a prefix, exercising the plug-in
/// contract end to end through a system import.
#[derive(Debug, Clone)]
struct UpperFunc {
    built: Option<Type>,
}

impl UpperFunc {
    fn new() -> Self {
        Self { built: None }
    }
}

impl BuiltFunc for UpperFunc {
    fn info(&self) -> FuncInfo {
        FuncInfo {
            pure: true,
            memo: true,
            sig: Some(Type::func_of(vec![("s".to_owned(), Type::Str)], Type::Str)),
            err: None,
        }
    }

    fn build(&mut self, typ: &Type) -> LangResult<Type> {
        self.built = Some(typ.clone());
        Ok(typ.clone())
    }

    fn call(&self, args: &[Value]) -> LangResult<Value> {
        match args {
            [Value::Str(s)] => Ok(Value::Str(s.to_uppercase())),
            _ => unreachable!("typechecked arguments"),
        }
    }

    fn copy_func(&self) -> Box<dyn BuiltFunc> {
        Box::new(self.clone())
    }
}

fn upper_factory() -> Box<dyn BuiltFunc> {
    Box::new(UpperFunc::new())
}

#[test]
fn system_import_exposes_builtin_prefix() {
    let mut b = B::new();
    let import = b.import("text", None);
    let arg = b.s("loud");
    let call = b.call("text.upper", vec![arg]);
    let res = b.res("test", call, vec![]);
    let program = b.program(vec![import, res]);

    let mut session = Session::new(b.arena, program);
    session.context_mut().funcs.register("text.upper", upper_factory);
    session.elaborate().expect("elaborate");
    session.build().expect("build");
    session.tick().expect("tick");
    assert_eq!(resource_ids(&session.output().expect("output")), vec!["test/LOUD".to_owned()]);
}

/// An unknown system import has nothing to offer.
#[test]
fn unknown_system_import_is_rejected() {
    let mut b = B::new();
    let import = b.import("nonsense", None);
    let program = b.program(vec![import]);
    let mut session = Session::new(b.arena, program);
    let err = session.elaborate().unwrap_err();
    assert!(matches!(err, LangError::Import { .. }), "got {err}");
}
