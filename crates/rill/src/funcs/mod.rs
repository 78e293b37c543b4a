//! The builtin function registry and its plug-in contract.
//!
//! Builtins are registered as factories so the AST can bind them by name
//! and stay plain data; a fresh instance is taken whenever one is needed
//! for type specialisation or evaluation. The operator family ships here;
//! everything else arrives through host registration and is surfaced to
//! programs via system imports ([`FuncRegistry::scope_for_prefix`]).

mod operator;

pub use operator::OperatorFunc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    ast::{Arena, Expr, ExprId, FuncCore, FuncExpr},
    errors::{LangError, LangResult},
    scope::Scope,
    span::SrcSpan,
    types::Type,
    unify::Invariant,
    value::Value,
};

/// Static facts about a builtin.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncInfo {
    /// A pure builtin may be speculated during elaboration and eagerly
    /// evaluated inside a statement-level if branch; impure builtins are
    /// only ever run by the engine on the selected path.
    pub pure: bool,
    /// Whether the engine may memoise results by argument values.
    pub memo: bool,
    /// The (possibly still polymorphic) signature, when one is known
    /// before build-time specialisation.
    pub sig: Option<Type>,
    /// A configuration problem detected while assembling this info, e.g.
    /// a builtin built with data it rejects. Callers surface it before
    /// using the builtin.
    pub err: Option<String>,
}

/// The plug-in contract every builtin implements.
///
/// `build` and `call` are mandatory; the remaining capabilities are
/// optional hooks with inert defaults.
pub trait BuiltFunc: std::fmt::Debug {
    fn info(&self) -> FuncInfo;

    /// Specialises the builtin to a solved monomorphic type, returning the
    /// concrete signature. Fails when the type is outside the builtin's
    /// domain.
    fn build(&mut self, typ: &Type) -> LangResult<Type>;

    /// Evaluates the builtin on concrete argument values.
    fn call(&self, args: &[Value]) -> LangResult<Value>;

    /// Inference hook: given the partially known call-site type, returns a
    /// refined signature plus extra invariants relating the argument and
    /// return types. `None` leaves the generic call-site handling alone.
    fn func_infer(&self, _partial: &Type, _node: ExprId) -> Option<(Type, Vec<Invariant>)> {
        None
    }

    /// Generated name of the i-th argument, for named-argument surfaces.
    fn arg_name(&self, _i: usize) -> Option<String> {
        None
    }

    /// Clones the builtin behind the trait object.
    fn copy_func(&self) -> Box<dyn BuiltFunc>;

    /// Receives host data (module base path and friends) before use.
    fn set_data(&mut self, _data: &FuncData) {}
}

/// Host data passed to builtins that ask for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncData {
    /// Base directory of the module the builtin is used from.
    pub base: String,
}

/// Factory producing a fresh builtin instance.
pub type FuncFactory = fn() -> Box<dyn BuiltFunc>;

/// Name-keyed registry of builtin factories.
#[derive(Debug, Default)]
pub struct FuncRegistry {
    factories: AHashMap<String, FuncFactory>,
}

impl FuncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory; later registrations of the same name win.
    pub fn register(&mut self, name: impl Into<String>, factory: FuncFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiates a fresh builtin by full name.
    pub fn lookup(&self, name: &str) -> Option<Box<dyn BuiltFunc>> {
        self.factories.get(name).map(|f| f())
    }

    /// All registered names under a prefix, e.g. `fmt.` for a system
    /// import of the `fmt` module. Sorted for deterministic scope merges.
    pub fn lookup_prefix(&self, prefix: &str) -> IndexMap<String, FuncFactory> {
        let mut found: Vec<(&String, &FuncFactory)> =
            self.factories.iter().filter(|(name, _)| name.starts_with(prefix)).collect();
        found.sort_by(|a, b| a.0.cmp(b.0));
        found.into_iter().map(|(n, f)| (n.clone(), *f)).collect()
    }

    /// Builds a scope exposing every builtin under `prefix` as a function
    /// binding, with the prefix stripped: `import "fmt"` exposes
    /// `fmt.printf` as `printf` inside the imported scope (the alias adds
    /// the dotted prefix back during the merge).
    pub fn scope_for_prefix(&self, prefix: &str, arena: &mut Arena, span: SrcSpan) -> Option<Scope> {
        let full = format!("{prefix}.");
        let found = self.lookup_prefix(&full);
        if found.is_empty() {
            return None;
        }
        let mut scope = Scope::new();
        for name in found.keys() {
            let short = name.strip_prefix(&full).unwrap_or(name).to_owned();
            let func = arena.alloc_expr(
                Expr::Func(FuncExpr {
                    params: Vec::new(),
                    ret: None,
                    body: FuncCore::Builtin(name.clone()),
                    scope: None,
                    param_exprs: Vec::new(),
                }),
                span,
            );
            // The scope is fresh and registry names are unique keys, so
            // there is nothing to collide with.
            scope.shadow_func(short, func);
        }
        Some(scope)
    }

    /// Instantiates a builtin or fails with an unresolved-function error.
    pub fn instantiate(&self, name: &str, span: SrcSpan) -> LangResult<Box<dyn BuiltFunc>> {
        self.lookup(name)
            .ok_or_else(|| LangError::unresolved(crate::errors::NameKind::Function, name, span))
    }
}

/// The default registry: the polymorphic operator family.
pub fn default_registry() -> FuncRegistry {
    let mut reg = FuncRegistry::new();
    for op in operator::OPERATORS {
        reg.register(*op, operator::factory_for(op));
    }
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_the_operators() {
        let reg = default_registry();
        assert!(reg.contains("+"));
        assert!(reg.contains("not"));
        assert!(!reg.contains("nonsense"));
    }

    #[test]
    fn prefix_lookup_is_sorted() {
        let mut reg = FuncRegistry::new();
        reg.register("fmt.printf", || Box::new(OperatorFunc::new("+")));
        reg.register("fmt.println", || Box::new(OperatorFunc::new("+")));
        let found = reg.lookup_prefix("fmt.");
        let names: Vec<&str> = found.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["fmt.printf", "fmt.println"]);
    }
}
