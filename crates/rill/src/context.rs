//! The elaboration context: every collaborator and every piece of state
//! that would otherwise be process-wide, passed explicitly down the
//! pipeline.
//!
//! Nothing in the core is a singleton. The import graph, the graphviz
//! debug flag, the type-variable counter, the registries and the tracer
//! all live here, so two elaborations never observe each other.

use ahash::AHashMap;

use crate::{
    funcs::{self, FuncRegistry},
    imports::{Downloader, Fs, ImportGraph, LexParse, MemFs, ModuleRegistry},
    resources::{DefaultKinds, KindRegistry},
    scope::Scope,
    tracer::{ElabTracer, NoopTracer},
    types::{Type, TypeVar},
    unify::{SimpleSolver, UnificationSolver},
};

/// Name of the root compilation unit in the import graph.
pub const MAIN_MODULE: &str = "main";

/// Everything the pipeline needs besides the arena.
#[derive(Debug)]
pub struct ElaborationContext {
    /// Builtin function registry.
    pub funcs: FuncRegistry,
    /// Resource kind registry.
    pub kinds: Box<dyn KindRegistry>,
    /// Filesystem collaborator for local and remote imports.
    pub fs: Box<dyn Fs>,
    /// Optional downloader invoked for missing remote modules.
    pub downloader: Option<Box<dyn Downloader>>,
    /// Optional parser collaborator for text modules.
    pub parser: Option<Box<dyn LexParse>>,
    /// Host-registered modules (pre-parsed and embedded text).
    pub modules: ModuleRegistry,
    /// Root of the remote modules directory.
    pub modules_path: String,
    /// The module import DAG, including the self vertex.
    pub imports: ImportGraph,
    /// Elaboration tracer; defaults to the no-op implementation.
    pub tracer: Box<dyn ElabTracer>,
    /// Unification solver collaborator.
    pub solver: Box<dyn UnificationSolver>,
    /// Emit a graphviz dump of the FG to the tracer after construction.
    pub graphviz: bool,
    /// Whether `import "x" as *` may flatten a scope into the importer.
    pub allow_bare_imports: bool,
    /// Exported scopes of already elaborated modules, so a module imported
    /// along two paths elaborates once.
    pub module_cache: AHashMap<String, Scope>,
    next_type_var: u32,
    /// Stack of module base directories; the top is the directory local
    /// imports resolve against.
    base_stack: Vec<String>,
    /// Stack of module names for import-graph edges; the top is the
    /// currently elaborating module.
    module_stack: Vec<String>,
}

impl ElaborationContext {
    /// A context with every collaborator set to its default: the operator
    /// registry, the built-in kinds, an empty in-memory filesystem, no
    /// downloader, no parser, the baseline solver and the no-op tracer.
    pub fn new() -> Self {
        Self {
            funcs: funcs::default_registry(),
            kinds: Box::new(DefaultKinds::new()),
            fs: Box::new(MemFs::new()),
            downloader: None,
            parser: None,
            modules: ModuleRegistry::new(),
            modules_path: "modules/".to_owned(),
            imports: ImportGraph::new(),
            tracer: Box::new(NoopTracer),
            solver: Box::new(SimpleSolver),
            graphviz: false,
            allow_bare_imports: false,
            module_cache: AHashMap::new(),
            next_type_var: 0,
            base_stack: vec![String::new()],
            module_stack: vec![MAIN_MODULE.to_owned()],
        }
    }

    /// Allocates a fresh unification variable.
    pub fn fresh_var(&mut self) -> Type {
        let v = TypeVar(self.next_type_var);
        self.next_type_var += 1;
        Type::Unif(v)
    }

    /// The base directory of the module currently elaborating.
    pub fn current_base(&self) -> &str {
        self.base_stack.last().map_or("", String::as_str)
    }

    /// The name of the module currently elaborating (the self vertex).
    pub fn current_module(&self) -> &str {
        self.module_stack.last().map_or(MAIN_MODULE, String::as_str)
    }

    /// Enters a module for the duration of its elaboration.
    pub fn push_module(&mut self, name: impl Into<String>, base: impl Into<String>) {
        self.module_stack.push(name.into());
        self.base_stack.push(base.into());
    }

    pub fn pop_module(&mut self) {
        self.module_stack.pop();
        self.base_stack.pop();
    }
}

impl Default for ElaborationContext {
    fn default() -> Self {
        Self::new()
    }
}
