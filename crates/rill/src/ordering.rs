//! The ordering pass: builds, per program, a DAG describing which
//! statements define the names other statements consume.
//!
//! Graph nodes are the program's child statements; an edge points from a
//! producer to each consumer of one of its names, so a topological sort
//! yields a valid order in which to run scope resolution. Keys are
//! namespaced with a prefix (`var:`, `func:`, `class:`, `scoped:`) so the
//! same bare name can exist in several namespaces without interference.
//!
//! The sort is deterministic: ties are broken by statement insertion order,
//! which keeps diagnostics stable between runs.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexSet;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::{
    ast::{Arena, Expr, FuncCore, Stmt, StmtId},
    errors::{LangError, LangResult, NameKind},
};

/// The names a subtree consumes, per namespace, in first-use order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Consumed {
    pub vars: IndexSet<String>,
    pub funcs: IndexSet<String>,
    pub classes: IndexSet<String>,
}

impl Consumed {
    fn absorb(&mut self, other: Self) {
        self.vars.extend(other.vars);
        self.funcs.extend(other.funcs);
        self.classes.extend(other.classes);
    }
}

/// Result of ordering one program's children.
#[derive(Debug)]
pub struct OrderingResult {
    /// All children, topologically sorted (producers first).
    pub order: Vec<StmtId>,
    /// Children not reachable from any consumer. In a pruning program
    /// these are dead code: scope resolution skips them and they
    /// contribute nothing downstream. Exporting programs (modules, class
    /// bodies) keep them, since consumers may sit outside.
    pub pruned: AHashSet<StmtId>,
}

/// Builds the ordering DAG for `program`'s direct children and returns the
/// deterministic topological order plus the pruned (unreachable) set.
///
/// `parent_produces` holds namespaced keys already satisfied by enclosing
/// scopes; consuming one of those creates no edge. A cycle among the
/// children fails with a recursive-reference error naming one statement on
/// the cycle.
pub fn order_program(
    arena: &Arena,
    program: StmtId,
    parent_produces: &AHashSet<String>,
) -> LangResult<OrderingResult> {
    let Stmt::Program(prog) = arena.stmt(program) else {
        return Err(LangError::graph("ordering requires a program node", arena.stmt_span(program)));
    };
    let body = prog.body.clone();

    let mut graph: DiGraph<StmtId, ()> = DiGraph::new();
    let mut nodes: Vec<NodeIndex> = Vec::with_capacity(body.len());
    for child in &body {
        nodes.push(graph.add_node(*child));
    }

    // First pass: scan for producing statements and build the local
    // produces map, rejecting duplicates per namespace.
    let mut produces: AHashMap<String, NodeIndex> = AHashMap::new();
    for (i, child) in body.iter().enumerate() {
        for (key, kind) in produced_keys(arena, *child) {
            if produces.insert(key.clone(), nodes[i]).is_some() {
                // Note: once user-defined polymorphism lands, `func:`
                // collisions become legal and grow a Vec here instead.
                let name = key.split_once(':').map_or(key.as_str(), |(_, n)| n).to_owned();
                return Err(LangError::duplicate(kind, name, arena.stmt_span(*child)));
            }
        }
    }

    // Second pass: connect each consumer to its local producers. Names
    // satisfied by the parent map are shadowed by local ones first.
    for (i, child) in body.iter().enumerate() {
        let consumed = stmt_consumed(arena, *child);
        let keys = consumed
            .vars
            .iter()
            .map(|n| format!("var:{n}"))
            .chain(consumed.funcs.iter().map(|n| format!("func:{n}")))
            .chain(consumed.classes.iter().map(|n| format!("class:{n}")));
        for key in keys {
            if let Some(producer) = lookup_producer(&produces, &key) {
                if *producer != nodes[i] {
                    graph.add_edge(*producer, nodes[i], ());
                }
            } else if parent_produces.contains(&key) {
                // Satisfied by an enclosing scope; no local edge.
            }
        }
    }

    // Reachability: effect statements are roots; anything they transitively
    // consume is needed. Pure producers nobody consumes are pruned.
    let mut needed: AHashSet<NodeIndex> = AHashSet::new();
    let mut stack: Vec<NodeIndex> = Vec::new();
    for (i, child) in body.iter().enumerate() {
        if is_effect(arena, *child) {
            stack.push(nodes[i]);
        }
    }
    while let Some(n) = stack.pop() {
        if needed.insert(n) {
            stack.extend(graph.neighbors_directed(n, petgraph::Direction::Incoming));
        }
    }

    // Kahn's algorithm with an insertion-ordered ready list.
    let mut indegree: AHashMap<NodeIndex, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    for edge in graph.edge_indices() {
        let (_, to) = graph.edge_endpoints(edge).expect("edge exists");
        *indegree.get_mut(&to).expect("node exists") += 1;
    }
    let mut ready: Vec<NodeIndex> = nodes.iter().filter(|n| indegree[n] == 0).copied().collect();
    let mut order: Vec<StmtId> = Vec::with_capacity(body.len());
    while !ready.is_empty() {
        // Lowest node index first keeps the sort stable across runs.
        let pos = ready
            .iter()
            .enumerate()
            .min_by_key(|(_, n)| n.index())
            .map(|(p, _)| p)
            .expect("ready list non-empty");
        let n = ready.swap_remove(pos);
        order.push(graph[n]);
        let successors: Vec<NodeIndex> = graph.neighbors_directed(n, petgraph::Direction::Outgoing).collect();
        for succ in successors {
            let d = indegree.get_mut(&succ).expect("node exists");
            *d -= 1;
            if *d == 0 {
                ready.push(succ);
            }
        }
    }
    if order.len() != body.len() {
        let on_cycle = body
            .iter()
            .zip(&nodes)
            .find(|(_, n)| indegree[*n] > 0)
            .map(|(s, _)| *s)
            .expect("cycle implies a node with positive indegree");
        return Err(LangError::recursive_reference(
            "statement ordering contains a cycle",
            arena.stmt_span(on_cycle),
        ));
    }

    let pruned = body
        .iter()
        .zip(&nodes)
        .filter(|(_, n)| !needed.contains(*n))
        .map(|(s, _)| *s)
        .collect();
    Ok(OrderingResult { order, pruned })
}

/// A dotted consumer name (`alias.x`) may be satisfied by the scope an
/// import or aliased include produced; fall back to `scoped:<prefix>`.
fn lookup_producer<'m>(produces: &'m AHashMap<String, NodeIndex>, key: &str) -> Option<&'m NodeIndex> {
    if let Some(n) = produces.get(key) {
        return Some(n);
    }
    let (_, name) = key.split_once(':')?;
    let (prefix, _) = name.split_once('.')?;
    produces.get(&format!("scoped:{prefix}"))
}

/// The namespaced keys a statement produces, if any.
fn produced_keys(arena: &Arena, id: StmtId) -> Vec<(String, NameKind)> {
    match arena.stmt(id) {
        Stmt::Bind(s) => vec![(format!("var:{}", s.name), NameKind::Variable)],
        Stmt::Func(s) => vec![(format!("func:{}", s.name), NameKind::Function)],
        Stmt::Class(s) => vec![(format!("class:{}", s.name), NameKind::Class)],
        Stmt::Import(s) => {
            // A bare import flattens names this pass cannot know yet: the
            // module only resolves during scope resolution, which runs
            // imports before everything else and rejects collisions with
            // the program's own bindings through the checked scope binds.
            if s.alias.as_deref() == Some("*") {
                Vec::new()
            } else {
                let name = s.alias.clone().unwrap_or_else(|| import_default_alias(&s.name));
                vec![(format!("scoped:{name}"), NameKind::Scope)]
            }
        }
        Stmt::Include(s) => s
            .alias
            .as_ref()
            .map(|a| vec![(format!("scoped:{a}"), NameKind::Scope)])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// The default scope name of an import: the last path component, without
/// any extension.
pub fn import_default_alias(name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.split_once('.').map_or(base, |(stem, _)| stem).to_owned()
}

/// True for statements that emit output (or instantiate code that might):
/// these are the ordering roots that keep their producers alive.
fn is_effect(arena: &Arena, id: StmtId) -> bool {
    match arena.stmt(id) {
        Stmt::Res(_) | Stmt::Edge(_) | Stmt::If(_) | Stmt::For(_) | Stmt::ForKv(_) | Stmt::Include(_) => true,
        // Imports are processed unconditionally before everything else.
        Stmt::Import(_) => true,
        Stmt::Bind(_) | Stmt::Func(_) | Stmt::Class(_) | Stmt::Comment(_) | Stmt::Program(_) => false,
    }
}

/// The names one statement consumes from its surroundings.
///
/// Nested programs shadow: a class body's parameters, a loop's iteration
/// variables and a lambda's parameters all bind locally and are subtracted
/// before the remainder propagates upward.
pub fn stmt_consumed(arena: &Arena, id: StmtId) -> Consumed {
    let mut out = Consumed::default();
    match arena.stmt(id) {
        Stmt::Bind(s) => expr_consumed(arena, s.value, &mut out),
        Stmt::Func(s) => expr_consumed(arena, s.func, &mut out),
        Stmt::Class(s) => {
            let mut inner = program_consumed(arena, s.body);
            for p in &s.params {
                if let Some(d) = p.default {
                    expr_consumed(arena, d, &mut out);
                }
                inner.vars.shift_remove(&p.name);
            }
            out.absorb(inner);
        }
        Stmt::Include(s) => {
            out.classes.insert(s.name.clone());
            for arg in &s.args {
                expr_consumed(arena, *arg, &mut out);
            }
        }
        Stmt::Import(_) | Stmt::Comment(_) => {}
        Stmt::Res(s) => {
            expr_consumed(arena, s.name, &mut out);
            for content in &s.contents {
                match content {
                    crate::ast::ResContent::Field(f) => expr_consumed(arena, f.value, &mut out),
                    crate::ast::ResContent::Edge(e) => expr_consumed(arena, e.name, &mut out),
                    crate::ast::ResContent::Meta(m) => expr_consumed(arena, m.value, &mut out),
                    crate::ast::ResContent::Collect(c) => expr_consumed(arena, c.value, &mut out),
                }
            }
        }
        Stmt::Edge(s) => {
            for half in &s.halves {
                expr_consumed(arena, half.name, &mut out);
            }
        }
        Stmt::If(s) => {
            expr_consumed(arena, s.cond, &mut out);
            out.absorb(program_consumed(arena, s.then_));
            if let Some(e) = s.else_ {
                out.absorb(program_consumed(arena, e));
            }
        }
        Stmt::For(s) => {
            expr_consumed(arena, s.expr, &mut out);
            let mut inner = program_consumed(arena, s.body);
            inner.vars.shift_remove(&s.index);
            inner.vars.shift_remove(&s.value);
            out.absorb(inner);
        }
        Stmt::ForKv(s) => {
            expr_consumed(arena, s.expr, &mut out);
            let mut inner = program_consumed(arena, s.body);
            inner.vars.shift_remove(&s.key);
            inner.vars.shift_remove(&s.val);
            out.absorb(inner);
        }
        Stmt::Program(_) => out.absorb(program_consumed(arena, id)),
    }
    out
}

/// Free names of a whole program: the union of its children's consumption
/// minus what the program produces itself.
fn program_consumed(arena: &Arena, id: StmtId) -> Consumed {
    let Stmt::Program(prog) = arena.stmt(id) else {
        return stmt_consumed(arena, id);
    };
    let mut out = Consumed::default();
    for child in &prog.body {
        out.absorb(stmt_consumed(arena, *child));
    }
    for child in &prog.body {
        match arena.stmt(*child) {
            Stmt::Bind(s) => {
                out.vars.shift_remove(&s.name);
            }
            Stmt::Func(s) => {
                out.funcs.shift_remove(&s.name);
            }
            Stmt::Class(s) => {
                out.classes.shift_remove(&s.name);
            }
            _ => {}
        }
    }
    out
}

fn expr_consumed(arena: &Arena, id: crate::ast::ExprId, out: &mut Consumed) {
    match arena.expr(id) {
        Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Param(_) => {}
        Expr::Var(v) => {
            out.vars.insert(v.name.clone());
        }
        Expr::Call(c) => {
            if c.var_call {
                out.vars.insert(c.name.clone());
            } else {
                out.funcs.insert(c.name.clone());
            }
            for arg in &c.args {
                expr_consumed(arena, *arg, out);
            }
        }
        Expr::Func(f) => {
            if let FuncCore::Lambda(body) = &f.body {
                let mut inner = Consumed::default();
                expr_consumed(arena, *body, &mut inner);
                for p in &f.params {
                    inner.vars.shift_remove(&p.name);
                }
                out.absorb(inner);
            }
        }
        Expr::List(items) => {
            for item in items {
                expr_consumed(arena, *item, out);
            }
        }
        Expr::Map(pairs) => {
            for (k, v) in pairs {
                expr_consumed(arena, *k, out);
                expr_consumed(arena, *v, out);
            }
        }
        Expr::Struct(fields) => {
            for f in fields {
                expr_consumed(arena, f.value, out);
            }
        }
        Expr::If(e) => {
            expr_consumed(arena, e.cond, out);
            expr_consumed(arena, e.then_, out);
            expr_consumed(arena, e.else_, out);
        }
        Expr::Iterated(w) => expr_consumed(arena, w.def, out),
        Expr::Poly(w) => expr_consumed(arena, w.def, out),
        Expr::TopLevel(w) => expr_consumed(arena, w.def, out),
        Expr::Singleton(w) => expr_consumed(arena, w.def, out),
    }
}
