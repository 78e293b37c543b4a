//! FG construction: translates the elaborated AST into function-graph
//! vertices, and hosts the transactional expansion paths the engine uses
//! for calls and loops.
//!
//! Statement translation returns no vertex: binds, funcs and classes
//! contribute through their references, while resources and edges only
//! need their expressions materialised (output emission reads the cached
//! vertex back-references). Expression translation returns the vertex
//! whose value the expression denotes; delegating forms (Var, the
//! wrappers) return the delegate's vertex without adding one.

use std::sync::Mutex;

use ahash::AHashMap;

use crate::{
    ast::{Arena, CopyMap, Expr, ExprId, FuncCore, ResContent, Stmt, StmtId},
    context::ElaborationContext,
    errors::{LangError, LangResult},
    fg::{
        env::{Env, FuncSingleton},
        CompositeKind, EdgeId, Expanded, Fg, TxnLog, Vertex, VertexId,
    },
    value::{FuncBody, FuncValue, Value},
};

/// One live iteration of a for/forkv statement.
#[derive(Debug)]
pub struct IterSnapshot {
    /// Cache key derived from the element (occurrence-counted), so an
    /// unchanged element keeps its subgraph across re-expansions.
    pub key: String,
    /// The per-iteration copy of the loop body, walked by output emission.
    pub body: StmtId,
    /// Everything this iteration added to the FG.
    log: TxnLog,
    /// The constant vertex holding the iteration index (for) — updated in
    /// place when elements shift.
    index_vertex: Option<VertexId>,
    /// The constant vertex holding the element or map value — updated in
    /// place when the value under an unchanged key changes (forkv).
    value_vertex: Option<VertexId>,
}

/// FG construction state: the graph, the singleton memo and the live
/// iteration snapshots.
#[derive(Debug, Default)]
pub struct FgBuild {
    pub fg: Fg,
    /// Memo for `Singleton` wrappers: one vertex per wrapper id, no matter
    /// how many use sites delegate to it.
    singletons: Mutex<AHashMap<ExprId, VertexId>>,
    /// Live iterations per for/forkv statement. The engine creates entries
    /// through transaction callbacks; output emission reads them.
    iterations: Mutex<AHashMap<StmtId, Vec<IterSnapshot>>>,
    txn_stack: Vec<TxnLog>,
}

impl FgBuild {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with the per-iteration snapshots of one statement.
    pub fn with_iterations<R>(&self, stmt: StmtId, f: impl FnOnce(&[IterSnapshot]) -> R) -> R {
        let map = self.iterations.lock().expect("iterations lock");
        f(map.get(&stmt).map_or(&[][..], Vec::as_slice))
    }

    pub fn add_vertex(&mut self, v: Vertex) -> VertexId {
        let id = self.fg.add_vertex(v);
        if let Some(txn) = self.txn_stack.last_mut() {
            txn.vertices.push(id);
        }
        id
    }

    pub fn add_edge(&mut self, from: VertexId, to: VertexId, label: impl Into<String>) -> EdgeId {
        let id = self.fg.add_edge(from, to, label);
        if let Some(txn) = self.txn_stack.last_mut() {
            txn.edges.push(id);
        }
        id
    }

    /// Takes a shared reference on a pre-existing vertex for the current
    /// transaction, so rollback will not remove it from under other users.
    pub fn note_shared(&mut self, v: VertexId) {
        self.fg.ref_inc(v);
        if let Some(txn) = self.txn_stack.last_mut() {
            txn.shared.push(v);
        }
    }

    pub fn begin_txn(&mut self) {
        self.txn_stack.push(TxnLog::default());
    }

    /// Commits the innermost transaction, returning its log for later
    /// rollback. Inside an enclosing transaction the log is also absorbed
    /// upward, so aborting the outer one undoes the inner one too.
    pub fn commit_txn(&mut self) -> TxnLog {
        let log = self.txn_stack.pop().unwrap_or_default();
        if let Some(outer) = self.txn_stack.last_mut() {
            outer.absorb(log.clone());
        }
        log
    }

    /// Rolls a committed log back, returning the removed vertices so the
    /// engine can purge their table entries.
    pub fn rollback(&mut self, log: TxnLog) -> Vec<VertexId> {
        log.reset(&mut self.fg)
    }

    /// Builds a whole program (pruned statements excluded).
    pub fn build_program(
        &mut self,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
        program: StmtId,
        env: &Env,
    ) -> LangResult<()> {
        self.build_stmt(arena, ctx, program, env)
    }

    pub fn build_stmt(
        &mut self,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
        id: StmtId,
        env: &Env,
    ) -> LangResult<()> {
        if arena.is_pruned(id) {
            return Ok(());
        }
        match arena.stmt(id).clone() {
            // These contribute through their references; nothing to add.
            Stmt::Bind(_) | Stmt::Func(_) | Stmt::Class(_) | Stmt::Import(_) | Stmt::Comment(_) => Ok(()),
            Stmt::Program(s) => {
                for child in s.body {
                    self.build_stmt(arena, ctx, child, env)?;
                }
                Ok(())
            }
            Stmt::Include(s) => match s.body {
                Some(body) => self.build_stmt(arena, ctx, body, env),
                None => Err(LangError::graph(
                    "include reached graph construction without a body",
                    arena.stmt_span(id),
                )),
            },
            Stmt::Res(s) => {
                self.build_expr(arena, ctx, s.name, env)?;
                for content in &s.contents {
                    let value = match content {
                        ResContent::Field(f) => f.value,
                        ResContent::Edge(e) => e.name,
                        ResContent::Meta(m) => m.value,
                        ResContent::Collect(c) => c.value,
                    };
                    self.build_expr(arena, ctx, value, env)?;
                }
                Ok(())
            }
            Stmt::Edge(s) => {
                for half in &s.halves {
                    self.build_expr(arena, ctx, half.name, env)?;
                }
                Ok(())
            }
            // Both branches materialise; output selects by the condition.
            // Safe because eagerly evaluated vertices are pure builtins.
            Stmt::If(s) => {
                self.build_expr(arena, ctx, s.cond, env)?;
                self.build_stmt(arena, ctx, s.then_, env)?;
                if let Some(e) = s.else_ {
                    self.build_stmt(arena, ctx, e, env)?;
                }
                Ok(())
            }
            Stmt::For(s) => {
                let list = self.build_expr(arena, ctx, s.expr, env)?;
                let v = self.add_vertex(Vertex::Expand {
                    stmt: id,
                    env: env.clone(),
                    keyed: false,
                });
                self.add_edge(list, v, "list");
                Ok(())
            }
            Stmt::ForKv(s) => {
                let map = self.build_expr(arena, ctx, s.expr, env)?;
                let v = self.add_vertex(Vertex::Expand {
                    stmt: id,
                    env: env.clone(),
                    keyed: true,
                });
                self.add_edge(map, v, "list");
                Ok(())
            }
        }
    }

    pub fn build_expr(
        &mut self,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
        id: ExprId,
        env: &Env,
    ) -> LangResult<VertexId> {
        let span = arena.expr_span(id);
        let vertex = match arena.expr(id).clone() {
            Expr::Bool(b) => self.add_vertex(Vertex::Const(Value::Bool(b))),
            Expr::Int(i) => self.add_vertex(Vertex::Const(Value::Int(i))),
            Expr::Float(x) => self.add_vertex(Vertex::Const(Value::Float(x))),
            Expr::Str(s) => self.add_vertex(Vertex::Const(Value::Str(s))),
            Expr::List(items) => {
                let children: Vec<VertexId> = items
                    .iter()
                    .map(|e| self.build_expr(arena, ctx, *e, env))
                    .collect::<LangResult<_>>()?;
                let v = self.add_vertex(Vertex::Composite(CompositeKind::List(children.len())));
                for (i, child) in children.into_iter().enumerate() {
                    self.add_edge(child, v, i.to_string());
                }
                v
            }
            Expr::Map(pairs) => {
                let mut built = Vec::with_capacity(pairs.len());
                for (k, val) in &pairs {
                    built.push((self.build_expr(arena, ctx, *k, env)?, self.build_expr(arena, ctx, *val, env)?));
                }
                let v = self.add_vertex(Vertex::Composite(CompositeKind::Map(built.len())));
                for (i, (k, val)) in built.into_iter().enumerate() {
                    self.add_edge(k, v, format!("key:{i}"));
                    self.add_edge(val, v, format!("val:{i}"));
                }
                v
            }
            Expr::Struct(fields) => {
                let mut built = Vec::with_capacity(fields.len());
                for f in &fields {
                    built.push((f.name.clone(), self.build_expr(arena, ctx, f.value, env)?));
                }
                let names: Vec<String> = built.iter().map(|(n, _)| n.clone()).collect();
                let v = self.add_vertex(Vertex::Composite(CompositeKind::Struct(names)));
                for (name, child) in built {
                    self.add_edge(child, v, name);
                }
                v
            }
            Expr::If(e) => {
                let c = self.build_expr(arena, ctx, e.cond, env)?;
                let a = self.build_expr(arena, ctx, e.then_, env)?;
                let b = self.build_expr(arena, ctx, e.else_, env)?;
                let v = self.add_vertex(Vertex::Select);
                self.add_edge(c, v, "c");
                self.add_edge(a, v, "a");
                self.add_edge(b, v, "b");
                v
            }
            Expr::Var(var) => {
                let target = var
                    .target
                    .ok_or_else(|| LangError::graph(format!("unresolved variable `{}`", var.name), span))?;
                self.build_expr(arena, ctx, target, env)?
            }
            Expr::Param(p) => {
                let singleton = env
                    .lookup(id)
                    .cloned()
                    .ok_or_else(|| LangError::graph(format!("env lookup miss for parameter `{}`", p.name), span))?;
                singleton.force(self, arena, ctx)?
            }
            Expr::Iterated(w) => {
                let singleton = env.lookup(id).cloned().ok_or_else(|| {
                    LangError::graph(format!("env lookup miss for iterated `{}`", w.name), span)
                })?;
                singleton.force(self, arena, ctx)?
            }
            // Definition-site scope, empty parameter environment.
            Expr::TopLevel(w) => self.build_expr(arena, ctx, w.def, &Env::new())?,
            Expr::Singleton(w) => self.build_singleton(arena, ctx, id, w.def, env)?,
            Expr::Poly(_) => {
                return Err(LangError::graph(
                    "polymorphic definition reached graph construction without a call-site copy",
                    span,
                ));
            }
            Expr::Func(func) => {
                let typ = arena
                    .typ(id)
                    .cloned()
                    .ok_or_else(|| LangError::graph("func expression has no solved type", span))?;
                let body = match &func.body {
                    FuncCore::Lambda(body) => FuncBody::Lambda {
                        body: *body,
                        params: func.param_exprs.clone(),
                    },
                    FuncCore::Builtin(name) => FuncBody::Builtin { name: name.clone() },
                };
                self.add_vertex(Vertex::Closure {
                    body,
                    env: env.clone(),
                    typ,
                })
            }
            Expr::Call(call) => self.build_call(arena, ctx, id, &call, env)?,
        };
        arena.set_fg(id, vertex);
        Ok(vertex)
    }

    /// Singleton wrappers memoise their definition's vertex. The build
    /// happens outside any active transaction: a singleton outlives every
    /// call-site subgraph that delegates to it.
    fn build_singleton(
        &mut self,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
        id: ExprId,
        def: ExprId,
        env: &Env,
    ) -> LangResult<VertexId> {
        {
            let memo = self.singletons.lock().expect("singleton lock");
            if let Some(v) = memo.get(&id) {
                let v = *v;
                drop(memo);
                self.note_shared(v);
                return Ok(v);
            }
        }
        let saved = std::mem::take(&mut self.txn_stack);
        let result = self.build_expr(arena, ctx, def, env);
        self.txn_stack = saved;
        let vertex = result?;
        self.singletons.lock().expect("singleton lock").insert(id, vertex);
        self.note_shared(vertex);
        Ok(vertex)
    }

    fn build_call(
        &mut self,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
        id: ExprId,
        call: &crate::ast::CallExpr,
        env: &Env,
    ) -> LangResult<VertexId> {
        let span = arena.expr_span(id);
        let callee = call
            .callee
            .ok_or_else(|| LangError::graph(format!("unresolved call `{}`", call.name), span))?;

        // Fast path: a statically known closure is compiled directly into
        // its body's subgraph, skipping the apply indirection.
        if let Some(func_id) = resolve_static_func(arena, callee) {
            let func = match arena.expr(func_id) {
                Expr::Func(f) => f.clone(),
                _ => unreachable!("resolve_static_func returns Func nodes"),
            };
            match &func.body {
                FuncCore::Builtin(name) => {
                    let typ = arena
                        .typ(func_id)
                        .cloned()
                        .ok_or_else(|| LangError::graph("builtin callee has no solved type", span))?;
                    let args: Vec<VertexId> = call
                        .args
                        .iter()
                        .map(|a| self.build_expr(arena, ctx, *a, env))
                        .collect::<LangResult<_>>()?;
                    let v = self.add_vertex(Vertex::BuiltinCall {
                        name: name.clone(),
                        typ,
                    });
                    for (i, arg) in args.into_iter().enumerate() {
                        self.add_edge(arg, v, i.to_string());
                    }
                    return Ok(v);
                }
                FuncCore::Lambda(body) => {
                    if func.param_exprs.len() != call.args.len() {
                        return Err(LangError::graph(
                            format!(
                                "call `{}` has {} arguments for {} parameters",
                                call.name,
                                call.args.len(),
                                func.param_exprs.len()
                            ),
                            span,
                        ));
                    }
                    let mut inner = env.clone();
                    for (param, arg) in func.param_exprs.iter().zip(&call.args) {
                        inner.bind(*param, FuncSingleton::lazy(*arg, env.clone()));
                    }
                    return self.build_expr(arena, ctx, *body, &inner);
                }
            }
        }

        // Slow path: the closure is a runtime value. Build an apply vertex
        // and let the engine splice the body in transactionally.
        let func_v = self.build_expr(arena, ctx, callee, env)?;
        let args: Vec<VertexId> = call
            .args
            .iter()
            .map(|a| self.build_expr(arena, ctx, *a, env))
            .collect::<LangResult<_>>()?;
        let v = self.add_vertex(Vertex::Apply {
            args: args.clone(),
            expanded: None,
        });
        self.add_edge(func_v, v, "func");
        for (i, arg) in args.into_iter().enumerate() {
            self.add_edge(arg, v, i.to_string());
        }
        Ok(v)
    }

    /// (Re)expands an apply vertex for a new closure value. Returns the
    /// vertices removed by rolling back the previous expansion.
    pub fn expand_apply(
        &mut self,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
        vertex: VertexId,
        closure: &FuncValue,
    ) -> LangResult<Vec<VertexId>> {
        let (args, old) = match self.fg.vertex_mut(vertex) {
            Vertex::Apply { args, expanded } => (args.clone(), expanded.take()),
            _ => {
                return Err(LangError::graph(
                    "expand_apply on a non-apply vertex",
                    crate::span::SrcSpan::default(),
                ));
            }
        };
        let mut removed = Vec::new();
        if let Some(old) = old {
            removed = self.rollback(old.log);
        }

        self.begin_txn();
        let output = match &closure.body {
            FuncBody::Builtin { name } => {
                let out = self.add_vertex(Vertex::BuiltinCall {
                    name: name.clone(),
                    typ: closure.typ.clone(),
                });
                for (i, arg) in args.iter().enumerate() {
                    self.note_shared(*arg);
                    self.add_edge(*arg, out, i.to_string());
                }
                out
            }
            FuncBody::Lambda { body, params } => {
                if params.len() != args.len() {
                    self.txn_stack.pop();
                    return Err(LangError::graph(
                        format!("closure applied to {} arguments for {} parameters", args.len(), params.len()),
                        crate::span::SrcSpan::default(),
                    ));
                }
                let mut inner = closure.env.clone();
                for (param, arg) in params.iter().zip(&args) {
                    inner.bind(*param, FuncSingleton::built(*arg));
                }
                self.build_expr(arena, ctx, *body, &inner)?
            }
        };
        // The rewire: the call's value mirrors the body's output, and the
        // edge keeps the output ahead of the apply in topological order.
        self.add_edge(output, vertex, "out");
        let log = self.commit_txn();
        if let Vertex::Apply { expanded, .. } = self.fg.vertex_mut(vertex) {
            *expanded = Some(Expanded {
                closure: closure.clone(),
                output,
                log,
            });
        }
        Ok(removed)
    }

    /// Re-expands a for statement against the current list value. Existing
    /// iterations keyed by an unchanged element keep their whole subgraph;
    /// only their index constant is refreshed. Returns removed vertices
    /// and whether anything changed.
    pub fn expand_for(
        &mut self,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
        stmt: StmtId,
        env: &Env,
        elements: &[Value],
    ) -> LangResult<(Vec<VertexId>, bool)> {
        let s = match arena.stmt(stmt) {
            Stmt::For(s) => s.clone(),
            _ => {
                return Err(LangError::graph("expand_for on a non-for statement", arena.stmt_span(stmt)));
            }
        };
        let index_param = s
            .index_param
            .ok_or_else(|| LangError::graph("for statement was not scoped", arena.stmt_span(stmt)))?;
        let value_param = s
            .value_param
            .ok_or_else(|| LangError::graph("for statement was not scoped", arena.stmt_span(stmt)))?;

        let desired = occurrence_keys(elements);
        let mut existing = self
            .iterations
            .lock()
            .expect("iterations lock")
            .remove(&stmt)
            .unwrap_or_default();

        let mut removed = Vec::new();
        let mut changed = false;
        // Drop iterations whose element disappeared.
        let keep: Vec<String> = desired.iter().map(|(k, _)| k.clone()).collect();
        let mut kept = Vec::new();
        for snap in existing {
            if keep.contains(&snap.key) {
                kept.push(snap);
            } else {
                changed = true;
                removed.extend(self.rollback(snap.log));
            }
        }
        existing = kept;

        let mut next: Vec<IterSnapshot> = Vec::with_capacity(desired.len());
        for (i, (key, elem)) in desired.into_iter().enumerate() {
            if let Some(pos) = existing.iter().position(|snap| snap.key == key) {
                let snap = existing.remove(pos);
                // The element kept its subgraph; only its index may shift.
                if let Some(vidx) = snap.index_vertex {
                    *self.fg.vertex_mut(vidx) = Vertex::Const(Value::Int(i as i64));
                }
                next.push(snap);
                continue;
            }
            changed = true;
            self.begin_txn();
            // Fresh parameter nodes per iteration, pre-seeded into the
            // copy map so body references retarget and force copies.
            let mut map = CopyMap::default();
            let ip = (arena.expr(index_param).clone(), arena.expr_span(index_param));
            let vp = (arena.expr(value_param).clone(), arena.expr_span(value_param));
            let new_ip = arena.alloc_expr(ip.0, ip.1);
            let new_vp = arena.alloc_expr(vp.0, vp.1);
            map.exprs.insert(index_param, new_ip);
            map.exprs.insert(value_param, new_vp);
            let body = arena.copy_stmt(s.body, &mut map);
            let vidx = self.add_vertex(Vertex::Const(Value::Int(i as i64)));
            let vval = self.add_vertex(Vertex::Const(elem.clone()));
            let mut iter_env = env.clone();
            iter_env.bind(new_ip, FuncSingleton::built(vidx));
            iter_env.bind(new_vp, FuncSingleton::built(vval));
            self.seed_iterated(arena, &map, &mut iter_env);
            self.build_stmt(arena, ctx, body, &iter_env)?;
            let log = self.commit_txn();
            next.push(IterSnapshot {
                key,
                body,
                log,
                index_vertex: Some(vidx),
                value_vertex: Some(vval),
            });
        }
        self.iterations.lock().expect("iterations lock").insert(stmt, next);
        Ok((removed, changed))
    }

    /// Re-expands a forkv statement against the current map value.
    /// Iterations are keyed by the map key; a changed value under an
    /// unchanged key refreshes the value constant in place.
    pub fn expand_forkv(
        &mut self,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
        stmt: StmtId,
        env: &Env,
        pairs: &[(Value, Value)],
    ) -> LangResult<(Vec<VertexId>, bool)> {
        let s = match arena.stmt(stmt) {
            Stmt::ForKv(s) => s.clone(),
            _ => {
                return Err(LangError::graph("expand_forkv on a non-forkv statement", arena.stmt_span(stmt)));
            }
        };
        let key_param = s
            .key_param
            .ok_or_else(|| LangError::graph("forkv statement was not scoped", arena.stmt_span(stmt)))?;
        let val_param = s
            .val_param
            .ok_or_else(|| LangError::graph("forkv statement was not scoped", arena.stmt_span(stmt)))?;

        let mut existing = self
            .iterations
            .lock()
            .expect("iterations lock")
            .remove(&stmt)
            .unwrap_or_default();
        let keep: Vec<String> = pairs.iter().map(|(k, _)| k.to_string()).collect();

        let mut removed = Vec::new();
        let mut changed = false;
        let mut kept = Vec::new();
        for snap in existing {
            if keep.contains(&snap.key) {
                kept.push(snap);
            } else {
                changed = true;
                removed.extend(self.rollback(snap.log));
            }
        }
        existing = kept;

        let mut next: Vec<IterSnapshot> = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            let key = k.to_string();
            if let Some(pos) = existing.iter().position(|snap| snap.key == key) {
                let snap = existing.remove(pos);
                if let Some(vval) = snap.value_vertex {
                    if self.fg_const(vval) != Some(v) {
                        *self.fg.vertex_mut(vval) = Vertex::Const(v.clone());
                        changed = true;
                    }
                }
                next.push(snap);
                continue;
            }
            changed = true;
            self.begin_txn();
            let mut map = CopyMap::default();
            let kp = (arena.expr(key_param).clone(), arena.expr_span(key_param));
            let vp = (arena.expr(val_param).clone(), arena.expr_span(val_param));
            let new_kp = arena.alloc_expr(kp.0, kp.1);
            let new_vp = arena.alloc_expr(vp.0, vp.1);
            map.exprs.insert(key_param, new_kp);
            map.exprs.insert(val_param, new_vp);
            let body = arena.copy_stmt(s.body, &mut map);
            let vkey = self.add_vertex(Vertex::Const(k.clone()));
            let vval = self.add_vertex(Vertex::Const(v.clone()));
            let mut iter_env = env.clone();
            iter_env.bind(new_kp, FuncSingleton::built(vkey));
            iter_env.bind(new_vp, FuncSingleton::built(vval));
            self.seed_iterated(arena, &map, &mut iter_env);
            self.build_stmt(arena, ctx, body, &iter_env)?;
            let log = self.commit_txn();
            next.push(IterSnapshot {
                key,
                body,
                log,
                index_vertex: None,
                value_vertex: Some(vval),
            });
        }
        self.iterations.lock().expect("iterations lock").insert(stmt, next);
        Ok((removed, changed))
    }

    fn fg_const(&self, v: VertexId) -> Option<&Value> {
        match self.fg.vertex(v) {
            Vertex::Const(val) => Some(val),
            _ => None,
        }
    }

    /// Seeds the environment with every `Iterated` wrapper the copy
    /// produced, so per-iteration definitions resolve to per-iteration
    /// vertices regardless of definition order inside the body.
    fn seed_iterated(&mut self, arena: &Arena, map: &CopyMap, iter_env: &mut Env) {
        let mut seeded = Vec::new();
        for new in map.exprs.values() {
            if let Expr::Iterated(w) = arena.expr(*new) {
                let singleton = FuncSingleton::lazy(w.def, Env::new());
                iter_env.bind(*new, singleton.clone());
                seeded.push(singleton);
            }
        }
        // Give every seed the finished environment so sibling definitions
        // can reference each other.
        for singleton in seeded {
            singleton.set_env(iter_env.clone());
        }
    }
}

/// Unwraps delegating forms to find a statically known `Func` expression.
/// Returns `None` when the callee is only known at run time.
fn resolve_static_func(arena: &Arena, mut id: ExprId) -> Option<ExprId> {
    loop {
        match arena.expr(id) {
            Expr::Func(_) => return Some(id),
            Expr::TopLevel(w) => id = w.def,
            Expr::Singleton(w) => id = w.def,
            Expr::Poly(w) => id = w.def,
            Expr::Iterated(w) => id = w.def,
            Expr::Var(v) => id = v.target?,
            _ => return None,
        }
    }
}

fn occurrence_keys(elements: &[Value]) -> Vec<(String, Value)> {
    let mut counts: AHashMap<String, usize> = AHashMap::new();
    elements
        .iter()
        .map(|elem| {
            let base = elem.to_string();
            let n = counts.entry(base.clone()).or_insert(0);
            let key = format!("{base}#{n}");
            *n += 1;
            (key, elem.clone())
        })
        .collect()
}
