//! The copy operation: duplicates the dynamic parts of a subtree while
//! preserving sharing of constant subtrees.
//!
//! A node is *dynamic* when its identity matters per instantiation: lambda
//! parameters and iterated wrappers are environment keys, and unresolved
//! references (a `Var` without a target, a `Call` without a callee, a lambda
//! without a captured scope) get per-copy resolution during scope
//! resolution. Copying computes the dynamic set to a fixed point first —
//! a reference into the copied part of the subtree makes the referring node
//! dynamic too, regardless of source order — then rebuilds exactly those
//! nodes, leaving everything else shared.

use ahash::{AHashMap, AHashSet};

use crate::ast::{Arena, Expr, ExprId, ExprNode, FuncCore, Node, ResContent, Stmt, StmtId, StmtNode};

/// Mapping from original node ids to their fresh copies.
///
/// Only nodes that were actually duplicated appear here; shared nodes map to
/// themselves implicitly. Callers use the mapping to re-key environments
/// (e.g. binding per-iteration vertices to the copied loop parameters).
#[derive(Debug, Default)]
pub struct CopyMap {
    pub exprs: AHashMap<ExprId, ExprId>,
    pub stmts: AHashMap<StmtId, StmtId>,
}

impl CopyMap {
    /// The post-copy id for an expression (itself when it was shared).
    pub fn expr(&self, id: ExprId) -> ExprId {
        self.exprs.get(&id).copied().unwrap_or(id)
    }

    pub fn stmt(&self, id: StmtId) -> StmtId {
        self.stmts.get(&id).copied().unwrap_or(id)
    }
}

#[derive(Debug, Default)]
struct CopySet {
    exprs: AHashSet<ExprId>,
    stmts: AHashSet<StmtId>,
}

impl Arena {
    /// Copies a statement subtree, returning the new root (or the same id
    /// when nothing in the subtree is dynamic) and recording every
    /// duplicated node in `map`.
    /// The map may arrive pre-seeded: entries for nodes outside the
    /// subtree (loop parameters, say) both force referring nodes to copy
    /// and redirect their references to the seeded replacements.
    pub fn copy_stmt(&mut self, id: StmtId, map: &mut CopyMap) -> StmtId {
        let set = self.dynamic_set(Node::Stmt(id), map);
        if !set.stmts.contains(&id) {
            return id;
        }
        let new_id = self.copy_marked_stmt(id, &set, map);
        self.patch_copied_vars(map);
        new_id
    }

    /// Copies an expression subtree; see [`Arena::copy_stmt`].
    pub fn copy_expr(&mut self, id: ExprId, map: &mut CopyMap) -> ExprId {
        let set = self.dynamic_set(Node::Expr(id), map);
        if !set.exprs.contains(&id) {
            return id;
        }
        let new_id = self.copy_marked_expr(id, &set, map);
        self.patch_copied_vars(map);
        new_id
    }

    /// A Var may be copied before the definition it targets (definition
    /// order is free in the language), in which case it still holds the
    /// pre-copy target id. Once the whole subtree is copied the map is
    /// complete, so retarget every copied Var through it.
    fn patch_copied_vars(&mut self, map: &CopyMap) {
        let copied: Vec<ExprId> = map.exprs.values().copied().collect();
        for id in copied {
            if let Expr::Var(v) = self.expr_mut(id)
                && let Some(t) = v.target
                && let Some(new_t) = map.exprs.get(&t)
            {
                v.target = Some(*new_t);
            }
        }
    }

    /// Collects every node in the subtree, then marks the dynamic ones to a
    /// fixed point: inherently dynamic nodes seed the set, and any node
    /// whose child or referent is marked becomes marked itself.
    fn dynamic_set(&self, root: Node, pre: &CopyMap) -> CopySet {
        let mut exprs = Vec::new();
        let mut stmts = Vec::new();
        self.collect(root, &mut exprs, &mut stmts);

        let mut set = CopySet::default();
        // Pre-seeded replacements count as copied externals.
        set.exprs.extend(pre.exprs.keys().copied());
        for id in &exprs {
            if self.inherently_dynamic(*id) {
                set.exprs.insert(*id);
            }
        }
        loop {
            let mut changed = false;
            for id in &exprs {
                if !set.exprs.contains(id) && self.expr_refs_marked(*id, &set) {
                    set.exprs.insert(*id);
                    changed = true;
                }
            }
            for id in &stmts {
                if !set.stmts.contains(id) && self.stmt_refs_marked(*id, &set) {
                    set.stmts.insert(*id);
                    changed = true;
                }
            }
            if !changed {
                return set;
            }
        }
    }

    fn collect(&self, node: Node, exprs: &mut Vec<ExprId>, stmts: &mut Vec<StmtId>) {
        match node {
            Node::Expr(id) => {
                exprs.push(id);
                match self.expr(id) {
                    // Param nodes hang off the lambda's parameter list
                    // rather than its body, so enumerate them explicitly.
                    Expr::Func(f) => exprs.extend(f.param_exprs.iter().copied()),
                    // An `Iterated` wrapper referenced through a Var lives
                    // in a scope, not in this subtree; it is a
                    // per-iteration key, so it and its definition must
                    // copy along. Params stay shared: an enclosing loop's
                    // environment still binds them.
                    Expr::Var(v) => {
                        if let Some(target) = v.target
                            && matches!(self.expr(target), Expr::Iterated(_))
                            && !exprs.contains(&target)
                        {
                            self.collect(Node::Expr(target), exprs, stmts);
                        }
                    }
                    _ => {}
                }
            }
            Node::Stmt(id) => {
                stmts.push(id);
                match self.stmt(id) {
                    Stmt::For(s) => {
                        exprs.extend(s.index_param);
                        exprs.extend(s.value_param);
                    }
                    Stmt::ForKv(s) => {
                        exprs.extend(s.key_param);
                        exprs.extend(s.val_param);
                    }
                    _ => {}
                }
            }
        }
        let children = match node {
            Node::Expr(id) => self.expr_children(id),
            Node::Stmt(id) => self.stmt_children(id),
        };
        for child in children {
            self.collect(child, exprs, stmts);
        }
    }

    fn inherently_dynamic(&self, id: ExprId) -> bool {
        match self.expr(id) {
            Expr::Param(_) | Expr::Iterated(_) => true,
            Expr::Var(v) => v.target.is_none(),
            Expr::Call(c) => c.callee.is_none(),
            Expr::Func(f) => f.scope.is_none() && matches!(f.body, FuncCore::Lambda(_)),
            _ => false,
        }
    }

    fn expr_refs_marked(&self, id: ExprId, set: &CopySet) -> bool {
        let child_marked = self
            .expr_children(id)
            .iter()
            .any(|c| match c {
                Node::Expr(e) => set.exprs.contains(e),
                Node::Stmt(s) => set.stmts.contains(s),
            });
        if child_marked {
            return true;
        }
        match self.expr(id) {
            Expr::Var(v) => v.target.is_some_and(|t| set.exprs.contains(&t)),
            Expr::Func(f) => f.param_exprs.iter().any(|p| set.exprs.contains(p)),
            _ => false,
        }
    }

    fn stmt_refs_marked(&self, id: StmtId, set: &CopySet) -> bool {
        let child_marked = self
            .stmt_children(id)
            .iter()
            .any(|c| match c {
                Node::Expr(e) => set.exprs.contains(e),
                Node::Stmt(s) => set.stmts.contains(s),
            });
        if child_marked {
            return true;
        }
        match self.stmt(id) {
            Stmt::For(s) => s
                .index_param
                .into_iter()
                .chain(s.value_param)
                .any(|p| set.exprs.contains(&p)),
            Stmt::ForKv(s) => s
                .key_param
                .into_iter()
                .chain(s.val_param)
                .any(|p| set.exprs.contains(&p)),
            _ => false,
        }
    }

    fn copy_marked_expr(&mut self, id: ExprId, set: &CopySet, map: &mut CopyMap) -> ExprId {
        if let Some(done) = map.exprs.get(&id) {
            return *done;
        }
        if !set.exprs.contains(&id) {
            return id;
        }
        let ExprNode { expr, span, .. } = self.expr_node(id).clone();
        let typ = self.typ(id).cloned();
        let new_expr = match expr {
            Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => expr,
            Expr::List(items) => Expr::List(
                items
                    .into_iter()
                    .map(|e| self.copy_marked_expr(e, set, map))
                    .collect(),
            ),
            Expr::Map(pairs) => Expr::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (self.copy_marked_expr(k, set, map), self.copy_marked_expr(v, set, map)))
                    .collect(),
            ),
            Expr::Struct(mut fields) => {
                for f in &mut fields {
                    f.value = self.copy_marked_expr(f.value, set, map);
                }
                Expr::Struct(fields)
            }
            Expr::Func(mut func) => {
                // Copy the Param nodes first so body Vars retarget them.
                for p in &mut func.param_exprs {
                    *p = self.copy_marked_expr(*p, set, map);
                }
                if let FuncCore::Lambda(body) = func.body {
                    func.body = FuncCore::Lambda(self.copy_marked_expr(body, set, map));
                }
                Expr::Func(func)
            }
            Expr::Call(mut call) => {
                for arg in &mut call.args {
                    *arg = self.copy_marked_expr(*arg, set, map);
                }
                call.callee = call.callee.map(|c| self.copy_marked_expr(c, set, map));
                Expr::Call(call)
            }
            Expr::Var(mut var) => {
                var.target = var.target.map(|t| map.expr(t));
                Expr::Var(var)
            }
            Expr::Param(p) => Expr::Param(p),
            Expr::Iterated(mut w) => {
                w.def = self.copy_marked_expr(w.def, set, map);
                Expr::Iterated(w)
            }
            Expr::Poly(mut w) => {
                w.def = self.copy_marked_expr(w.def, set, map);
                Expr::Poly(w)
            }
            Expr::TopLevel(mut w) => {
                w.def = self.copy_marked_expr(w.def, set, map);
                Expr::TopLevel(w)
            }
            Expr::Singleton(mut w) => {
                w.def = self.copy_marked_expr(w.def, set, map);
                Expr::Singleton(w)
            }
            Expr::If(mut e) => {
                e.cond = self.copy_marked_expr(e.cond, set, map);
                e.then_ = self.copy_marked_expr(e.then_, set, map);
                e.else_ = self.copy_marked_expr(e.else_, set, map);
                Expr::If(e)
            }
        };
        let new_id = self.alloc_expr(new_expr, span);
        if let Some(t) = typ {
            // Copies made after solving carry the solved type forward; the
            // slot starts empty so this first write cannot conflict.
            self.set_type(new_id, t).expect("fresh node has no type set");
        }
        map.exprs.insert(id, new_id);
        new_id
    }

    fn copy_marked_stmt(&mut self, id: StmtId, set: &CopySet, map: &mut CopyMap) -> StmtId {
        if let Some(done) = map.stmts.get(&id) {
            return *done;
        }
        if !set.stmts.contains(&id) {
            return id;
        }
        let StmtNode { stmt, span, .. } = self.stmt_node(id).clone();
        let new_stmt = match stmt {
            Stmt::Bind(mut s) => {
                s.value = self.copy_marked_expr(s.value, set, map);
                Stmt::Bind(s)
            }
            Stmt::Func(mut s) => {
                s.func = self.copy_marked_expr(s.func, set, map);
                Stmt::Func(s)
            }
            Stmt::Class(mut s) => {
                for p in &mut s.params {
                    p.default = p.default.map(|d| self.copy_marked_expr(d, set, map));
                }
                s.body = self.copy_marked_stmt(s.body, set, map);
                Stmt::Class(s)
            }
            Stmt::Include(mut s) => {
                for arg in &mut s.args {
                    *arg = self.copy_marked_expr(*arg, set, map);
                }
                s.body = s.body.map(|b| self.copy_marked_stmt(b, set, map));
                // Copies of an include still denote the same include for
                // recursion detection.
                s.original = s.original.or(Some(id));
                Stmt::Include(s)
            }
            Stmt::Import(s) => Stmt::Import(s),
            Stmt::Res(mut s) => {
                s.name = self.copy_marked_expr(s.name, set, map);
                for content in &mut s.contents {
                    match content {
                        ResContent::Field(f) => f.value = self.copy_marked_expr(f.value, set, map),
                        ResContent::Edge(e) => e.name = self.copy_marked_expr(e.name, set, map),
                        ResContent::Meta(m) => m.value = self.copy_marked_expr(m.value, set, map),
                        ResContent::Collect(c) => c.value = self.copy_marked_expr(c.value, set, map),
                    }
                }
                Stmt::Res(s)
            }
            Stmt::Edge(mut s) => {
                for half in &mut s.halves {
                    half.name = self.copy_marked_expr(half.name, set, map);
                }
                Stmt::Edge(s)
            }
            Stmt::If(mut s) => {
                s.cond = self.copy_marked_expr(s.cond, set, map);
                s.then_ = self.copy_marked_stmt(s.then_, set, map);
                s.else_ = s.else_.map(|e| self.copy_marked_stmt(e, set, map));
                Stmt::If(s)
            }
            Stmt::For(mut s) => {
                s.expr = self.copy_marked_expr(s.expr, set, map);
                s.index_param = s.index_param.map(|p| self.copy_marked_expr(p, set, map));
                s.value_param = s.value_param.map(|p| self.copy_marked_expr(p, set, map));
                s.body = self.copy_marked_stmt(s.body, set, map);
                Stmt::For(s)
            }
            Stmt::ForKv(mut s) => {
                s.expr = self.copy_marked_expr(s.expr, set, map);
                s.key_param = s.key_param.map(|p| self.copy_marked_expr(p, set, map));
                s.val_param = s.val_param.map(|p| self.copy_marked_expr(p, set, map));
                s.body = self.copy_marked_stmt(s.body, set, map);
                Stmt::ForKv(s)
            }
            Stmt::Program(mut s) => {
                for child in &mut s.body {
                    *child = self.copy_marked_stmt(*child, set, map);
                }
                Stmt::Program(s)
            }
            Stmt::Comment(s) => Stmt::Comment(s),
        };
        let new_id = self.alloc_stmt(new_stmt, span);
        map.stmts.insert(id, new_id);
        new_id
    }
}
