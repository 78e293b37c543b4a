//! The type inference driver: `infer`/`check` over expressions, statement
//! checking, invariant emission and application of the solver's answer.
//!
//! Nothing here solves constraints. Every expression gets a type that may
//! contain unification variables, equalities between types become
//! [`Invariant`]s, and the solver collapses them. Afterwards each recorded
//! expression receives its solved ground type exactly once.

use indexmap::IndexMap;

use crate::{
    ast::{Arena, Expr, ExprId, FuncCore, Node, ResContent, Stmt, StmtId},
    context::ElaborationContext,
    errors::{LangError, LangResult, NameKind},
    speculate::builtin_name,
    types::Type,
    unify::Invariant,
};

/// Runs type checking over an elaborated program: emits invariants, runs
/// the solver, and writes the solved types back onto the AST.
pub fn type_check(arena: &mut Arena, ctx: &mut ElaborationContext, program: StmtId) -> LangResult<()> {
    let mut pass = TypeCheck {
        arena,
        ctx,
        invariants: Vec::new(),
        types: IndexMap::new(),
    };
    pass.check_stmt(program)?;
    let TypeCheck {
        arena, ctx, invariants, types, ..
    } = pass;

    let subst = ctx.solver.solve(&invariants, arena)?;
    for (expr, typ) in types {
        let resolved = subst.apply(&typ);
        if !resolved.is_ground() {
            return Err(LangError::unification(
                format!("ambiguous type `{resolved}` for `{}`", arena.expr_string(expr)),
                arena.expr_span(expr),
            ));
        }
        arena.set_type(expr, resolved)?;
    }
    Ok(())
}

struct TypeCheck<'a> {
    arena: &'a mut Arena,
    ctx: &'a mut ElaborationContext,
    invariants: Vec<Invariant>,
    /// Pre-solve type of every visited expression, in visit order. Shared
    /// nodes (singleton wrappers) are recorded once and reused, which is
    /// what makes a top-level binding monomorphic across its use sites.
    types: IndexMap<ExprId, Type>,
}

impl TypeCheck<'_> {
    /// The generic check: infer, then require the inferred type to unify
    /// with the expected one.
    fn check_expr(&mut self, id: ExprId, expected: Type) -> LangResult<()> {
        let actual = self.infer_expr(id)?;
        self.invariants.push(Invariant {
            node: Node::Expr(id),
            expr: id,
            expect: expected,
            actual,
        });
        Ok(())
    }

    fn infer_expr(&mut self, id: ExprId) -> LangResult<Type> {
        if let Some(t) = self.types.get(&id) {
            return Ok(t.clone());
        }
        let span = self.arena.expr_span(id);
        let typ = match self.arena.expr(id).clone() {
            Expr::Bool(_) => self.constant(id, Type::Bool),
            Expr::Str(_) => self.constant(id, Type::Str),
            Expr::Int(_) => self.constant(id, Type::Int),
            Expr::Float(_) => self.constant(id, Type::Float),
            Expr::List(items) => {
                let elem = self.ctx.fresh_var();
                self.types.insert(id, Type::list_of(elem.clone()));
                for item in items {
                    self.check_expr(item, elem.clone())?;
                }
                Type::list_of(elem)
            }
            Expr::Map(pairs) => {
                let key = self.ctx.fresh_var();
                let val = self.ctx.fresh_var();
                self.types.insert(id, Type::map_of(key.clone(), val.clone()));
                for (k, v) in pairs {
                    self.check_expr(k, key.clone())?;
                    self.check_expr(v, val.clone())?;
                }
                Type::map_of(key, val)
            }
            Expr::Struct(fields) => {
                let mut out = IndexMap::with_capacity(fields.len());
                for f in &fields {
                    let ft = self.ctx.fresh_var();
                    out.insert(f.name.clone(), ft.clone());
                }
                self.types.insert(id, Type::Struct(out.clone()));
                for f in &fields {
                    self.check_expr(f.value, out[&f.name].clone())?;
                }
                Type::Struct(out)
            }
            Expr::Var(v) => {
                let target = v
                    .target
                    .ok_or_else(|| LangError::unresolved(NameKind::Variable, &v.name, span))?;
                let t = self.infer_expr(target)?;
                self.types.insert(id, t.clone());
                t
            }
            Expr::Param(_) => {
                // Parameter types are seeded by the enclosing lambda or
                // loop; a miss means the parameter is checked standalone.
                let t = self.ctx.fresh_var();
                self.types.insert(id, t.clone());
                t
            }
            Expr::Iterated(w) => self.delegate(id, w.def)?,
            Expr::TopLevel(w) => self.delegate(id, w.def)?,
            Expr::Singleton(w) => self.delegate(id, w.def)?,
            Expr::Poly(w) => self.delegate(id, w.def)?,
            Expr::If(e) => {
                let t = self.ctx.fresh_var();
                self.types.insert(id, t.clone());
                self.check_expr(e.cond, Type::Bool)?;
                self.check_expr(e.then_, t.clone())?;
                self.check_expr(e.else_, t.clone())?;
                t
            }
            Expr::Func(func) => {
                match &func.body {
                    FuncCore::Lambda(body) => {
                        let mut args = Vec::with_capacity(func.params.len());
                        for (param, pexpr) in func.params.iter().zip(&func.param_exprs) {
                            let pt = param.typ.clone().unwrap_or_else(|| self.ctx.fresh_var());
                            self.types.insert(*pexpr, pt.clone());
                            args.push((param.name.clone(), pt));
                        }
                        let ret = self.ctx.fresh_var();
                        let t = Type::Func {
                            args,
                            ret: Box::new(ret.clone()),
                        };
                        self.types.insert(id, t.clone());
                        self.check_expr(*body, ret.clone())?;
                        if let Some(declared) = &func.ret {
                            self.invariants.push(Invariant {
                                node: Node::Expr(id),
                                expr: *body,
                                expect: declared.clone(),
                                actual: ret,
                            });
                        }
                        t
                    }
                    FuncCore::Builtin(name) => {
                        let b = self.ctx.funcs.instantiate(name, span)?;
                        let t = b.info().sig.unwrap_or_else(|| self.ctx.fresh_var());
                        self.types.insert(id, t.clone());
                        t
                    }
                }
            }
            Expr::Call(call) => {
                let callee = call
                    .callee
                    .ok_or_else(|| LangError::unresolved(NameKind::Function, &call.name, span))?;
                let mut arg_types = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    arg_types.push(self.infer_expr(*arg)?);
                }
                let out = self.ctx.fresh_var();
                self.types.insert(id, out.clone());

                // The call site's view of the callee's type, with fresh
                // variables wherever nothing is known yet.
                let named_args: Vec<(String, Type)> = arg_types
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (format!("a{i}"), t.clone()))
                    .collect();
                let expected = Type::Func {
                    args: named_args,
                    ret: Box::new(out.clone()),
                };

                if let Some(bname) = builtin_name(self.arena, callee) {
                    let b = self.ctx.funcs.instantiate(&bname, span)?;
                    if let Some((sig, extra)) = b.func_infer(&expected, id) {
                        self.invariants.extend(extra);
                        self.invariants.push(Invariant {
                            node: Node::Expr(id),
                            expr: id,
                            expect: expected.clone(),
                            actual: sig,
                        });
                        self.types.insert(callee, expected);
                        out
                    } else {
                        self.check_expr(callee, expected)?;
                        out
                    }
                } else {
                    self.check_expr(callee, expected)?;
                    out
                }
            }
        };
        Ok(typ)
    }

    /// Constants infer to their ground type and emit a self-invariant so
    /// the solver's answer is attached to the node.
    fn constant(&mut self, id: ExprId, t: Type) -> Type {
        self.types.insert(id, t.clone());
        self.invariants.push(Invariant {
            node: Node::Expr(id),
            expr: id,
            expect: t.clone(),
            actual: t.clone(),
        });
        t
    }

    fn delegate(&mut self, id: ExprId, def: ExprId) -> LangResult<Type> {
        let t = self.infer_expr(def)?;
        self.types.insert(id, t.clone());
        Ok(t)
    }

    fn check_stmt(&mut self, id: StmtId) -> LangResult<()> {
        if self.arena.is_pruned(id) {
            return Ok(());
        }
        let span = self.arena.stmt_span(id);
        match self.arena.stmt(id).clone() {
            Stmt::Program(s) => {
                for child in s.body {
                    self.check_stmt(child)?;
                }
                Ok(())
            }
            // Polymorphic definitions are checked per call-site copy, and
            // class bodies per include instantiation.
            Stmt::Func(_) | Stmt::Class(_) | Stmt::Import(_) | Stmt::Comment(_) => Ok(()),
            Stmt::Bind(s) => {
                let t = self.infer_expr(s.value)?;
                if let Some(declared) = s.typ {
                    self.invariants.push(Invariant {
                        node: Node::Stmt(id),
                        expr: s.value,
                        expect: declared,
                        actual: t,
                    });
                }
                Ok(())
            }
            Stmt::Include(s) => {
                for arg in s.args {
                    self.infer_expr(arg)?;
                }
                match s.body {
                    Some(body) => self.check_stmt(body),
                    None => Ok(()),
                }
            }
            Stmt::Res(s) => {
                if !self.ctx.kinds.is_kind(&s.kind) {
                    return Err(LangError::type_error(format!("unknown resource kind `{}`", s.kind), span));
                }
                self.check_res_name(s.name)?;
                let field_types = self.ctx.kinds.field_types(&s.kind).unwrap_or_default();
                for content in &s.contents {
                    match content {
                        ResContent::Field(f) => {
                            let expected = field_types.get(&f.name).cloned().ok_or_else(|| {
                                LangError::type_error(
                                    format!("kind `{}` has no field `{}`", s.kind, f.name),
                                    span,
                                )
                            })?;
                            self.check_expr(f.value, expected)?;
                        }
                        ResContent::Edge(e) => {
                            if !self.ctx.kinds.is_kind(&e.kind) {
                                return Err(LangError::type_error(
                                    format!("unknown resource kind `{}`", e.kind),
                                    span,
                                ));
                            }
                            self.check_res_name(e.name)?;
                        }
                        ResContent::Meta(m) => {
                            let expected = meta_expected(&m.property);
                            match expected {
                                Some(t) => self.check_expr(m.value, t)?,
                                None => {
                                    self.infer_expr(m.value)?;
                                }
                            }
                        }
                        ResContent::Collect(c) => {
                            self.infer_expr(c.value)?;
                        }
                    }
                }
                Ok(())
            }
            Stmt::Edge(s) => {
                for half in &s.halves {
                    if !self.ctx.kinds.is_kind(&half.kind) {
                        return Err(LangError::type_error(
                            format!("unknown resource kind `{}`", half.kind),
                            span,
                        ));
                    }
                    self.check_res_name(half.name)?;
                }
                // Send/recv compatibility is decided from the registry and
                // raised locally, not delegated to the solver.
                for pair in s.halves.windows(2) {
                    let (h1, h2) = (&pair[0], &pair[1]);
                    if let (Some(send_field), Some(recv_field)) = (&h1.field, &h2.field) {
                        let sends = self.ctx.kinds.sends(&h1.kind).ok_or_else(|| {
                            LangError::type_error(format!("kind `{}` cannot send", h1.kind), span)
                        })?;
                        let ts = sends.get(send_field).ok_or_else(|| {
                            LangError::type_error(
                                format!("kind `{}` has no send field `{send_field}`", h1.kind),
                                span,
                            )
                        })?;
                        let recvs = self.ctx.kinds.recvs(&h2.kind).ok_or_else(|| {
                            LangError::type_error(format!("kind `{}` cannot recv", h2.kind), span)
                        })?;
                        let tr = recvs.get(recv_field).ok_or_else(|| {
                            LangError::type_error(
                                format!("kind `{}` has no recv field `{recv_field}`", h2.kind),
                                span,
                            )
                        })?;
                        if !ts.unify_cmp(tr) {
                            return Err(LangError::type_error(
                                format!(
                                    "send field `{send_field}` of `{}` and recv field `{recv_field}` of `{}` are incompatible: `{ts}` vs `{tr}`",
                                    h1.kind, h2.kind
                                ),
                                span,
                            ));
                        }
                    }
                }
                Ok(())
            }
            Stmt::If(s) => {
                self.check_expr(s.cond, Type::Bool)?;
                self.check_stmt(s.then_)?;
                if let Some(e) = s.else_ {
                    self.check_stmt(e)?;
                }
                Ok(())
            }
            Stmt::For(s) => {
                let elem = self.ctx.fresh_var();
                self.check_expr(s.expr, Type::list_of(elem.clone()))?;
                if let Some(p) = s.index_param {
                    self.types.insert(p, Type::Int);
                }
                if let Some(p) = s.value_param {
                    self.types.insert(p, elem);
                }
                self.check_stmt(s.body)
            }
            Stmt::ForKv(s) => {
                let key = self.ctx.fresh_var();
                let val = self.ctx.fresh_var();
                self.check_expr(s.expr, Type::map_of(key.clone(), val.clone()))?;
                if let Some(p) = s.key_param {
                    self.types.insert(p, key);
                }
                if let Some(p) = s.val_param {
                    self.types.insert(p, val);
                }
                self.check_stmt(s.body)
            }
        }
    }

    /// A resource name is `str` or `list<str>`; static shape analysis
    /// constrains it when a literal decides, and otherwise the name type
    /// is left to the solver with output emission validating the value.
    fn check_res_name(&mut self, name: ExprId) -> LangResult<()> {
        match static_name_shape(self.arena, name) {
            Some(NameShape::Single) => self.check_expr(name, Type::Str),
            Some(NameShape::Many) => self.check_expr(name, Type::list_of(Type::Str)),
            None => {
                self.infer_expr(name)?;
                Ok(())
            }
        }
    }
}

enum NameShape {
    Single,
    Many,
}

/// Looks through delegating forms for a literal that pins the name shape.
fn static_name_shape(arena: &Arena, mut id: ExprId) -> Option<NameShape> {
    loop {
        match arena.expr(id) {
            Expr::Str(_) => return Some(NameShape::Single),
            Expr::List(_) => return Some(NameShape::Many),
            Expr::Var(v) => id = v.target?,
            Expr::TopLevel(w) => id = w.def,
            Expr::Singleton(w) => id = w.def,
            Expr::Iterated(w) => id = w.def,
            _ => return None,
        }
    }
}

/// Expected type of a directly assigned meta property, when it is fixed.
/// `sema`, `export` and the aggregate accept more than one shape and are
/// validated at output time instead.
fn meta_expected(property: &str) -> Option<Type> {
    match property {
        "noop" | "retryreset" | "reset" | "rewatch" | "realize" | "dollar" | "hidden" | "reverse" | "autoedge"
        | "autogroup" => Some(Type::Bool),
        "retry" | "delay" | "poll" | "burst" => Some(Type::Int),
        "limit" => Some(Type::Float),
        _ => None,
    }
}
