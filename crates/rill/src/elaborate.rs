//! Scope resolution: the pass that binds every name to its definition,
//! follows imports, instantiates classes, and inserts the elaboration
//! wrappers (`TopLevel`, `Singleton`, `Poly`, `Iterated`, `Param`) that
//! later passes key environments on.
//!
//! Statements are processed in the deterministic topological order the
//! ordering pass produced, so a definition is always bound before its
//! consumers run, regardless of source order. Statements the ordering
//! graph proved unreachable are skipped entirely: dead code contributes
//! neither FG vertices nor output.

use ahash::{AHashMap, AHashSet};

use crate::{
    ast::{Arena, CopyMap, Expr, ExprId, FuncCore, IteratedExpr, ParamExpr, PolyExpr, ResContent, SingletonExpr,
          Stmt, StmtId, TopLevelExpr},
    context::ElaborationContext,
    errors::{LangError, LangResult, NameKind},
    imports::{self, parse_import_name, ImportData, ImportSource},
    ordering::order_program,
    scope::Scope,
    span::SrcSpan,
};

/// Result of scoping one program.
#[derive(Debug, Clone)]
pub struct ScopeResult {
    /// The working scope after every statement: the parent scope plus all
    /// local additions. Captured by later definitions.
    pub scope: Scope,
    /// Only the names this program's own statements bound. This is what a
    /// module exports and what an aliased include re-exports.
    pub exports: Scope,
}

/// Resolves names across a whole program against a parent scope, pruning
/// statements unreachable from any consumer.
pub fn set_scope(
    arena: &mut Arena,
    ctx: &mut ElaborationContext,
    program: StmtId,
    parent: &Scope,
) -> LangResult<ScopeResult> {
    set_scope_with(arena, ctx, program, parent, true)
}

/// As [`set_scope`], but `prune: false` keeps unconsumed producers alive.
/// Module programs and class bodies export their bindings, so consumers
/// may sit outside the program being ordered.
pub(crate) fn set_scope_with(
    arena: &mut Arena,
    ctx: &mut ElaborationContext,
    program: StmtId,
    parent: &Scope,
    prune: bool,
) -> LangResult<ScopeResult> {
    let parent_keys = scope_keys(parent);
    let ordering = order_program(arena, program, &parent_keys)?;
    if prune {
        for stmt in &ordering.pruned {
            arena.set_pruned(*stmt, true);
        }
    }

    let mut work = parent.clone();
    let mut exports = Scope::new();
    exports.iterated = work.iterated;

    // Imports are processed first, in source order.
    let children: Vec<StmtId> = match arena.stmt(program) {
        Stmt::Program(p) => p.body.clone(),
        _ => {
            return Err(LangError::graph("set_scope requires a program node", arena.stmt_span(program)));
        }
    };
    for child in &children {
        if let Stmt::Import(import) = arena.stmt(*child).clone() {
            process_import(arena, ctx, *child, &import, &mut work, &mut exports)?;
        }
    }

    for stmt in ordering.order {
        if prune && ordering.pruned.contains(&stmt) {
            continue;
        }
        set_scope_stmt(arena, ctx, stmt, &mut work, &mut exports)?;
    }
    Ok(ScopeResult { scope: work, exports })
}

fn set_scope_stmt(
    arena: &mut Arena,
    ctx: &mut ElaborationContext,
    id: StmtId,
    work: &mut Scope,
    exports: &mut Scope,
) -> LangResult<()> {
    let span = arena.stmt_span(id);
    ctx.tracer.on_scope_stmt(stmt_kind_name(arena.stmt(id)));
    match arena.stmt(id).clone() {
        Stmt::Import(_) | Stmt::Comment(_) => Ok(()),
        Stmt::Bind(s) => {
            let mut sctx = Vec::new();
            set_scope_expr(arena, ctx, s.value, work, &mut sctx)?;
            let wrapped = wrap_binding(arena, s.value, &s.name, work, span);
            // The exports scope holds exactly this program's own names
            // (flattened imports included), so the checked bind enforces
            // the per-scope duplicate invariant; the working scope also
            // carries inherited names, which a local binding may shadow.
            exports.bind_var(&s.name, wrapped, span)?;
            work.shadow_var(&s.name, wrapped);
            Ok(())
        }
        Stmt::Func(s) => {
            // The definition stays unscoped: every call site copies it and
            // scopes the copy, which is what lets one definition admit a
            // different monomorphic type per call site.
            let captured = arena.alloc_scope(work.clone());
            let toplevel = arena.alloc_expr(
                Expr::TopLevel(TopLevelExpr {
                    def: s.func,
                    scope: captured,
                }),
                span,
            );
            let poly = arena.alloc_expr(Expr::Poly(PolyExpr { def: toplevel }), span);
            exports.bind_func(&s.name, poly, span)?;
            work.shadow_func(&s.name, poly);
            Ok(())
        }
        Stmt::Class(s) => {
            // Bind the class before capturing, so a class body can include
            // its own class and run into the recursion check rather than
            // an unresolved name.
            exports.bind_class(&s.name, id, span)?;
            work.shadow_class(&s.name, id);
            let captured = arena.alloc_scope(work.clone());
            if let Stmt::Class(class) = arena.stmt_mut(id) {
                class.scope = Some(captured);
            }
            Ok(())
        }
        Stmt::Include(s) => process_include(arena, ctx, id, &s, work, exports),
        Stmt::Res(s) => {
            let mut sctx = Vec::new();
            set_scope_expr(arena, ctx, s.name, work, &mut sctx)?;
            for content in &s.contents {
                let value = match content {
                    ResContent::Field(f) => f.value,
                    ResContent::Edge(e) => e.name,
                    ResContent::Meta(m) => m.value,
                    ResContent::Collect(c) => c.value,
                };
                set_scope_expr(arena, ctx, value, work, &mut sctx)?;
            }
            Ok(())
        }
        Stmt::Edge(s) => {
            let mut sctx = Vec::new();
            for half in &s.halves {
                set_scope_expr(arena, ctx, half.name, work, &mut sctx)?;
            }
            Ok(())
        }
        Stmt::If(s) => {
            let mut sctx = Vec::new();
            set_scope_expr(arena, ctx, s.cond, work, &mut sctx)?;
            set_scope(arena, ctx, s.then_, work)?;
            if let Some(e) = s.else_ {
                set_scope(arena, ctx, e, work)?;
            }
            Ok(())
        }
        Stmt::For(s) => {
            let mut sctx = Vec::new();
            set_scope_expr(arena, ctx, s.expr, work, &mut sctx)?;
            let ip = arena.alloc_expr(Expr::Param(ParamExpr { name: s.index.clone() }), span);
            let vp = arena.alloc_expr(Expr::Param(ParamExpr { name: s.value.clone() }), span);
            if let Stmt::For(f) = arena.stmt_mut(id) {
                f.index_param = Some(ip);
                f.value_param = Some(vp);
            }
            let mut body_scope = work.clone();
            body_scope.iterated = true;
            body_scope.shadow_var(&s.index, ip);
            body_scope.shadow_var(&s.value, vp);
            set_scope(arena, ctx, s.body, &body_scope)?;
            Ok(())
        }
        Stmt::ForKv(s) => {
            let mut sctx = Vec::new();
            set_scope_expr(arena, ctx, s.expr, work, &mut sctx)?;
            let kp = arena.alloc_expr(Expr::Param(ParamExpr { name: s.key.clone() }), span);
            let vp = arena.alloc_expr(Expr::Param(ParamExpr { name: s.val.clone() }), span);
            if let Stmt::ForKv(f) = arena.stmt_mut(id) {
                f.key_param = Some(kp);
                f.val_param = Some(vp);
            }
            let mut body_scope = work.clone();
            body_scope.iterated = true;
            body_scope.shadow_var(&s.key, kp);
            body_scope.shadow_var(&s.val, vp);
            set_scope(arena, ctx, s.body, &body_scope)?;
            Ok(())
        }
        Stmt::Program(_) => {
            set_scope(arena, ctx, id, work)?;
            Ok(())
        }
    }
}

/// A top-level binding wraps in `TopLevel(Singleton(·))`; inside a loop
/// body it wraps in `Iterated` instead, giving each iteration its own FG.
fn wrap_binding(arena: &mut Arena, value: ExprId, name: &str, site: &Scope, span: SrcSpan) -> ExprId {
    if site.iterated {
        arena.alloc_expr(
            Expr::Iterated(IteratedExpr {
                name: name.to_owned(),
                def: value,
            }),
            span,
        )
    } else {
        let captured = arena.alloc_scope(site.clone());
        let singleton = arena.alloc_expr(Expr::Singleton(SingletonExpr { def: value }), span);
        arena.alloc_expr(
            Expr::TopLevel(TopLevelExpr {
                def: singleton,
                scope: captured,
            }),
            span,
        )
    }
}

fn stmt_kind_name(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::Bind(_) => "bind",
        Stmt::Func(_) => "func",
        Stmt::Class(_) => "class",
        Stmt::Include(_) => "include",
        Stmt::Import(_) => "import",
        Stmt::Res(_) => "res",
        Stmt::Edge(_) => "edge",
        Stmt::If(_) => "if",
        Stmt::For(_) => "for",
        Stmt::ForKv(_) => "forkv",
        Stmt::Program(_) => "program",
        Stmt::Comment(_) => "comment",
    }
}

fn process_include(
    arena: &mut Arena,
    ctx: &mut ElaborationContext,
    id: StmtId,
    include: &crate::ast::IncludeStmt,
    work: &mut Scope,
    exports: &mut Scope,
) -> LangResult<()> {
    let span = arena.stmt_span(id);
    let class_id = work
        .class(&include.name)
        .ok_or_else(|| LangError::unresolved(NameKind::Class, &include.name, span))?;
    let class = match arena.stmt(class_id).clone() {
        Stmt::Class(c) => c,
        _ => {
            return Err(LangError::structural(
                format!("`{}` does not name a class", include.name),
                span,
            ));
        }
    };

    // An include whose original is already on the chain is including
    // itself, however many copies deep.
    let original = include.original.unwrap_or(id);
    if work.chain.contains(&original) {
        return Err(LangError::RecursiveClass {
            name: include.name.clone(),
            span,
        });
    }

    if include.args.len() > class.params.len() {
        return Err(LangError::structural(
            format!(
                "include `{}` passes {} arguments but the class takes {}",
                include.name,
                include.args.len(),
                class.params.len()
            ),
            span,
        ));
    }

    let mut sctx = Vec::new();
    for arg in &include.args {
        set_scope_expr(arena, ctx, *arg, work, &mut sctx)?;
    }

    let class_scope_id = class
        .scope
        .ok_or_else(|| LangError::graph("class reached include before being scoped", span))?;
    let mut new_scope = arena.scope(class_scope_id).clone();
    new_scope.chain = work.chain.clone();
    new_scope.chain.push(original);
    new_scope.iterated = new_scope.iterated || work.iterated;

    for (i, param) in class.params.iter().enumerate() {
        let arg = if let Some(arg) = include.args.get(i) {
            *arg
        } else if let Some(default) = param.default {
            // Defaults evaluate in the class's definition scope, and each
            // include gets its own copy.
            let mut map = CopyMap::default();
            let copied = arena.copy_expr(default, &mut map);
            let class_scope = arena.scope(class_scope_id).clone();
            set_scope_expr(arena, ctx, copied, &class_scope, &mut Vec::new())?;
            copied
        } else {
            return Err(LangError::structural(
                format!("include `{}` is missing argument `{}`", include.name, param.name),
                span,
            ));
        };
        let wrapped = if new_scope.iterated {
            arena.alloc_expr(
                Expr::Iterated(IteratedExpr {
                    name: param.name.clone(),
                    def: arg,
                }),
                span,
            )
        } else {
            // The argument evaluates at the include site, so the wrapper
            // captures the include-site scope.
            wrap_binding(arena, arg, &param.name, work, span)
        };
        // A parameter opens a fresh lexical frame and may shadow a
        // definition-site binding of the same name.
        new_scope.shadow_var(&param.name, wrapped);
    }

    let mut map = CopyMap::default();
    let body_copy = arena.copy_stmt(class.body, &mut map);
    // Class bodies export through aliased includes, so nothing is pruned.
    let result = set_scope_with(arena, ctx, body_copy, &new_scope, false)?;

    if let Stmt::Include(inc) = arena.stmt_mut(id) {
        inc.class = Some(class_id);
        inc.body = Some(body_copy);
    }

    if let Some(alias) = &include.alias {
        work.merge(&result.exports, Some(alias), span)?;
        exports.merge(&result.exports, Some(alias), span)?;
    }
    Ok(())
}

fn process_import(
    arena: &mut Arena,
    ctx: &mut ElaborationContext,
    id: StmtId,
    import: &crate::ast::ImportStmt,
    work: &mut Scope,
    exports: &mut Scope,
) -> LangResult<()> {
    let span = arena.stmt_span(id);
    let data = parse_import_name(&import.name, span)?;
    let alias = match import.alias.as_deref() {
        Some("*") => {
            if !ctx.allow_bare_imports {
                return Err(LangError::import("bare imports are disabled", span));
            }
            None
        }
        Some(a) => Some(a.to_owned()),
        None => Some(data.alias.clone()),
    };

    let current = ctx.current_module().to_owned();
    ctx.imports.add_import(&current, &data.name, span)?;

    let scope = if let Some(cached) = ctx.module_cache.get(&data.name) {
        cached.clone()
    } else {
        let resolved = resolve_module_scope(arena, ctx, &data, span)?;
        ctx.module_cache.insert(data.name.clone(), resolved.clone());
        resolved
    };

    work.merge(&scope, alias.as_deref(), span)?;
    exports.merge(&scope, alias.as_deref(), span)?;
    Ok(())
}

fn resolve_module_scope(
    arena: &mut Arena,
    ctx: &mut ElaborationContext,
    data: &ImportData,
    span: SrcSpan,
) -> LangResult<Scope> {
    let base = ctx.current_base().to_owned();
    let modules_path = ctx.modules_path.clone();
    let source = imports::resolve(
        data,
        &ctx.modules,
        ctx.fs.as_ref(),
        &base,
        &modules_path,
        ctx.downloader.as_deref_mut(),
        span,
    )?;
    match source {
        ImportSource::Registered(program) => {
            ctx.tracer.on_import(&data.name, "registered module");
            elaborate_module(arena, ctx, data, program, String::new())
        }
        ImportSource::SystemText(text) => {
            ctx.tracer.on_import(&data.name, "embedded system module");
            let program = parse_with_collaborator(arena, ctx, &data.name, &text, span)?;
            elaborate_module(arena, ctx, data, program, String::new())
        }
        ImportSource::SystemBuiltins => {
            let scope = ctx
                .funcs
                .scope_for_prefix(&data.name, arena, span)
                .ok_or_else(|| LangError::import(format!("unknown system import `{}`", data.name), span))?;
            ctx.tracer.on_import(&data.name, "builtin prefix");
            Ok(scope)
        }
        ImportSource::File(path) => {
            ctx.tracer.on_import(&data.name, &path);
            let text = ctx
                .fs
                .read(&path)
                .ok_or_else(|| LangError::import(format!("cannot read `{path}`"), span))?;
            let program = parse_with_collaborator(arena, ctx, &path, &text, span)?;
            let dir = path.rsplit_once('/').map(|(d, _)| d.to_owned()).unwrap_or_default();
            elaborate_module(arena, ctx, data, program, dir)
        }
    }
}

fn parse_with_collaborator(
    arena: &mut Arena,
    ctx: &mut ElaborationContext,
    name: &str,
    text: &str,
    span: SrcSpan,
) -> LangResult<StmtId> {
    let Some(parser) = ctx.parser.as_ref() else {
        return Err(LangError::import(
            format!("module `{name}` needs the parser collaborator, which is not configured"),
            span,
        ));
    };
    let file = arena.add_file(name);
    parser.lex_parse(text, file, arena)
}

/// Runs the front half of the pipeline over an imported module and returns
/// its exported scope.
fn elaborate_module(
    arena: &mut Arena,
    ctx: &mut ElaborationContext,
    data: &ImportData,
    program: StmtId,
    base: String,
) -> LangResult<Scope> {
    ctx.push_module(data.name.clone(), base);
    let result = (|| {
        arena.init(program)?;
        arena.interpolate_stmt(program, true)?;
        // A module's top-level producers are its exports; keep them all.
        set_scope_with(arena, ctx, program, &Scope::new(), false)
    })();
    ctx.pop_module();
    Ok(result?.exports)
}

/// Resolves names for one expression subtree.
///
/// `sctx` is the surrounding lexical context: one frame of parameter
/// bindings per enclosing lambda, searched innermost first before the
/// scope proper.
pub fn set_scope_expr(
    arena: &mut Arena,
    ctx: &mut ElaborationContext,
    id: ExprId,
    scope: &Scope,
    sctx: &mut Vec<AHashMap<String, ExprId>>,
) -> LangResult<()> {
    let span = arena.expr_span(id);
    match arena.expr(id).clone() {
        Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Param(_) => Ok(()),
        Expr::Var(v) => {
            if v.target.is_some() {
                return Ok(());
            }
            let target = resolve_var(&v.name, scope, sctx)
                .ok_or_else(|| LangError::unresolved(NameKind::Variable, &v.name, span))?;
            if let Expr::Var(var) = arena.expr_mut(id) {
                var.target = Some(target);
            }
            Ok(())
        }
        Expr::Call(call) => {
            if call.callee.is_some() {
                return Ok(());
            }
            for arg in &call.args {
                set_scope_expr(arena, ctx, *arg, scope, sctx)?;
            }
            let callee = if call.var_call {
                resolve_var(&call.name, scope, sctx)
                    .ok_or_else(|| LangError::unresolved(NameKind::Variable, &call.name, span))?
            } else if let Some(fexpr) = scope.func(&call.name) {
                match arena.expr(fexpr).clone() {
                    // A polymorphic definition: every call site scopes its
                    // own copy, and that copy gets this site's type.
                    Expr::Poly(poly) => {
                        let mut map = CopyMap::default();
                        let copied = arena.copy_expr(poly.def, &mut map);
                        set_scope_expr(arena, ctx, copied, scope, sctx)?;
                        copied
                    }
                    // A builtin binding from an imported scope: builtins
                    // specialise per call site, so take a fresh node.
                    Expr::Func(func) if matches!(func.body, FuncCore::Builtin(_)) => {
                        arena.alloc_expr(Expr::Func(func), span)
                    }
                    _ => fexpr,
                }
            } else if ctx.funcs.contains(&call.name) {
                let func = crate::ast::FuncExpr {
                    params: Vec::new(),
                    ret: None,
                    body: FuncCore::Builtin(call.name.clone()),
                    scope: None,
                    param_exprs: Vec::new(),
                };
                arena.alloc_expr(Expr::Func(func), span)
            } else {
                return Err(LangError::unresolved(NameKind::Function, &call.name, span));
            };
            if let Expr::Call(c) = arena.expr_mut(id) {
                c.callee = Some(callee);
            }
            Ok(())
        }
        Expr::Func(func) => {
            if func.scope.is_some() {
                return Ok(());
            }
            match &func.body {
                FuncCore::Builtin(_) => Ok(()),
                FuncCore::Lambda(body) => {
                    let body = *body;
                    let mut frame = AHashMap::with_capacity(func.params.len());
                    let mut param_exprs = Vec::with_capacity(func.params.len());
                    for p in &func.params {
                        let pe = arena.alloc_expr(Expr::Param(ParamExpr { name: p.name.clone() }), span);
                        frame.insert(p.name.clone(), pe);
                        param_exprs.push(pe);
                    }
                    let captured = arena.alloc_scope(scope.clone());
                    if let Expr::Func(f) = arena.expr_mut(id) {
                        f.scope = Some(captured);
                        f.param_exprs = param_exprs;
                    }
                    sctx.push(frame);
                    let result = set_scope_expr(arena, ctx, body, scope, sctx);
                    sctx.pop();
                    result
                }
            }
        }
        Expr::List(items) => {
            for item in items {
                set_scope_expr(arena, ctx, item, scope, sctx)?;
            }
            Ok(())
        }
        Expr::Map(pairs) => {
            for (k, v) in pairs {
                set_scope_expr(arena, ctx, k, scope, sctx)?;
                set_scope_expr(arena, ctx, v, scope, sctx)?;
            }
            Ok(())
        }
        Expr::Struct(fields) => {
            for f in fields {
                set_scope_expr(arena, ctx, f.value, scope, sctx)?;
            }
            Ok(())
        }
        Expr::If(e) => {
            set_scope_expr(arena, ctx, e.cond, scope, sctx)?;
            set_scope_expr(arena, ctx, e.then_, scope, sctx)?;
            set_scope_expr(arena, ctx, e.else_, scope, sctx)
        }
        // The definition-site scope wins over the use-site one.
        Expr::TopLevel(w) => {
            let captured = arena.scope(w.scope).clone();
            set_scope_expr(arena, ctx, w.def, &captured, &mut Vec::new())
        }
        Expr::Singleton(w) => set_scope_expr(arena, ctx, w.def, scope, sctx),
        Expr::Poly(w) => set_scope_expr(arena, ctx, w.def, scope, sctx),
        Expr::Iterated(w) => set_scope_expr(arena, ctx, w.def, scope, sctx),
    }
}

/// Innermost lexical frame first, then the scope.
fn resolve_var(name: &str, scope: &Scope, sctx: &[AHashMap<String, ExprId>]) -> Option<ExprId> {
    for frame in sctx.iter().rev() {
        if let Some(id) = frame.get(name) {
            return Some(*id);
        }
    }
    scope.var(name)
}

/// The namespaced keys a parent scope already satisfies.
fn scope_keys(scope: &Scope) -> AHashSet<String> {
    let mut keys = AHashSet::new();
    for name in scope.variables.keys() {
        keys.insert(format!("var:{name}"));
    }
    for name in scope.functions.keys() {
        keys.insert(format!("func:{name}"));
    }
    for name in scope.classes.keys() {
        keys.insert(format!("class:{name}"));
    }
    keys
}
