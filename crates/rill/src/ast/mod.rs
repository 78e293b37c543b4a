//! The AST data model: an arena of statements and expressions addressed by
//! index newtypes.
//!
//! Node identity is the arena index. The elaboration passes use indices as
//! map keys (environments, singleton memos) and for cycle detection (include
//! chains), so a node's index is semantically significant and is never
//! reused. Scopes live in the same arena; expressions reference scopes and
//! scopes reference expressions, and the arena breaks that cycle by making
//! both sides own indices only.
//!
//! Nodes are immutable after elaboration except for two slots written late:
//! the solver-set type and the FG vertex back-reference consulted by output
//! emission.

mod copy;
mod interpolate;

pub use copy::CopyMap;

use smallvec::SmallVec;

use crate::{
    errors::{LangError, LangResult, NameKind},
    fg::VertexId,
    output::MetaProp,
    scope::Scope,
    span::{FileId, SrcSpan},
    types::Type,
};

/// Index of an expression in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ExprId(u32);

/// Index of a statement in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct StmtId(u32);

/// Index of a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScopeId(u32);

impl ExprId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl StmtId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ScopeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Either kind of node, for the generic visitor and for invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Node {
    Expr(ExprId),
    Stmt(StmtId),
}

/// An expression variant.
///
/// The five wrapper variants (`Param`, `Iterated`, `Poly`, `TopLevel`,
/// `Singleton`) are introduced during scope resolution and never written by
/// the user.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ExprId>),
    Map(Vec<(ExprId, ExprId)>),
    Struct(Vec<StructField>),
    Func(FuncExpr),
    Call(CallExpr),
    Var(VarExpr),
    /// Placeholder for a lambda parameter; its index is the environment key
    /// the engine binds argument vertices to.
    Param(ParamExpr),
    /// Wraps a definition living inside a for/forkv body; its index is the
    /// per-iteration environment key.
    Iterated(IteratedExpr),
    /// Wraps a top-level function definition; each call site takes a fresh
    /// copy so the same definition admits different monomorphic types.
    Poly(PolyExpr),
    /// Wraps a top-level binding with its definition-site scope.
    TopLevel(TopLevelExpr),
    /// Guarantees the wrapped definition materialises to one FG vertex no
    /// matter how many use sites reference it.
    Singleton(SingletonExpr),
    If(IfExpr),
}

/// One named field of a struct literal.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StructField {
    pub name: String,
    pub value: ExprId,
}

/// A typed lambda parameter as written in the source.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuncParam {
    pub name: String,
    pub typ: Option<Type>,
}

/// What a `func` expression executes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FuncCore {
    /// A user-written lambda body.
    Lambda(ExprId),
    /// A builtin from the function registry, bound by name. The concrete
    /// implementation is instantiated lazily from the registry so the AST
    /// stays plain data.
    Builtin(String),
}

/// A lambda or builtin binding.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuncExpr {
    pub params: Vec<FuncParam>,
    pub ret: Option<Type>,
    pub body: FuncCore,
    /// Captured definition-site scope, set during scope resolution.
    pub scope: Option<ScopeId>,
    /// The `Param` nodes allocated for this lambda, parallel to `params`.
    pub param_exprs: Vec<ExprId>,
}

/// A function call. `callee` is resolved during scope resolution: for a
/// polymorphic top-level function it points at a private copy of the
/// definition, for a builtin at a synthesised builtin `func` expression,
/// and for `$f(…)` at the variable's bound expression.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CallExpr {
    pub name: String,
    pub args: Vec<ExprId>,
    /// True for `$f(…)`: the callee is a lambda held in a variable.
    pub var_call: bool,
    pub callee: Option<ExprId>,
}

/// A variable reference. `target` is filled in by scope resolution.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VarExpr {
    pub name: String,
    pub target: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParamExpr {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IteratedExpr {
    pub name: String,
    pub def: ExprId,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PolyExpr {
    pub def: ExprId,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TopLevelExpr {
    pub def: ExprId,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SingletonExpr {
    pub def: ExprId,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IfExpr {
    pub cond: ExprId,
    pub then_: ExprId,
    pub else_: ExprId,
}

/// A statement variant.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Stmt {
    Bind(BindStmt),
    Func(FuncStmt),
    Class(ClassStmt),
    Include(IncludeStmt),
    Import(ImportStmt),
    Res(ResStmt),
    Edge(EdgeStmt),
    If(IfStmt),
    For(ForStmt),
    ForKv(ForKvStmt),
    Program(ProgramStmt),
    Comment(CommentStmt),
}

/// `$name = expr`, optionally with a declared type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BindStmt {
    pub name: String,
    pub typ: Option<Type>,
    pub value: ExprId,
}

/// `func name(…) { … }`; `func` must hold an [`Expr::Func`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuncStmt {
    pub name: String,
    pub func: ExprId,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassParam {
    pub name: String,
    pub default: Option<ExprId>,
}

/// A parameterised, named program fragment capturing its definition-site
/// scope.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassStmt {
    pub name: String,
    pub params: Vec<ClassParam>,
    /// The class body, always a `Program` statement.
    pub body: StmtId,
    /// Captured at scope resolution time.
    pub scope: Option<ScopeId>,
}

/// `include name(args…)` with an optional `as alias` scope re-export.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IncludeStmt {
    pub name: String,
    pub args: Vec<ExprId>,
    pub alias: Option<String>,
    /// The resolved class statement.
    pub class: Option<StmtId>,
    /// The per-include instantiated copy of the class body.
    pub body: Option<StmtId>,
    /// The pre-copy include this one descends from. Recursion detection
    /// compares these identities along the scope chain, so copies of an
    /// include still count as the same include.
    pub original: Option<StmtId>,
}

/// `import "name"` or `import "name" as alias`; the distinguished alias `*`
/// flattens the imported scope into the current one.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImportStmt {
    pub name: String,
    pub alias: Option<String>,
}

/// Which dependency property a resource-internal edge half declares.
///
/// `Notify`/`Listen` additionally propagate events along the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "PascalCase")]
pub enum EdgeProp {
    Notify,
    Before,
    Listen,
    Depend,
}

impl EdgeProp {
    /// True for the two property kinds that carry event propagation.
    pub fn notifies(self) -> bool {
        matches!(self, Self::Notify | Self::Listen)
    }

    /// True when the declared resource is on the receiving end: the edge
    /// points from the referenced resource to the declaring one.
    pub fn reversed(self) -> bool {
        matches!(self, Self::Listen | Self::Depend)
    }
}

/// One entry in a resource statement body, in source order.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ResContent {
    Field(ResField),
    Edge(ResEdge),
    Meta(ResMeta),
    Collect(ResCollect),
}

/// `fieldname => expr`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResField {
    pub name: String,
    pub value: ExprId,
}

/// `Before => Kind["name"]` and friends; synthesised into OG edges.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResEdge {
    pub property: EdgeProp,
    pub kind: String,
    pub name: ExprId,
}

/// `Meta:prop => expr`, or the aggregate `Meta => struct{…}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResMeta {
    pub property: String,
    pub value: ExprId,
}

/// `Collect => expr`: consume exported resources filtered by the
/// `(name, host)` pairs the expression evaluates to.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResCollect {
    pub value: ExprId,
}

/// `kind "name" { contents… }`. The name expression may evaluate to `str`
/// (one resource) or `list<str>` (one resource per element).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResStmt {
    pub kind: String,
    pub name: ExprId,
    pub contents: Vec<ResContent>,
}

/// One endpoint of an edge-statement chain, optionally naming a send or
/// recv field.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EdgeHalf {
    pub kind: String,
    pub name: ExprId,
    pub field: Option<String>,
}

/// `Kind1["a"] -> Kind2["b"] -> …`, an ordered dependency chain.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EdgeStmt {
    pub halves: SmallVec<[EdgeHalf; 2]>,
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IfStmt {
    pub cond: ExprId,
    pub then_: StmtId,
    pub else_: Option<StmtId>,
}

/// `for $index, $value in expr { … }` over a list.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForStmt {
    pub index: String,
    pub value: String,
    pub expr: ExprId,
    pub body: StmtId,
    /// `Param` nodes bound to the loop variables at scope resolution.
    pub index_param: Option<ExprId>,
    pub value_param: Option<ExprId>,
}

/// `forkv $key, $val in expr { … }` over a map.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForKvStmt {
    pub key: String,
    pub val: String,
    pub expr: ExprId,
    pub body: StmtId,
    pub key_param: Option<ExprId>,
    pub val_param: Option<ExprId>,
}

/// An ordered list of statements: a compilation unit or a class body.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProgramStmt {
    pub body: Vec<StmtId>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CommentStmt {
    pub text: String,
}

/// An expression plus its per-node metadata slots.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExprNode {
    pub expr: Expr,
    pub span: SrcSpan,
    /// Solver-set type. Written once; see [`Arena::set_type`].
    typ: Option<Type>,
    /// FG vertex back-reference cached for output emission.
    #[serde(skip, default)]
    fg: Option<VertexId>,
}

/// A statement plus its per-node metadata slots.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StmtNode {
    pub stmt: Stmt,
    pub span: SrcSpan,
    /// Set when the ordering graph proves the statement unreachable from
    /// any consumer; pruned statements are skipped by every later pass.
    pub pruned: bool,
}

/// Owner of every AST node, scope and source-file name.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct Arena {
    exprs: Vec<ExprNode>,
    stmts: Vec<StmtNode>,
    scopes: Vec<Scope>,
    files: Vec<String>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source file name, returning its id for span stamping.
    pub fn add_file(&mut self, name: impl Into<String>) -> FileId {
        let id = FileId::new(self.files.len());
        self.files.push(name.into());
        id
    }

    pub fn file_name(&self, id: FileId) -> Option<&str> {
        self.files.get(id.index()).map(String::as_str)
    }

    pub fn alloc_expr(&mut self, expr: Expr, span: SrcSpan) -> ExprId {
        let id = ExprId(self.exprs.len().try_into().expect("expression arena overflow"));
        self.exprs.push(ExprNode {
            expr,
            span,
            typ: None,
            fg: None,
        });
        id
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt, span: SrcSpan) -> StmtId {
        let id = StmtId(self.stmts.len().try_into().expect("statement arena overflow"));
        self.stmts.push(StmtNode {
            stmt,
            span,
            pruned: false,
        });
        id
    }

    pub fn alloc_scope(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len().try_into().expect("scope arena overflow"));
        self.scopes.push(scope);
        id
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()].expr
    }

    #[inline]
    pub(crate) fn expr_node(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id.index()]
    }

    #[inline]
    pub(crate) fn stmt_node(&self, id: StmtId) -> &StmtNode {
        &self.stmts[id.index()]
    }

    #[inline]
    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()].expr
    }

    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()].stmt
    }

    #[inline]
    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()].stmt
    }

    #[inline]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    #[inline]
    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    #[inline]
    pub fn expr_span(&self, id: ExprId) -> SrcSpan {
        self.exprs[id.index()].span
    }

    #[inline]
    pub fn stmt_span(&self, id: StmtId) -> SrcSpan {
        self.stmts[id.index()].span
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    /// The cached (solver-set) type of an expression.
    pub fn typ(&self, id: ExprId) -> Option<&Type> {
        self.exprs[id.index()].typ.as_ref()
    }

    /// Sets the solved type of an expression.
    ///
    /// A cached type, once set, never changes: setting the same ground type
    /// again is a no-op, setting a different one is an error.
    pub fn set_type(&mut self, id: ExprId, typ: Type) -> LangResult<()> {
        let node = &mut self.exprs[id.index()];
        match &node.typ {
            None => {
                node.typ = Some(typ);
                Ok(())
            }
            Some(existing) if existing.cmp(&typ) => Ok(()),
            Some(existing) => Err(LangError::type_error(
                format!("type already set to `{existing}`, cannot change to `{typ}`"),
                node.span,
            )),
        }
    }

    pub fn fg(&self, id: ExprId) -> Option<VertexId> {
        self.exprs[id.index()].fg
    }

    pub fn set_fg(&mut self, id: ExprId, vertex: VertexId) {
        self.exprs[id.index()].fg = Some(vertex);
    }

    pub fn is_pruned(&self, id: StmtId) -> bool {
        self.stmts[id.index()].pruned
    }

    pub fn set_pruned(&mut self, id: StmtId, pruned: bool) {
        self.stmts[id.index()].pruned = pruned;
    }

    /// Direct children of an expression, in evaluation order.
    pub fn expr_children(&self, id: ExprId) -> SmallVec<[Node; 4]> {
        let mut out = SmallVec::new();
        match self.expr(id) {
            Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Param(_) => {}
            Expr::List(items) => out.extend(items.iter().map(|e| Node::Expr(*e))),
            Expr::Map(pairs) => {
                for (k, v) in pairs {
                    out.push(Node::Expr(*k));
                    out.push(Node::Expr(*v));
                }
            }
            Expr::Struct(fields) => out.extend(fields.iter().map(|f| Node::Expr(f.value))),
            Expr::Func(func) => {
                if let FuncCore::Lambda(body) = &func.body {
                    out.push(Node::Expr(*body));
                }
            }
            Expr::Call(call) => {
                out.extend(call.args.iter().map(|e| Node::Expr(*e)));
                if let Some(callee) = call.callee {
                    out.push(Node::Expr(callee));
                }
            }
            // A Var's target is a reference into another part of the tree,
            // not a child; visiting it would multiply traversals.
            Expr::Var(_) => {}
            Expr::Iterated(w) => out.push(Node::Expr(w.def)),
            Expr::Poly(w) => out.push(Node::Expr(w.def)),
            Expr::TopLevel(w) => out.push(Node::Expr(w.def)),
            Expr::Singleton(w) => out.push(Node::Expr(w.def)),
            Expr::If(e) => {
                out.push(Node::Expr(e.cond));
                out.push(Node::Expr(e.then_));
                out.push(Node::Expr(e.else_));
            }
        }
        out
    }

    /// Direct children of a statement, in source order.
    pub fn stmt_children(&self, id: StmtId) -> SmallVec<[Node; 4]> {
        let mut out = SmallVec::new();
        match self.stmt(id) {
            Stmt::Bind(s) => out.push(Node::Expr(s.value)),
            Stmt::Func(s) => out.push(Node::Expr(s.func)),
            Stmt::Class(s) => {
                for p in &s.params {
                    if let Some(d) = p.default {
                        out.push(Node::Expr(d));
                    }
                }
                out.push(Node::Stmt(s.body));
            }
            Stmt::Include(s) => {
                out.extend(s.args.iter().map(|e| Node::Expr(*e)));
                if let Some(body) = s.body {
                    out.push(Node::Stmt(body));
                }
            }
            Stmt::Import(_) | Stmt::Comment(_) => {}
            Stmt::Res(s) => {
                out.push(Node::Expr(s.name));
                for content in &s.contents {
                    match content {
                        ResContent::Field(f) => out.push(Node::Expr(f.value)),
                        ResContent::Edge(e) => out.push(Node::Expr(e.name)),
                        ResContent::Meta(m) => out.push(Node::Expr(m.value)),
                        ResContent::Collect(c) => out.push(Node::Expr(c.value)),
                    }
                }
            }
            Stmt::Edge(s) => out.extend(s.halves.iter().map(|h| Node::Expr(h.name))),
            Stmt::If(s) => {
                out.push(Node::Expr(s.cond));
                out.push(Node::Stmt(s.then_));
                if let Some(e) = s.else_ {
                    out.push(Node::Stmt(e));
                }
            }
            Stmt::For(s) => {
                out.push(Node::Expr(s.expr));
                out.push(Node::Stmt(s.body));
            }
            Stmt::ForKv(s) => {
                out.push(Node::Expr(s.expr));
                out.push(Node::Stmt(s.body));
            }
            Stmt::Program(s) => out.extend(s.body.iter().map(|c| Node::Stmt(*c))),
        }
        out
    }

    /// Depth-first pre-order visitor over a subtree; fails early on the
    /// first visitor error.
    pub fn apply<F>(&self, node: Node, f: &mut F) -> LangResult<()>
    where
        F: FnMut(&Self, Node) -> LangResult<()>,
    {
        f(self, node)?;
        let children = match node {
            Node::Expr(id) => self.expr_children(id),
            Node::Stmt(id) => self.stmt_children(id),
        };
        for child in children {
            self.apply(child, f)?;
        }
        Ok(())
    }

    /// Structural validation of a freshly parsed subtree.
    ///
    /// Rejects empty names, empty resource kinds, duplicate resource fields
    /// and meta properties, malformed edge chains, and imports inside loop
    /// bodies. Descends recursively; the first error wins.
    pub fn init(&self, root: StmtId) -> LangResult<()> {
        self.init_stmt(root, false)
    }

    fn init_stmt(&self, id: StmtId, in_loop: bool) -> LangResult<()> {
        let span = self.stmt_span(id);
        match self.stmt(id) {
            Stmt::Bind(s) => {
                if s.name.is_empty() {
                    return Err(LangError::structural("bind with empty name", span));
                }
                self.init_expr(s.value)
            }
            Stmt::Func(s) => {
                if s.name.is_empty() {
                    return Err(LangError::structural("func with empty name", span));
                }
                if !matches!(self.expr(s.func), Expr::Func(_)) {
                    return Err(LangError::structural("func statement must bind a func expression", span));
                }
                self.init_expr(s.func)
            }
            Stmt::Class(s) => {
                if s.name.is_empty() {
                    return Err(LangError::structural("class with empty name", span));
                }
                let mut seen = ahash::AHashSet::new();
                for p in &s.params {
                    if p.name.is_empty() {
                        return Err(LangError::structural("class parameter with empty name", span));
                    }
                    if !seen.insert(p.name.as_str()) {
                        return Err(LangError::duplicate(NameKind::Variable, &p.name, span));
                    }
                    if let Some(d) = p.default {
                        self.init_expr(d)?;
                    }
                }
                self.init_stmt(s.body, in_loop)
            }
            Stmt::Include(s) => {
                if s.name.is_empty() {
                    return Err(LangError::structural("include with empty name", span));
                }
                for arg in &s.args {
                    self.init_expr(*arg)?;
                }
                Ok(())
            }
            Stmt::Import(s) => {
                if s.name.is_empty() {
                    return Err(LangError::structural("import with empty name", span));
                }
                if in_loop {
                    return Err(LangError::structural("import may not appear inside a loop body", span));
                }
                Ok(())
            }
            Stmt::Res(s) => self.init_res(s, span),
            Stmt::Edge(s) => self.init_edge(s, span),
            Stmt::If(s) => {
                self.init_expr(s.cond)?;
                self.init_stmt(s.then_, in_loop)?;
                if let Some(e) = s.else_ {
                    self.init_stmt(e, in_loop)?;
                }
                Ok(())
            }
            Stmt::For(s) => {
                if s.index.is_empty() || s.value.is_empty() {
                    return Err(LangError::structural("for loop variable with empty name", span));
                }
                self.init_expr(s.expr)?;
                self.init_stmt(s.body, true)
            }
            Stmt::ForKv(s) => {
                if s.key.is_empty() || s.val.is_empty() {
                    return Err(LangError::structural("forkv loop variable with empty name", span));
                }
                self.init_expr(s.expr)?;
                self.init_stmt(s.body, true)
            }
            Stmt::Program(s) => {
                for child in &s.body {
                    self.init_stmt(*child, in_loop)?;
                }
                Ok(())
            }
            Stmt::Comment(_) => Ok(()),
        }
    }

    fn init_res(&self, s: &ResStmt, span: SrcSpan) -> LangResult<()> {
        if s.kind.is_empty() {
            return Err(LangError::structural("resource with empty kind", span));
        }
        self.init_expr(s.name)?;
        let mut fields = ahash::AHashSet::new();
        let mut metas = ahash::AHashSet::new();
        let mut collected = false;
        for content in &s.contents {
            match content {
                ResContent::Field(f) => {
                    if f.name.is_empty() {
                        return Err(LangError::structural("resource field with empty name", span));
                    }
                    if !fields.insert(f.name.as_str()) {
                        return Err(LangError::structural(
                            format!("duplicate field `{}` in resource", f.name),
                            span,
                        ));
                    }
                    self.init_expr(f.value)?;
                }
                ResContent::Edge(e) => {
                    if e.kind.is_empty() {
                        return Err(LangError::structural("resource edge with empty kind", span));
                    }
                    self.init_expr(e.name)?;
                }
                ResContent::Meta(m) => {
                    if m.property != "meta" && m.property.parse::<MetaProp>().is_err() {
                        return Err(LangError::type_error(
                            format!("unknown meta property `{}`", m.property),
                            span,
                        ));
                    }
                    if !metas.insert(m.property.as_str()) {
                        return Err(LangError::structural(
                            format!("duplicate meta property `{}` in resource", m.property),
                            span,
                        ));
                    }
                    self.init_expr(m.value)?;
                }
                ResContent::Collect(c) => {
                    if collected {
                        return Err(LangError::structural("more than one collect clause in resource", span));
                    }
                    collected = true;
                    self.init_expr(c.value)?;
                }
            }
        }
        Ok(())
    }

    fn init_edge(&self, s: &EdgeStmt, span: SrcSpan) -> LangResult<()> {
        if s.halves.len() < 2 {
            return Err(LangError::structural("edge chain needs at least two endpoints", span));
        }
        for half in &s.halves {
            if half.kind.is_empty() {
                return Err(LangError::structural("edge endpoint with empty kind", span));
            }
            self.init_expr(half.name)?;
        }
        let any_field = s.halves.iter().any(|h| h.field.is_some());
        if any_field {
            if s.halves.len() != 2 {
                return Err(LangError::structural(
                    "send/recv fields are only valid on a two-endpoint edge",
                    span,
                ));
            }
            if !s.halves.iter().all(|h| h.field.is_some()) {
                return Err(LangError::structural(
                    "send/recv fields must be present on both endpoints",
                    span,
                ));
            }
        }
        Ok(())
    }

    fn init_expr(&self, id: ExprId) -> LangResult<()> {
        let span = self.expr_span(id);
        match self.expr(id) {
            Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => Ok(()),
            Expr::Var(v) => {
                if v.name.is_empty() {
                    Err(LangError::structural("variable with empty name", span))
                } else {
                    Ok(())
                }
            }
            Expr::Call(c) => {
                if c.name.is_empty() {
                    return Err(LangError::structural("call with empty name", span));
                }
                for arg in &c.args {
                    self.init_expr(*arg)?;
                }
                Ok(())
            }
            Expr::Func(func) => {
                let mut seen = ahash::AHashSet::new();
                for p in &func.params {
                    if p.name.is_empty() {
                        return Err(LangError::structural("func parameter with empty name", span));
                    }
                    if !seen.insert(p.name.as_str()) {
                        return Err(LangError::duplicate(NameKind::Variable, &p.name, span));
                    }
                }
                match &func.body {
                    FuncCore::Lambda(body) => self.init_expr(*body),
                    FuncCore::Builtin(name) => {
                        if name.is_empty() {
                            Err(LangError::structural("builtin binding with empty name", span))
                        } else {
                            Ok(())
                        }
                    }
                }
            }
            Expr::Struct(fields) => {
                let mut seen = ahash::AHashSet::new();
                for f in fields {
                    if f.name.is_empty() {
                        return Err(LangError::structural("struct field with empty name", span));
                    }
                    if !seen.insert(f.name.as_str()) {
                        return Err(LangError::structural(
                            format!("duplicate struct field `{}`", f.name),
                            span,
                        ));
                    }
                    self.init_expr(f.value)?;
                }
                Ok(())
            }
            Expr::List(items) => {
                for item in items {
                    self.init_expr(*item)?;
                }
                Ok(())
            }
            Expr::Map(pairs) => {
                for (k, v) in pairs {
                    self.init_expr(*k)?;
                    self.init_expr(*v)?;
                }
                Ok(())
            }
            Expr::If(e) => {
                self.init_expr(e.cond)?;
                self.init_expr(e.then_)?;
                self.init_expr(e.else_)
            }
            // Wrappers are produced by elaboration, after init has run.
            Expr::Param(_) | Expr::Iterated(_) | Expr::Poly(_) | Expr::TopLevel(_) | Expr::Singleton(_) => Ok(()),
        }
    }

    /// Renders an expression as surface-ish syntax for diagnostics.
    pub fn expr_string(&self, id: ExprId) -> String {
        match self.expr(id) {
            Expr::Bool(b) => b.to_string(),
            Expr::Int(i) => i.to_string(),
            Expr::Float(x) => {
                let mut buf = ryu::Buffer::new();
                buf.format(*x).to_owned()
            }
            Expr::Str(s) => format!("{s:?}"),
            Expr::List(items) => {
                let inner: Vec<String> = items.iter().map(|e| self.expr_string(*e)).collect();
                format!("[{}]", inner.join(", "))
            }
            Expr::Map(pairs) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{} => {}", self.expr_string(*k), self.expr_string(*v)))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Expr::Struct(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{} => {}", f.name, self.expr_string(f.value)))
                    .collect();
                format!("struct{{{}}}", inner.join(", "))
            }
            Expr::Func(func) => match &func.body {
                FuncCore::Lambda(body) => {
                    let params: Vec<String> = func.params.iter().map(|p| format!("${}", p.name)).collect();
                    format!("func({}) {{ {} }}", params.join(", "), self.expr_string(*body))
                }
                FuncCore::Builtin(name) => format!("func<{name}>"),
            },
            Expr::Call(call) => {
                let args: Vec<String> = call.args.iter().map(|e| self.expr_string(*e)).collect();
                format!("{}({})", call.name, args.join(", "))
            }
            Expr::Var(v) => format!("${}", v.name),
            Expr::Param(p) => format!("param(${})", p.name),
            Expr::Iterated(w) => format!("iterated({})", self.expr_string(w.def)),
            Expr::Poly(w) => format!("poly({})", self.expr_string(w.def)),
            Expr::TopLevel(w) => format!("toplevel({})", self.expr_string(w.def)),
            Expr::Singleton(w) => format!("singleton({})", self.expr_string(w.def)),
            Expr::If(e) => format!(
                "if {} {{ {} }} else {{ {} }}",
                self.expr_string(e.cond),
                self.expr_string(e.then_),
                self.expr_string(e.else_)
            ),
        }
    }
}
