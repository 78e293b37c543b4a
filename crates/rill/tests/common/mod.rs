//! Shared AST builders for the integration tests. These stand in for the
//! parser collaborator: tests construct programs directly in the arena.
#![allow(dead_code)]

use rill::{
    ast::{
        BindStmt, CallExpr, ClassParam, ClassStmt, CommentStmt, EdgeHalf, EdgeProp, EdgeStmt, Expr, ForKvStmt,
        ForStmt, FuncCore, FuncExpr, FuncParam, FuncStmt, IfStmt, ImportStmt, IncludeStmt, ProgramStmt, ResContent,
        ResEdge, ResField, ResMeta, ResStmt, Stmt, StructField, VarExpr,
    },
    Arena, ExprId, OutputGraph, Session, SrcSpan, StmtId, Type,
};

pub fn sp() -> SrcSpan {
    SrcSpan::default()
}

/// A tiny program builder around an arena.
pub struct B {
    pub arena: Arena,
}

impl B {
    pub fn new() -> Self {
        Self { arena: Arena::new() }
    }

    pub fn s(&mut self, v: &str) -> ExprId {
        self.arena.alloc_expr(Expr::Str(v.to_owned()), sp())
    }

    pub fn i(&mut self, v: i64) -> ExprId {
        self.arena.alloc_expr(Expr::Int(v), sp())
    }

    pub fn f(&mut self, v: f64) -> ExprId {
        self.arena.alloc_expr(Expr::Float(v), sp())
    }

    pub fn b(&mut self, v: bool) -> ExprId {
        self.arena.alloc_expr(Expr::Bool(v), sp())
    }

    pub fn var(&mut self, name: &str) -> ExprId {
        self.arena.alloc_expr(
            Expr::Var(VarExpr {
                name: name.to_owned(),
                target: None,
            }),
            sp(),
        )
    }

    pub fn list(&mut self, items: Vec<ExprId>) -> ExprId {
        self.arena.alloc_expr(Expr::List(items), sp())
    }

    pub fn map(&mut self, pairs: Vec<(ExprId, ExprId)>) -> ExprId {
        self.arena.alloc_expr(Expr::Map(pairs), sp())
    }

    pub fn strct(&mut self, fields: Vec<(&str, ExprId)>) -> ExprId {
        let fields = fields
            .into_iter()
            .map(|(name, value)| StructField {
                name: name.to_owned(),
                value,
            })
            .collect();
        self.arena.alloc_expr(Expr::Struct(fields), sp())
    }

    pub fn call(&mut self, name: &str, args: Vec<ExprId>) -> ExprId {
        self.arena.alloc_expr(
            Expr::Call(CallExpr {
                name: name.to_owned(),
                args,
                var_call: false,
                callee: None,
            }),
            sp(),
        )
    }

    /// `$name(args…)`: calling a lambda held in a variable.
    pub fn var_call(&mut self, name: &str, args: Vec<ExprId>) -> ExprId {
        self.arena.alloc_expr(
            Expr::Call(CallExpr {
                name: name.to_owned(),
                args,
                var_call: true,
                callee: None,
            }),
            sp(),
        )
    }

    pub fn if_expr(&mut self, cond: ExprId, then_: ExprId, else_: ExprId) -> ExprId {
        self.arena
            .alloc_expr(Expr::If(rill::ast::IfExpr { cond, then_, else_ }), sp())
    }

    pub fn lambda(&mut self, params: &[&str], body: ExprId) -> ExprId {
        let params = params
            .iter()
            .map(|name| FuncParam {
                name: (*name).to_owned(),
                typ: None,
            })
            .collect();
        self.arena.alloc_expr(
            Expr::Func(FuncExpr {
                params,
                ret: None,
                body: FuncCore::Lambda(body),
                scope: None,
                param_exprs: Vec::new(),
            }),
            sp(),
        )
    }

    pub fn bind(&mut self, name: &str, value: ExprId) -> StmtId {
        self.arena.alloc_stmt(
            Stmt::Bind(BindStmt {
                name: name.to_owned(),
                typ: None,
                value,
            }),
            sp(),
        )
    }

    pub fn bind_typed(&mut self, name: &str, typ: Type, value: ExprId) -> StmtId {
        self.arena.alloc_stmt(
            Stmt::Bind(BindStmt {
                name: name.to_owned(),
                typ: Some(typ),
                value,
            }),
            sp(),
        )
    }

    pub fn func_stmt(&mut self, name: &str, func: ExprId) -> StmtId {
        self.arena.alloc_stmt(
            Stmt::Func(FuncStmt {
                name: name.to_owned(),
                func,
            }),
            sp(),
        )
    }

    pub fn class(&mut self, name: &str, params: &[&str], body: Vec<StmtId>) -> StmtId {
        let body = self.program(body);
        let params = params
            .iter()
            .map(|p| ClassParam {
                name: (*p).to_owned(),
                default: None,
            })
            .collect();
        self.arena.alloc_stmt(
            Stmt::Class(ClassStmt {
                name: name.to_owned(),
                params,
                body,
                scope: None,
            }),
            sp(),
        )
    }

    pub fn include(&mut self, name: &str, args: Vec<ExprId>) -> StmtId {
        self.include_as(name, args, None)
    }

    pub fn include_as(&mut self, name: &str, args: Vec<ExprId>, alias: Option<&str>) -> StmtId {
        self.arena.alloc_stmt(
            Stmt::Include(IncludeStmt {
                name: name.to_owned(),
                args,
                alias: alias.map(str::to_owned),
                class: None,
                body: None,
                original: None,
            }),
            sp(),
        )
    }

    pub fn import(&mut self, name: &str, alias: Option<&str>) -> StmtId {
        self.arena.alloc_stmt(
            Stmt::Import(ImportStmt {
                name: name.to_owned(),
                alias: alias.map(str::to_owned),
            }),
            sp(),
        )
    }

    pub fn res(&mut self, kind: &str, name: ExprId, fields: Vec<(&str, ExprId)>) -> StmtId {
        let contents = fields
            .into_iter()
            .map(|(fname, value)| {
                ResContent::Field(ResField {
                    name: fname.to_owned(),
                    value,
                })
            })
            .collect();
        self.res_full(kind, name, contents)
    }

    pub fn res_full(&mut self, kind: &str, name: ExprId, contents: Vec<ResContent>) -> StmtId {
        self.arena.alloc_stmt(
            Stmt::Res(ResStmt {
                kind: kind.to_owned(),
                name,
                contents,
            }),
            sp(),
        )
    }

    pub fn field(&mut self, name: &str, value: ExprId) -> ResContent {
        ResContent::Field(ResField {
            name: name.to_owned(),
            value,
        })
    }

    pub fn meta(&mut self, property: &str, value: ExprId) -> ResContent {
        ResContent::Meta(ResMeta {
            property: property.to_owned(),
            value,
        })
    }

    pub fn res_edge(&mut self, property: EdgeProp, kind: &str, name: ExprId) -> ResContent {
        ResContent::Edge(ResEdge {
            property,
            kind: kind.to_owned(),
            name,
        })
    }

    pub fn edge(&mut self, halves: Vec<(&str, ExprId, Option<&str>)>, notify: bool) -> StmtId {
        let halves = halves
            .into_iter()
            .map(|(kind, name, field)| EdgeHalf {
                kind: kind.to_owned(),
                name,
                field: field.map(str::to_owned),
            })
            .collect();
        self.arena.alloc_stmt(Stmt::Edge(EdgeStmt { halves, notify }), sp())
    }

    pub fn if_stmt(&mut self, cond: ExprId, then_: Vec<StmtId>, else_: Option<Vec<StmtId>>) -> StmtId {
        let then_ = self.program(then_);
        let else_ = else_.map(|body| self.program(body));
        self.arena.alloc_stmt(Stmt::If(IfStmt { cond, then_, else_ }), sp())
    }

    pub fn for_stmt(&mut self, index: &str, value: &str, expr: ExprId, body: Vec<StmtId>) -> StmtId {
        let body = self.program(body);
        self.arena.alloc_stmt(
            Stmt::For(ForStmt {
                index: index.to_owned(),
                value: value.to_owned(),
                expr,
                body,
                index_param: None,
                value_param: None,
            }),
            sp(),
        )
    }

    pub fn forkv_stmt(&mut self, key: &str, val: &str, expr: ExprId, body: Vec<StmtId>) -> StmtId {
        let body = self.program(body);
        self.arena.alloc_stmt(
            Stmt::ForKv(ForKvStmt {
                key: key.to_owned(),
                val: val.to_owned(),
                expr,
                body,
                key_param: None,
                val_param: None,
            }),
            sp(),
        )
    }

    pub fn comment(&mut self, text: &str) -> StmtId {
        self.arena
            .alloc_stmt(Stmt::Comment(CommentStmt { text: text.to_owned() }), sp())
    }

    pub fn program(&mut self, body: Vec<StmtId>) -> StmtId {
        self.arena.alloc_stmt(Stmt::Program(ProgramStmt { body }), sp())
    }
}

/// Runs the full pipeline and returns the live session.
pub fn session_of(b: B, program: StmtId) -> Session {
    let mut session = Session::new(b.arena, program);
    session.elaborate().expect("elaboration should succeed");
    session.build().expect("graph construction should succeed");
    session.tick().expect("tick should succeed");
    session
}

/// Full pipeline straight to the OG snapshot.
pub fn run(b: B, program: StmtId) -> OutputGraph {
    session_of(b, program).output().expect("output should succeed")
}

/// Sorted `kind/name` ids of the emitted resources.
pub fn resource_ids(og: &OutputGraph) -> Vec<String> {
    let mut ids: Vec<String> = og.resources.iter().map(rill::Resource::id).collect();
    ids.sort();
    ids
}
