#![doc = include_str!("../../../README.md")]

pub mod ast;
pub mod context;
pub mod elaborate;
pub mod errors;
pub mod fg;
pub mod funcs;
pub mod imports;
pub mod infer;
pub mod ordering;
pub mod output;
pub mod resources;
pub mod scope;
pub mod session;
pub mod span;
pub mod speculate;
pub mod tracer;
pub mod types;
pub mod unify;
pub mod value;

pub use crate::{
    ast::{Arena, Expr, ExprId, Node, Stmt, StmtId},
    context::ElaborationContext,
    errors::{LangError, LangResult, NameKind, SpecResult, Stall},
    imports::{parse_import_name, parse_input, ImportData, ParsedInput},
    output::{MetaParams, MetaProp, OgEdge, OutputGraph, Resource},
    resources::{b64_to_res, res_to_b64, DefaultKinds, ExportedResource, KindRegistry},
    session::Session,
    span::{FileId, SrcSpan},
    speculate::speculate,
    tracer::{ElabTracer, NoopTracer, StderrTracer},
    types::{Type, TypeVar},
    unify::{Invariant, SimpleSolver, Substitution, UnificationSolver},
    value::{FuncBody, FuncValue, Value},
};
