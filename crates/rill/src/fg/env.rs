//! Runtime environments: the mapping from environment keys (parameter and
//! iteration node ids) to lazily built FG vertices.
//!
//! A [`FuncSingleton`] is a lazy (graph, vertex) pair built at most once
//! per key; every use site delegates to the same vertex. Environments are
//! cheap to clone: the singleton cells are shared, so two clones of an env
//! still memoise together.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::{
    ast::{Arena, ExprId},
    context::ElaborationContext,
    errors::{LangError, LangResult},
    fg::{FgBuild, VertexId},
};

/// The runtime environment threaded through FG construction.
///
/// `variables` keys are the node ids of `Param` and `Iterated` wrappers;
/// `functions` carries the captured environment of polymorphic top-level
/// definitions for call sites that need to rebuild a body.
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub variables: AHashMap<ExprId, FuncSingleton>,
    pub functions: AHashMap<ExprId, Env>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, key: ExprId, singleton: FuncSingleton) {
        self.variables.insert(key, singleton);
    }

    pub fn lookup(&self, key: ExprId) -> Option<&FuncSingleton> {
        self.variables.get(&key)
    }
}

#[derive(Debug)]
enum SingletonState {
    /// Not yet built: the definition expression and the environment to
    /// build it in.
    Todo { expr: ExprId, env: Env },
    /// Currently building; hitting this again means a cyclic definition,
    /// which the ordering pass should have rejected.
    Building,
    Built(VertexId),
}

/// A lazily built FG vertex, memoised behind a shared cell.
#[derive(Debug, Clone)]
pub struct FuncSingleton(Rc<RefCell<SingletonState>>);

impl FuncSingleton {
    /// A singleton that will build `expr` in `env` on first use.
    pub fn lazy(expr: ExprId, env: Env) -> Self {
        Self(Rc::new(RefCell::new(SingletonState::Todo { expr, env })))
    }

    /// A singleton over an already existing vertex (argument binding).
    pub fn built(vertex: VertexId) -> Self {
        Self(Rc::new(RefCell::new(SingletonState::Built(vertex))))
    }

    /// Replaces the build environment of a still-unbuilt singleton.
    ///
    /// Iteration setup seeds all of an iteration's keys first and then
    /// gives every one of them the finished environment, so sibling
    /// definitions can see each other regardless of source order.
    pub fn set_env(&self, env: Env) {
        let mut state = self.0.borrow_mut();
        if let SingletonState::Todo { env: e, .. } = &mut *state {
            *e = env;
        }
    }

    /// The vertex, building it on first use. Every forced use takes a
    /// shared reference so transactional rollback leaves the vertex alone
    /// while other users remain.
    pub fn force(
        &self,
        build: &mut FgBuild,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
    ) -> LangResult<VertexId> {
        let (expr, env) = {
            let mut state = self.0.borrow_mut();
            match std::mem::replace(&mut *state, SingletonState::Building) {
                SingletonState::Built(v) => {
                    *state = SingletonState::Built(v);
                    drop(state);
                    build.note_shared(v);
                    return Ok(v);
                }
                SingletonState::Building => {
                    return Err(LangError::graph(
                        "cyclic definition reached during graph construction",
                        crate::span::SrcSpan::default(),
                    ));
                }
                SingletonState::Todo { expr, env } => (expr, env),
            }
        };
        let vertex = build.build_expr(arena, ctx, expr, &env)?;
        *self.0.borrow_mut() = SingletonState::Built(vertex);
        build.note_shared(vertex);
        Ok(vertex)
    }
}
