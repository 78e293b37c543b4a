//! The pipeline facade: one object that owns the arena, the context and
//! the FG, and drives a parsed program through elaboration, graph
//! construction, engine ticks and output emission.

use crate::{
    ast::{Arena, ExprId, StmtId},
    context::ElaborationContext,
    elaborate::set_scope,
    errors::{LangError, LangResult},
    fg::{env::Env, interp::SimpleEngine, FgBuild, VertexId},
    infer::type_check,
    output::{output, OutputGraph, OutputSources},
    scope::Scope,
    value::Value,
};

/// A compilation session over one already-parsed program.
///
/// The phases run in order: [`Session::elaborate`] (init, interpolate,
/// ordering, scope resolution, type checking), [`Session::build`] (FG
/// construction), then any number of [`Session::tick`] /
/// [`Session::output`] rounds as inputs change.
#[derive(Debug)]
pub struct Session {
    arena: Arena,
    program: StmtId,
    ctx: ElaborationContext,
    build: Option<FgBuild>,
    engine: SimpleEngine,
    /// Exported-resource blobs available to collecting resources.
    exported: Vec<String>,
    elaborated: bool,
}

impl Session {
    pub fn new(arena: Arena, program: StmtId) -> Self {
        Self::with_context(arena, program, ElaborationContext::new())
    }

    pub fn with_context(arena: Arena, program: StmtId, ctx: ElaborationContext) -> Self {
        Self {
            arena,
            program,
            ctx,
            build: None,
            engine: SimpleEngine::new(),
            exported: Vec::new(),
            elaborated: false,
        }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn context_mut(&mut self) -> &mut ElaborationContext {
        &mut self.ctx
    }

    /// Runs the elaboration pipeline up to and including type checking.
    pub fn elaborate(&mut self) -> LangResult<()> {
        self.pass("init", |s| s.arena.init(s.program))?;
        self.pass("interpolate", |s| s.arena.interpolate_stmt(s.program, true))?;
        self.pass("set_scope", |s| {
            set_scope(&mut s.arena, &mut s.ctx, s.program, &Scope::new()).map(|_| ())
        })?;
        self.pass("type_check", |s| type_check(&mut s.arena, &mut s.ctx, s.program))?;
        self.elaborated = true;
        Ok(())
    }

    /// Builds the FG. Requires a successful [`Session::elaborate`].
    pub fn build(&mut self) -> LangResult<()> {
        if !self.elaborated {
            return Err(LangError::graph(
                "build requires a completed elaboration",
                self.arena.stmt_span(self.program),
            ));
        }
        self.ctx.tracer.on_pass_start("graph");
        let mut build = FgBuild::new();
        build.build_program(&mut self.arena, &mut self.ctx, self.program, &Env::new())?;
        if self.ctx.graphviz {
            let dot = build.fg.to_dot();
            self.ctx.tracer.on_graphviz(&dot);
        }
        self.ctx.tracer.on_pass_end("graph");
        self.build = Some(build);
        Ok(())
    }

    /// Runs the engine until the graph is stable, filling the value table.
    pub fn tick(&mut self) -> LangResult<()> {
        let build = self.build.as_mut().ok_or_else(|| {
            LangError::graph("tick requires a built graph", self.arena.stmt_span(self.program))
        })?;
        self.engine.tick(build, &mut self.arena, &mut self.ctx)
    }

    /// Emits the OG snapshot for the last tick.
    pub fn output(&self) -> LangResult<OutputGraph> {
        let build = self.build.as_ref().ok_or_else(|| {
            LangError::graph("output requires a built graph", self.arena.stmt_span(self.program))
        })?;
        let src = OutputSources {
            kinds: self.ctx.kinds.as_ref(),
            table: self.engine.table(),
            build,
            exported: &self.exported,
        };
        output(&self.arena, &src, self.program)
    }

    /// Registers exported-resource blobs for collecting resources.
    pub fn set_exported(&mut self, blobs: Vec<String>) {
        self.exported = blobs;
    }

    /// The FG vertex an expression materialised to, if any.
    pub fn vertex_of(&self, expr: ExprId) -> Option<VertexId> {
        self.arena.fg(expr)
    }

    /// The value the last tick produced for an expression.
    pub fn value_of(&self, expr: ExprId) -> Option<&Value> {
        self.engine.value(self.arena.fg(expr)?)
    }

    /// Pins an FG vertex to a host-provided value; the next tick sees it.
    /// This is how time-varying inputs reach the graph in this engine.
    pub fn set_input(&mut self, vertex: VertexId, value: Value) {
        self.engine.set_override(vertex, value);
    }

    /// Number of vertices currently in the FG.
    pub fn vertex_count(&self) -> usize {
        self.build.as_ref().map_or(0, |b| b.fg.vertex_count())
    }

    /// The per-iteration body snapshots of a for/forkv statement, in
    /// element order, as of the last tick.
    pub fn iteration_bodies(&self, stmt: StmtId) -> Vec<StmtId> {
        self.build
            .as_ref()
            .map_or_else(Vec::new, |b| b.with_iterations(stmt, |snaps| snaps.iter().map(|s| s.body).collect()))
    }

    fn pass(&mut self, name: &str, f: impl FnOnce(&mut Self) -> LangResult<()>) -> LangResult<()> {
        self.ctx.tracer.on_pass_start(name);
        f(self)?;
        self.ctx.tracer.on_pass_end(name);
        Ok(())
    }
}
