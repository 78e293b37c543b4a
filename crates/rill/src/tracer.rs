//! Elaboration tracing infrastructure.
//!
//! A trait-based hook system for observing the pipeline: pass boundaries,
//! import resolution, statement scoping, FG transactions and optional
//! graphviz dumps of the finished FG. The default [`NoopTracer`] costs
//! nothing; [`StderrTracer`] prints a human-readable log for debugging.
//!
//! Hooks fire at pass granularity (never per node in a hot loop), so a
//! boxed tracer on the context is cheap enough and keeps the pipeline
//! signatures free of an extra type parameter.

/// Trait for elaboration tracing. All methods default to no-ops, so an
/// implementation only overrides the hooks it cares about.
pub trait ElabTracer: std::fmt::Debug {
    /// Called when a pipeline pass begins (`init`, `interpolate`,
    /// `ordering`, `set_scope`, `type_check`, `graph`, `output`).
    fn on_pass_start(&mut self, _pass: &str) {}

    /// Called when a pipeline pass completes successfully.
    fn on_pass_end(&mut self, _pass: &str) {}

    /// Called when an import resolves, with the name as written and a
    /// description of where it resolved to.
    fn on_import(&mut self, _name: &str, _resolved: &str) {}

    /// Called for each statement as scope resolution processes it.
    fn on_scope_stmt(&mut self, _desc: &str) {}

    /// Called when an FG transaction commits or rolls back.
    ///
    /// `committed` is false for a rollback; the counts cover vertices and
    /// edges touched by the transaction.
    fn on_txn(&mut self, _committed: bool, _vertices: usize, _edges: usize) {}

    /// Receives a graphviz rendering of the FG after construction.
    ///
    /// Only called when the context's graphviz flag is set; this replaces
    /// the old process-wide debug toggle.
    fn on_graphviz(&mut self, _dot: &str) {}
}

/// Zero-cost tracer: every hook is the default no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl ElabTracer for NoopTracer {}

/// Human-readable tracing to stderr, for debugging elaboration order and
/// import resolution.
#[derive(Debug, Default)]
pub struct StderrTracer {
    depth: usize,
}

impl StderrTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth)
    }
}

impl ElabTracer for StderrTracer {
    fn on_pass_start(&mut self, pass: &str) {
        eprintln!("{}>> {pass}", self.indent());
        self.depth += 1;
    }

    fn on_pass_end(&mut self, pass: &str) {
        self.depth = self.depth.saturating_sub(1);
        eprintln!("{}<< {pass}", self.indent());
    }

    fn on_import(&mut self, name: &str, resolved: &str) {
        eprintln!("{}import {name} -> {resolved}", self.indent());
    }

    fn on_scope_stmt(&mut self, desc: &str) {
        eprintln!("{}scope {desc}", self.indent());
    }

    fn on_txn(&mut self, committed: bool, vertices: usize, edges: usize) {
        let what = if committed { "commit" } else { "reset" };
        eprintln!("{}txn {what}: {vertices} vertices, {edges} edges", self.indent());
    }

    fn on_graphviz(&mut self, dot: &str) {
        eprintln!("{dot}");
    }
}
