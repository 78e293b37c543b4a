//! The default execution engine: a deterministic, synchronous evaluator.
//!
//! One `tick` evaluates every vertex in topological order, then runs any
//! pending expansions (apply vertices whose closure value changed, loop
//! vertices whose list changed) inside reversible transactions, and
//! repeats until the graph is stable. Hosts with real engines evaluate the
//! FG themselves and only need to produce the same value table; this one
//! exists so the core is executable and testable end to end.
//!
//! Reactive inputs are modelled with overrides: the host pins a vertex to
//! a value and ticks again, and only the dependent parts of the graph
//! change.

use ahash::AHashMap;

use crate::{
    ast::Arena,
    context::ElaborationContext,
    errors::{LangError, LangResult},
    fg::{CompositeKind, FgBuild, Vertex, VertexId},
    span::SrcSpan,
    value::{FuncValue, Value},
};

/// Expansion rounds before the engine declares the graph divergent.
/// Honest programs stabilise in a handful of rounds; unbounded growth
/// means a self-referential closure chain.
const MAX_ROUNDS: usize = 64;

/// The value table and override set of one engine instance.
#[derive(Debug, Default)]
pub struct SimpleEngine {
    table: AHashMap<VertexId, Value>,
    overrides: AHashMap<VertexId, Value>,
}

impl SimpleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value table filled by the last tick.
    pub fn table(&self) -> &AHashMap<VertexId, Value> {
        &self.table
    }

    /// The value produced for a vertex, if any.
    pub fn value(&self, v: VertexId) -> Option<&Value> {
        self.table.get(&v)
    }

    /// Pins a vertex to a host-provided value. The next tick reads the
    /// override instead of computing the vertex, which is how time-varying
    /// inputs enter the graph.
    pub fn set_override(&mut self, v: VertexId, value: Value) {
        self.overrides.insert(v, value);
    }

    /// Runs the graph to a fixed point, filling the value table.
    pub fn tick(
        &mut self,
        build: &mut FgBuild,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
    ) -> LangResult<()> {
        for _ in 0..MAX_ROUNDS {
            self.evaluate(build, ctx)?;
            if !self.expand_pending(build, arena, ctx)? {
                return Ok(());
            }
        }
        Err(LangError::graph(
            "function graph did not stabilise; a closure chain is growing without bound",
            SrcSpan::default(),
        ))
    }

    fn evaluate(&mut self, build: &mut FgBuild, ctx: &ElaborationContext) -> LangResult<()> {
        for v in build.fg.topo() {
            if let Some(pinned) = self.overrides.get(&v) {
                self.table.insert(v, pinned.clone());
                continue;
            }
            match self.eval_vertex(build, ctx, v)? {
                Some(value) => {
                    self.table.insert(v, value);
                }
                None => {
                    self.table.remove(&v);
                }
            }
        }
        Ok(())
    }

    fn input(&self, build: &FgBuild, v: VertexId, port: &str) -> Option<Value> {
        build
            .fg
            .inputs(v)
            .into_iter()
            .find(|(label, _)| label == port)
            .and_then(|(_, src)| self.table.get(&src).cloned())
    }

    /// Positional inputs `"0"`, `"1"`, …; `None` when any is pending.
    fn positional(&self, build: &FgBuild, v: VertexId, count: usize) -> Option<Vec<Value>> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(self.input(build, v, &i.to_string())?);
        }
        Some(out)
    }

    fn eval_vertex(
        &self,
        build: &FgBuild,
        ctx: &ElaborationContext,
        v: VertexId,
    ) -> LangResult<Option<Value>> {
        let value = match build.fg.vertex(v) {
            Vertex::Const(value) => Some(value.clone()),
            Vertex::Composite(CompositeKind::List(n)) => self.positional(build, v, *n).map(Value::List),
            Vertex::Composite(CompositeKind::Map(n)) => {
                let mut pairs = Vec::with_capacity(*n);
                let mut complete = true;
                for i in 0..*n {
                    match (
                        self.input(build, v, &format!("key:{i}")),
                        self.input(build, v, &format!("val:{i}")),
                    ) {
                        (Some(k), Some(val)) => pairs.push((k, val)),
                        _ => {
                            complete = false;
                            break;
                        }
                    }
                }
                complete.then_some(Value::Map(pairs))
            }
            Vertex::Composite(CompositeKind::Struct(names)) => {
                let mut fields = indexmap::IndexMap::with_capacity(names.len());
                let mut complete = true;
                for name in names {
                    match self.input(build, v, name) {
                        Some(value) => {
                            fields.insert(name.clone(), value);
                        }
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                complete.then_some(Value::Struct(fields))
            }
            Vertex::Select => match self.input(build, v, "c") {
                Some(Value::Bool(c)) => self.input(build, v, if c { "a" } else { "b" }),
                Some(other) => {
                    return Err(LangError::graph(
                        format!("if condition evaluated to non-bool `{other}`"),
                        SrcSpan::default(),
                    ));
                }
                None => None,
            },
            Vertex::Closure { body, env, typ } => Some(Value::Func(FuncValue {
                body: body.clone(),
                env: env.clone(),
                typ: typ.clone(),
            })),
            Vertex::BuiltinCall { name, typ } => {
                let count = build.fg.inputs(v).len();
                match self.positional(build, v, count) {
                    Some(args) => {
                        let mut builtin = ctx.funcs.instantiate(name, SrcSpan::default())?;
                        builtin.build(typ)?;
                        Some(builtin.call(&args)?)
                    }
                    None => None,
                }
            }
            Vertex::Apply { expanded, .. } => match expanded {
                Some(exp) => self.table.get(&exp.output).cloned(),
                None => None,
            },
            // Expansion vertices produce no value; they drive subgraphs.
            Vertex::Expand { .. } => None,
        };
        Ok(value)
    }

    /// Runs every pending expansion; true when anything changed and the
    /// graph needs another evaluation round.
    fn expand_pending(
        &mut self,
        build: &mut FgBuild,
        arena: &mut Arena,
        ctx: &mut ElaborationContext,
    ) -> LangResult<bool> {
        enum Pending {
            Apply(VertexId),
            Expand(VertexId, crate::ast::StmtId, crate::fg::env::Env, bool),
        }

        let mut pending = Vec::new();
        for v in build.fg.topo() {
            match build.fg.vertex(v) {
                Vertex::Apply { .. } => pending.push(Pending::Apply(v)),
                Vertex::Expand { stmt, env, keyed } => {
                    pending.push(Pending::Expand(v, *stmt, env.clone(), *keyed));
                }
                _ => {}
            }
        }

        let mut changed = false;
        for item in pending {
            match item {
                Pending::Apply(v) => {
                    if !build.fg.contains(v) {
                        continue;
                    }
                    let Some(Value::Func(closure)) = self.input(build, v, "func") else {
                        continue;
                    };
                    let up_to_date = match build.fg.vertex(v) {
                        Vertex::Apply { expanded, .. } => expanded.as_ref().is_some_and(|e| e.closure == closure),
                        _ => true,
                    };
                    if up_to_date {
                        continue;
                    }
                    let removed = build.expand_apply(arena, ctx, v, &closure)?;
                    self.purge(&removed);
                    changed = true;
                }
                Pending::Expand(v, stmt, env, keyed) => {
                    if !build.fg.contains(v) {
                        continue;
                    }
                    let Some(input) = self.input(build, v, "list") else {
                        continue;
                    };
                    let (removed, did) = if keyed {
                        let Value::Map(pairs) = input else {
                            return Err(LangError::graph(
                                "forkv subscribed to a non-map value",
                                arena.stmt_span(stmt),
                            ));
                        };
                        build.expand_forkv(arena, ctx, stmt, &env, &pairs)?
                    } else {
                        let Value::List(elems) = input else {
                            return Err(LangError::graph(
                                "for subscribed to a non-list value",
                                arena.stmt_span(stmt),
                            ));
                        };
                        build.expand_for(arena, ctx, stmt, &env, &elems)?
                    };
                    self.purge(&removed);
                    changed |= did;
                }
            }
        }
        Ok(changed)
    }

    fn purge(&mut self, removed: &[VertexId]) {
        for v in removed {
            self.table.remove(v);
            self.overrides.remove(v);
        }
    }
}
