//! The reactive function graph (FG): the dataflow program elaboration
//! emits and the execution engine evaluates.
//!
//! Vertices are functions; edges carry named, typed values into them. The
//! graph is stable under removal (rollbacks must not invalidate ids), and
//! shared vertices are reference counted so per-call-site subgraphs can be
//! replaced without tearing down singletons they delegate to.

pub mod build;
pub mod env;
pub mod interp;
mod txn;

pub use build::{FgBuild, IterSnapshot};
pub use txn::TxnLog;

use std::fmt::Write as _;

use ahash::AHashMap;
use petgraph::{
    stable_graph::{EdgeIndex, NodeIndex, StableDiGraph},
    visit::EdgeRef,
};

use crate::{
    ast::StmtId,
    fg::env::Env,
    types::Type,
    value::{FuncBody, FuncValue, Value},
};

/// Identifier of an FG vertex. Stable across unrelated removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub(crate) NodeIndex);

/// Identifier of an FG edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(pub(crate) EdgeIndex);

/// How a composite vertex assembles its value from its input ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeKind {
    /// Ports `"0"`, `"1"`, … assemble a list.
    List(usize),
    /// Ports `"key:i"` / `"val:i"` assemble a map.
    Map(usize),
    /// Ports named after the fields assemble a struct, in field order.
    Struct(Vec<String>),
}

/// State of a call vertex's current expansion.
#[derive(Debug, Clone)]
pub struct Expanded {
    /// The closure value the expansion was built for.
    pub closure: FuncValue,
    /// The vertex whose value the call mirrors.
    pub output: VertexId,
    /// Everything the expansion added, for rollback when the closure
    /// value changes.
    pub log: TxnLog,
}

/// An FG vertex: one function of its named inputs.
#[derive(Debug)]
pub enum Vertex {
    /// A constant; no inputs.
    Const(Value),
    /// Assembles a list/map/struct from its inputs.
    Composite(CompositeKind),
    /// Expression-level if: inputs `c`, `a`, `b`; selects `a` or `b`.
    Select,
    /// Produces a first-class closure value.
    Closure { body: FuncBody, env: Env, typ: Type },
    /// Applies a specialised builtin to its inputs `"0"`, `"1"`, ….
    BuiltinCall { name: String, typ: Type },
    /// Two-phase call: input `func` carries the closure value; `"0"`… carry
    /// the arguments. The engine splices the body subgraph on demand.
    Apply {
        args: Vec<VertexId>,
        expanded: Option<Expanded>,
    },
    /// Statement-level for/forkv expansion, subscribed to input `list`.
    Expand {
        stmt: StmtId,
        env: Env,
        keyed: bool,
    },
}

/// The graph itself plus the reference counts of shared vertices.
#[derive(Debug, Default)]
pub struct Fg {
    graph: StableDiGraph<Vertex, String>,
    refcounts: AHashMap<VertexId, u32>,
}

impl Fg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, v: Vertex) -> VertexId {
        VertexId(self.graph.add_node(v))
    }

    /// Adds a named edge carrying `from`'s value into `to`'s port `label`.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId, label: impl Into<String>) -> EdgeId {
        EdgeId(self.graph.add_edge(from.0, to.0, label.into()))
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.graph[id.0]
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        &mut self.graph[id.0]
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.graph.contains_node(id.0)
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// The labelled inputs of a vertex: `(port, source)` pairs.
    pub fn inputs(&self, id: VertexId) -> Vec<(String, VertexId)> {
        let mut out: Vec<(String, VertexId)> = self
            .graph
            .edges_directed(id.0, petgraph::Direction::Incoming)
            .map(|e| (e.weight().clone(), VertexId(e.source())))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Vertices in a deterministic topological order.
    ///
    /// Expansion vertices may have cycles with nothing pending; the graph
    /// proper is always a DAG, so toposort cannot fail after construction.
    pub fn topo(&self) -> Vec<VertexId> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|order| order.into_iter().map(VertexId).collect())
            .unwrap_or_else(|_| self.graph.node_indices().map(VertexId).collect())
    }

    /// Increments a shared vertex's reference count.
    pub fn ref_inc(&mut self, id: VertexId) {
        *self.refcounts.entry(id).or_insert(0) += 1;
    }

    /// Decrements a reference count; true when the count reaches zero and
    /// the vertex is no longer shared.
    pub fn ref_dec(&mut self, id: VertexId) -> bool {
        match self.refcounts.get_mut(&id) {
            Some(c) if *c > 1 => {
                *c -= 1;
                false
            }
            Some(_) => {
                self.refcounts.remove(&id);
                true
            }
            None => true,
        }
    }

    pub fn is_shared(&self, id: VertexId) -> bool {
        self.refcounts.get(&id).is_some_and(|c| *c > 0)
    }

    pub(crate) fn remove_vertex(&mut self, id: VertexId) {
        self.graph.remove_node(id.0);
    }

    pub(crate) fn remove_edge(&mut self, id: EdgeId) {
        self.graph.remove_edge(id.0);
    }

    /// Renders the graph in graphviz dot form for the tracer.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph fg {\n");
        for n in self.graph.node_indices() {
            let label = match &self.graph[n] {
                Vertex::Const(v) => format!("const {v}"),
                Vertex::Composite(CompositeKind::List(n)) => format!("list[{n}]"),
                Vertex::Composite(CompositeKind::Map(n)) => format!("map[{n}]"),
                Vertex::Composite(CompositeKind::Struct(f)) => format!("struct[{}]", f.len()),
                Vertex::Select => "if".to_owned(),
                Vertex::Closure { typ, .. } => format!("closure {typ}"),
                Vertex::BuiltinCall { name, .. } => format!("builtin {name}"),
                Vertex::Apply { .. } => "apply".to_owned(),
                Vertex::Expand { keyed, .. } => if *keyed { "forkv" } else { "for" }.to_owned(),
            };
            let _ = writeln!(out, "  n{} [label=\"{}\"];", n.index(), label.replace('"', "'"));
        }
        for e in self.graph.edge_indices() {
            if let Some((a, b)) = self.graph.edge_endpoints(e) {
                let _ = writeln!(
                    out,
                    "  n{} -> n{} [label=\"{}\"];",
                    a.index(),
                    b.index(),
                    self.graph[e].replace('"', "'")
                );
            }
        }
        out.push_str("}\n");
        out
    }
}
