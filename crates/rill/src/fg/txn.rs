//! Reversible FG transactions.
//!
//! Per-call-site subgraphs and per-iteration bodies are built inside a
//! transaction so they can be rolled back and replaced whenever the value
//! that shaped them (a closure, a list) changes. A transaction records
//! everything it adds; `reset` undoes exactly that, leaving shared
//! (reference-counted) vertices in place for their other users.

use crate::fg::{EdgeId, Fg, VertexId};

/// The record of one transaction's additions.
#[derive(Debug, Default, Clone)]
pub struct TxnLog {
    /// Vertices created by this transaction, in creation order.
    pub vertices: Vec<VertexId>,
    /// Edges created by this transaction.
    pub edges: Vec<EdgeId>,
    /// Pre-existing vertices this transaction took a reference on
    /// (singleton delegations and argument reuse).
    pub shared: Vec<VertexId>,
}

impl TxnLog {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.edges.is_empty() && self.shared.is_empty()
    }

    /// Absorbs another log, as when a nested subgraph is grafted into the
    /// enclosing transaction (`add_graph`).
    pub fn absorb(&mut self, other: TxnLog) {
        self.vertices.extend(other.vertices);
        self.edges.extend(other.edges);
        self.shared.extend(other.shared);
    }

    /// Undoes the transaction against the graph: removes its edges, drops
    /// its shared references, and removes its vertices (newest first)
    /// unless another user still holds a reference. Returns the vertices
    /// actually removed so the engine can purge their table entries.
    pub fn reset(self, fg: &mut Fg) -> Vec<VertexId> {
        for edge in self.edges {
            fg.remove_edge(edge);
        }
        for v in self.shared {
            fg.ref_dec(v);
        }
        let mut removed = Vec::with_capacity(self.vertices.len());
        for v in self.vertices.into_iter().rev() {
            if fg.contains(v) && !fg.is_shared(v) {
                fg.remove_vertex(v);
                removed.push(v);
            }
        }
        removed
    }
}
