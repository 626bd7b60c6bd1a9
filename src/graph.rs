// Roel Kluin, 2023, GPL v3

use crate::config::GraphConfig;
use crate::conjugate::ConjugateIndex;
use crate::edge_store::{EdgeRecord, EdgeStore};
use crate::error::{GraphError, Result};
use crate::handlers::{EventLog, HandlerRegistry};
use crate::ids::{EdgeId, EntityId, VertexId};
use crate::sequence::Sequence;
use crate::vertex_store::{Adjacency, VertexRecord, VertexStore};
use ahash::AHashMap;
use std::sync::Arc;
use tracing::debug;

/// A double-stranded de Bruijn graph: every vertex and edge has a reverse-complement twin.
///
/// All reads go through `&self`. The mutating operations (see `mutator`) take `&self` as well
/// and may run from several threads during construction.
pub struct Graph {
    k: usize,
    pub(crate) vertices: VertexStore,
    pub(crate) edges: EdgeStore,
    pub(crate) vertex_twins: ConjugateIndex<VertexId>,
    pub(crate) edge_twins: ConjugateIndex<EdgeId>,
    handlers: HandlerRegistry,
}

impl Graph {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        config.validate()?;
        let initial = config.initial_capacity.min(config.max_capacity);
        let graph = Graph {
            k: config.k,
            vertices: VertexStore::new(config.vertex_bias, initial, config.max_capacity),
            edges: EdgeStore::new(config.edge_bias, initial, config.max_capacity),
            vertex_twins: ConjugateIndex::new(config.vertex_bias, initial),
            edge_twins: ConjugateIndex::new(config.edge_bias, initial),
            handlers: HandlerRegistry::default(),
        };
        if config.trace_enabled() {
            graph.handlers.register(Arc::new(EventLog::default()));
        }
        debug!(k = config.k, capacity = initial, "new graph");
        Ok(graph)
    }

    pub fn k(&self) -> usize {
        self.k
    }
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }
    pub fn vertex_store(&self) -> &VertexStore {
        &self.vertices
    }
    pub fn edge_store(&self) -> &EdgeStore {
        &self.edges
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.live_ids().count()
    }
    pub fn edge_count(&self) -> usize {
        self.edges.live_ids().count()
    }
    /// Live vertices, ascending. Not concurrently with any mutation, see
    /// `EntityTable::live_ids`.
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.live_ids()
    }
    /// Live edges, ascending. Not concurrently with any mutation.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.live_ids()
    }
    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.vertices.contains(v)
    }
    pub fn contains_edge(&self, e: EdgeId) -> bool {
        self.edges.contains(e)
    }
    pub fn vertex(&self, v: VertexId) -> Result<VertexRecord> {
        self.vertices.at(v)
    }
    pub fn edge(&self, e: EdgeId) -> Result<EdgeRecord> {
        self.edges.at(e)
    }
    pub fn vertex_slot(&self, v: VertexId) -> Option<usize> {
        self.vertices.slot_of(v)
    }
    pub fn edge_slot(&self, e: EdgeId) -> Option<usize> {
        self.edges.slot_of(e)
    }

    pub fn label(&self, v: VertexId) -> Result<Sequence> {
        self.vertices.label(v)
    }
    pub fn out_edges(&self, v: VertexId) -> Result<Adjacency> {
        self.vertices.out_edges(v)
    }
    pub fn in_edges(&self, v: VertexId) -> Result<Adjacency> {
        self.vertices.in_edges(v)
    }
    pub fn out_degree(&self, v: VertexId) -> Result<usize> {
        self.vertices.out_degree(v)
    }
    pub fn in_degree(&self, v: VertexId) -> Result<usize> {
        self.vertices.in_degree(v)
    }
    pub fn degree(&self, v: VertexId) -> Result<usize> {
        self.vertices.degree(v)
    }
    /// Neither v nor its twin has an edge.
    pub fn is_isolated(&self, v: VertexId) -> Result<bool> {
        Ok(self.degree(v)? == 0 && self.degree(self.conjugate_vertex(v)?)? == 0)
    }

    pub fn endpoints(&self, e: EdgeId) -> Result<(VertexId, VertexId)> {
        self.edges.endpoints(e)
    }
    pub fn edge_start(&self, e: EdgeId) -> Result<VertexId> {
        Ok(self.endpoints(e)?.0)
    }
    pub fn edge_end(&self, e: EdgeId) -> Result<VertexId> {
        Ok(self.endpoints(e)?.1)
    }
    pub fn sequence(&self, e: EdgeId) -> Result<Sequence> {
        self.edges.sequence(e)
    }
    /// In k-mers.
    pub fn length(&self, e: EdgeId) -> Result<usize> {
        self.edges.length(e, self.k)
    }

    pub fn conjugate_vertex(&self, v: VertexId) -> Result<VertexId> {
        self.vertex_twins.twin(v)
    }
    pub fn conjugate_edge(&self, e: EdgeId) -> Result<EdgeId> {
        self.edge_twins.twin(e)
    }
    pub fn is_palindromic_vertex(&self, v: VertexId) -> Result<bool> {
        self.vertex_twins.is_self_conjugate(v)
    }
    pub fn is_self_conjugate_edge(&self, e: EdgeId) -> Result<bool> {
        self.edge_twins.is_self_conjugate(e)
    }

    /// The edges `in(v)` and `out(v)` when v sits inside a unipath that can be merged across
    /// it: one edge in and one out, not self-conjugate, and the merge would not touch v's twin
    /// at an end.
    pub(crate) fn pass_through(&self, v: VertexId) -> Result<Option<(EdgeId, EdgeId)>> {
        let (ins, outs, palindromic) =
            self.vertices
                .read(v, |r| (r.incoming().to_vec(), r.outgoing().to_vec(), r.is_palindromic()))?;
        if palindromic || ins.len() != 1 || outs.len() != 1 {
            return Ok(None);
        }
        let (e1, e2) = (ins[0], outs[0]);
        let t = self.conjugate_vertex(v)?;
        if t == v
            || e1 == e2
            || self.conjugate_edge(e1)? == e2
            || self.is_self_conjugate_edge(e1)?
            || self.is_self_conjugate_edge(e2)?
        {
            return Ok(None);
        }
        let u = self.edge_start(e1)?;
        let w = self.edge_end(e2)?;
        if u == t || w == t {
            return Ok(None);
        }
        Ok(Some((e1, e2)))
    }
    pub fn can_compress(&self, v: VertexId) -> Result<bool> {
        Ok(self.pass_through(v)?.is_some())
    }

    /// Full structural check. Run it between mutations, not during one.
    pub fn check_invariants(&self) -> Result<()> {
        self.check_occupancy()?;
        let k = self.k;

        for v in self.vertices() {
            let t = self.conjugate_vertex(v)?;
            if self.conjugate_vertex(t)? != v {
                return Err(GraphError::invariant("vertex twin is not an involution", raw(&[v, t])));
            }
            let record = self.vertex(v)?;
            if record.is_palindromic() != (t == v) {
                return Err(GraphError::invariant("palindromic flag disagrees with twin", raw(&[v])));
            }
            if self.label(t)? != record.label().reverse_complement() {
                return Err(GraphError::invariant("twin label is not reverse complement", raw(&[v, t])));
            }
            if record.label().len() != k {
                return Err(GraphError::invariant("vertex label is not a k-mer", raw(&[v])));
            }
        }

        // every edge appears exactly once in out(from) and once in in(to)
        let mut out_seen: AHashMap<EdgeId, usize> = AHashMap::new();
        let mut in_seen: AHashMap<EdgeId, usize> = AHashMap::new();
        for v in self.vertices() {
            let record = self.vertex(v)?;
            for &e in record.outgoing() {
                if self.edges.read(e, EdgeRecord::from).ok() != Some(v) {
                    return Err(GraphError::invariant("stray edge in out list", vec![v.raw(), e.raw()]));
                }
                *out_seen.entry(e).or_insert(0) += 1;
            }
            for &e in record.incoming() {
                if self.edges.read(e, EdgeRecord::to).ok() != Some(v) {
                    return Err(GraphError::invariant("stray edge in in list", vec![v.raw(), e.raw()]));
                }
                *in_seen.entry(e).or_insert(0) += 1;
            }
        }

        for e in self.edges() {
            let record = self.edge(e)?;
            let t = self.conjugate_edge(e)?;
            if self.conjugate_edge(t)? != e {
                return Err(GraphError::invariant("edge twin is not an involution", raw(&[e, t])));
            }
            if record.is_palindromic() != (t == e) {
                return Err(GraphError::invariant("palindromic flag disagrees with twin", raw(&[e])));
            }
            let twin = self.edge(t)?;
            if twin.length(k) != record.length(k)
                || *twin.sequence() != record.sequence().reverse_complement()
            {
                return Err(GraphError::invariant("twin edge sequence mismatch", raw(&[e, t])));
            }
            if twin.from() != self.conjugate_vertex(record.to())? {
                return Err(GraphError::invariant("from(twin e) != twin(to e)", raw(&[e, t])));
            }
            if record.sequence().len() <= k
                || !record.sequence().starts_with(&self.label(record.from())?)
                || !record.sequence().ends_with(&self.label(record.to())?)
            {
                return Err(GraphError::invariant("edge does not join its end labels", raw(&[e])));
            }
            if out_seen.get(&e) != Some(&1) || in_seen.get(&e) != Some(&1) {
                return Err(GraphError::invariant("edge not listed once at each end", raw(&[e])));
            }
        }
        Ok(())
    }

    fn check_occupancy(&self) -> Result<()> {
        let vertex_ids = self.vertices.distributor().ids().map(VertexId::from_raw);
        let orphans: Vec<u64> = vertex_ids
            .filter(|&v| !self.vertices.contains(v))
            .map(VertexId::raw)
            .collect();
        if !orphans.is_empty() {
            return Err(GraphError::invariant("occupied vertex id without record", orphans));
        }
        let edge_ids = self.edges.distributor().ids().map(EdgeId::from_raw);
        let orphans: Vec<u64> = edge_ids
            .filter(|&e| !self.edges.contains(e))
            .map(EdgeId::raw)
            .collect();
        if !orphans.is_empty() {
            return Err(GraphError::invariant("occupied edge id without record", orphans));
        }
        Ok(())
    }
}

fn raw<I: EntityId>(ids: &[I]) -> Vec<u64> {
    ids.iter().map(|id| id.raw()).collect()
}
