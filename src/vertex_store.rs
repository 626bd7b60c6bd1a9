// Roel Kluin, 2023, GPL v3

use crate::ids::{EdgeId, VertexId};
use crate::sequence::Sequence;
use crate::table::EntityTable;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub type Adjacency = SmallVec<[EdgeId; 4]>;

/// A k-mer vertex with its adjacency lists, in insertion order.
#[derive(new, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRecord {
    label: Sequence,
    #[new(default)]
    outgoing: Adjacency,
    #[new(default)]
    incoming: Adjacency,
    palindromic: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Out,
    In,
}

impl VertexRecord {
    pub(crate) fn with_adjacency(
        label: Sequence,
        outgoing: Adjacency,
        incoming: Adjacency,
        palindromic: bool,
    ) -> Self {
        VertexRecord {
            label,
            outgoing,
            incoming,
            palindromic,
        }
    }
    pub fn label(&self) -> &Sequence {
        &self.label
    }
    pub fn outgoing(&self) -> &[EdgeId] {
        &self.outgoing
    }
    pub fn incoming(&self) -> &[EdgeId] {
        &self.incoming
    }
    pub fn out_degree(&self) -> usize {
        self.outgoing.len()
    }
    pub fn in_degree(&self) -> usize {
        self.incoming.len()
    }
    pub fn degree(&self) -> usize {
        self.out_degree() + self.in_degree()
    }
    pub fn is_palindromic(&self) -> bool {
        self.palindromic
    }
    pub(crate) fn list_mut(&mut self, side: Side) -> &mut Adjacency {
        match side {
            Side::Out => &mut self.outgoing,
            Side::In => &mut self.incoming,
        }
    }
}

pub type VertexStore = EntityTable<VertexId, VertexRecord>;

impl VertexStore {
    pub fn label(&self, v: VertexId) -> crate::Result<Sequence> {
        self.read(v, |r| r.label.clone())
    }
    pub fn out_edges(&self, v: VertexId) -> crate::Result<Adjacency> {
        self.read(v, |r| r.outgoing.clone())
    }
    pub fn in_edges(&self, v: VertexId) -> crate::Result<Adjacency> {
        self.read(v, |r| r.incoming.clone())
    }
    pub fn out_degree(&self, v: VertexId) -> crate::Result<usize> {
        self.read(v, VertexRecord::out_degree)
    }
    pub fn in_degree(&self, v: VertexId) -> crate::Result<usize> {
        self.read(v, VertexRecord::in_degree)
    }
    pub fn degree(&self, v: VertexId) -> crate::Result<usize> {
        self.read(v, VertexRecord::degree)
    }
}
