// Roel Kluin, 2023, GPL v3

use crate::error::Result;
use crate::ids::{EdgeId, VertexId};
use crate::sequence::Sequence;
use crate::table::EntityTable;
use serde::{Deserialize, Serialize};

/// An edge spelling `sequence`, whose first and last k nucleotides are the labels of `from`
/// and `to`. Immutable once installed.
#[derive(new, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    from: VertexId,
    to: VertexId,
    sequence: Sequence,
    palindromic: bool,
}

impl EdgeRecord {
    pub fn from(&self) -> VertexId {
        self.from
    }
    pub fn to(&self) -> VertexId {
        self.to
    }
    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }
    /// Length in k-mers.
    pub fn length(&self, k: usize) -> usize {
        self.sequence.len().saturating_sub(k)
    }
    pub fn is_palindromic(&self) -> bool {
        self.palindromic
    }
}

pub type EdgeStore = EntityTable<EdgeId, EdgeRecord>;

impl EdgeStore {
    pub fn endpoints(&self, e: EdgeId) -> Result<(VertexId, VertexId)> {
        self.read(e, |r| (r.from, r.to))
    }
    pub fn sequence(&self, e: EdgeId) -> Result<Sequence> {
        self.read(e, |r| r.sequence.clone())
    }
    pub fn length(&self, e: EdgeId, k: usize) -> Result<usize> {
        self.read(e, |r| r.length(k))
    }
}
