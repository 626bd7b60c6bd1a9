// Roel Kluin, 2023, GPL v3

use super::{EventMask, GraphEvent, GraphHandler};
use crate::error::{HandlerFault, Result};
use crate::graph::Graph;
use crate::ids::EdgeId;
use ahash::AHashMap;
use parking_lot::RwLock;

/// Total k-mer count per edge. Mean coverage is the count over the edge length.
#[derive(Default)]
pub struct CoverageIndex {
    counts: RwLock<AHashMap<EdgeId, u64>>,
}

impl CoverageIndex {
    pub fn add(&self, e: EdgeId, count: u64) {
        *self.counts.write().entry(e).or_insert(0) += count;
    }
    /// Add `count` to `e` and its twin, once for a self-conjugate edge.
    pub fn add_symmetric(&self, graph: &Graph, e: EdgeId, count: u64) -> Result<()> {
        let t = graph.conjugate_edge(e)?;
        self.add(e, count);
        if t != e {
            self.add(t, count);
        }
        Ok(())
    }
    pub fn count(&self, e: EdgeId) -> u64 {
        self.counts.read().get(&e).copied().unwrap_or(0)
    }
    pub fn coverage(&self, graph: &Graph, e: EdgeId) -> Result<f64> {
        let length = graph.length(e)?;
        Ok(self.count(e) as f64 / length.max(1) as f64)
    }
    pub fn len(&self) -> usize {
        self.counts.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GraphHandler for CoverageIndex {
    fn name(&self) -> &str {
        "coverage_index"
    }

    fn events(&self) -> EventMask {
        EventMask::MERGING_PATHS
            | EventMask::SPLITTING_EDGE
            | EventMask::GLUING_EDGES
            | EventMask::DELETING_EDGE
    }

    fn handle(&self, graph: &Graph, event: &GraphEvent) -> std::result::Result<(), HandlerFault> {
        let mut counts = self.counts.write();
        match event {
            GraphEvent::MergingPaths { old, new } => {
                let total = old.iter().filter_map(|e| counts.get(e)).sum();
                counts.insert(*new, total);
            }
            GraphEvent::SplittingEdge { old, pos, new } => {
                let total = counts.get(old).copied().unwrap_or(0);
                let length = graph
                    .length(*old)
                    .map_err(|e| HandlerFault(format!("split of {old}: {e}")))?;
                let first = (total as u128 * *pos as u128 / length.max(1) as u128) as u64;
                counts.insert(new.0, first);
                counts.insert(new.1, total - first);
            }
            GraphEvent::GluingEdges { e1, keep, .. } => {
                let moved = counts.get(e1).copied().unwrap_or(0);
                *counts.entry(*keep).or_insert(0) += moved;
            }
            GraphEvent::DeletingEdge(e) => {
                counts.remove(e);
            }
            _ => {}
        }
        Ok(())
    }
}
