// Roel Kluin, 2023, GPL v3

#![allow(dead_code)]

use dbgraph::handlers::EntityCounter;
use dbgraph::sequence::TwoBit;
use dbgraph::{EdgeId, Graph, GraphConfig, GraphEvent, GraphHandler, HandlerFault, Sequence, VertexId};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;

pub fn seq(s: &str) -> Sequence {
    s.parse().unwrap()
}

pub fn random_seq<R: Rng>(rng: &mut R, len: usize) -> Sequence {
    (0..len).map(|_| TwoBit::new(rng.gen_range(0..4))).collect()
}

/// A graph with small initial tables, so growth is exercised, and a counter registered.
pub fn graph(k: usize) -> (Graph, Arc<EntityCounter>) {
    let g = Graph::new(&GraphConfig {
        initial_capacity: 8,
        ..GraphConfig::with_k(k)
    })
    .unwrap();
    let counter = Arc::new(EntityCounter::default());
    g.handlers().register(counter.clone());
    (g, counter)
}

/// Records every event it sees.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<GraphEvent>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl GraphHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn handle(&self, _graph: &Graph, event: &GraphEvent) -> Result<(), HandlerFault> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// `a -e1-> b -e2-> c` spelled by one random sequence, with edge lengths `l1` and `l2`.
pub struct Unipath {
    pub a: VertexId,
    pub b: VertexId,
    pub c: VertexId,
    pub e1: EdgeId,
    pub e2: EdgeId,
    pub spelled: Sequence,
}

pub fn unipath<R: Rng>(g: &Graph, rng: &mut R, l1: usize, l2: usize) -> Unipath {
    let k = g.k();
    let s = random_seq(rng, l1 + l2 + k);
    let a = g.add_vertex(s.subseq(0, k)).unwrap();
    let b = g.add_vertex(s.subseq(l1, l1 + k)).unwrap();
    let c = g.add_vertex(s.subseq(l1 + l2, l1 + l2 + k)).unwrap();
    let e1 = g.add_edge(a, b, s.subseq(0, l1 + k)).unwrap();
    let e2 = g.add_edge(b, c, s.subseq(l1, l1 + l2 + k)).unwrap();
    Unipath {
        a,
        b,
        c,
        e1,
        e2,
        spelled: s,
    }
}

/// The graph up to renaming of ids: sorted labels, and sorted edges as
/// (label of from, label of to, sequence).
pub fn shape(g: &Graph) -> (Vec<String>, Vec<(String, String, String)>) {
    let mut labels: Vec<String> = g.vertices().map(|v| g.label(v).unwrap().to_string()).collect();
    labels.sort();
    let mut edges: Vec<_> = g
        .edges()
        .map(|e| {
            let (from, to) = g.endpoints(e).unwrap();
            (
                g.label(from).unwrap().to_string(),
                g.label(to).unwrap().to_string(),
                g.sequence(e).unwrap().to_string(),
            )
        })
        .collect();
    edges.sort();
    (labels, edges)
}
