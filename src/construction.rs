// Roel Kluin, 2023, GPL v3

//! Parallel loading of edge segments into a graph.

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::ids::VertexId;
use crate::sequence::Sequence;
use ahash::{AHashMap, AHashSet, RandomState};
use crossbeam_channel::{bounded, Receiver};
use derive_more::{Add, AddAssign, Sum};
use parking_lot::Mutex;
use tracing::{debug, info};

const SHARDS: usize = 64;

/// Canonical k-mer to vertex, so both strands of a k-mer resolve to one twin pair.
pub struct KmerVertexMap {
    shards: Vec<Mutex<AHashMap<Sequence, VertexId>>>,
    hasher: RandomState,
}

impl Default for KmerVertexMap {
    fn default() -> Self {
        KmerVertexMap {
            shards: (0..SHARDS).map(|_| Mutex::new(AHashMap::new())).collect(),
            hasher: RandomState::new(),
        }
    }
}

impl KmerVertexMap {
    fn shard(&self, canonical: &Sequence) -> usize {
        (self.hasher.hash_one(canonical) % SHARDS as u64) as usize
    }

    /// The vertex labelled `kmer`, created with its twin if neither strand is known yet.
    pub fn get_or_insert(&self, graph: &Graph, kmer: &Sequence) -> Result<VertexId> {
        let canonical = kmer.canonical();
        let v = {
            let mut shard = self.shards[self.shard(&canonical)].lock();
            match shard.get(&canonical) {
                Some(&v) => v,
                None => {
                    let v = graph.add_vertex(canonical.clone())?;
                    shard.insert(canonical.clone(), v);
                    v
                }
            }
        };
        if canonical == *kmer {
            Ok(v)
        } else {
            graph.conjugate_vertex(v)
        }
    }
    pub fn get(&self, kmer: &Sequence) -> Option<VertexId> {
        let canonical = kmer.canonical();
        let v = *self.shards[self.shard(&canonical)].lock().get(&canonical)?;
        Some(v)
    }
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical segments already turned into edges.
struct SeenSegments {
    shards: Vec<Mutex<AHashSet<Sequence>>>,
    hasher: RandomState,
}

impl SeenSegments {
    fn new() -> Self {
        SeenSegments {
            shards: (0..SHARDS).map(|_| Mutex::new(AHashSet::new())).collect(),
            hasher: RandomState::new(),
        }
    }
    /// True the first time either strand of `canonical` is offered.
    fn insert(&self, canonical: Sequence) -> bool {
        let shard = (self.hasher.hash_one(&canonical) % SHARDS as u64) as usize;
        self.shards[shard].lock().insert(canonical)
    }
}

#[derive(new, Clone, Copy, Debug, Default, PartialEq, Eq, Add, AddAssign, Sum)]
pub struct ConstructionStats {
    pub segments: usize,
    pub edges: usize,
    pub duplicates: usize,
    /// Shorter than k + 1.
    pub skipped: usize,
}

/// Fans segments out over worker threads that add them as edges.
#[derive(new, Clone, Copy, Debug)]
pub struct ConstructionThreads {
    threads: usize,
}

impl ConstructionThreads {
    pub fn build<I>(&self, graph: &Graph, segments: I) -> Result<ConstructionStats>
    where
        I: IntoIterator<Item = Sequence>,
    {
        let kmers = KmerVertexMap::default();
        self.build_with(graph, &kmers, segments)
    }

    /// As `build`, resolving end k-mers through a map the caller keeps, e.g. across batches.
    pub fn build_with<I>(
        &self,
        graph: &Graph,
        kmers: &KmerVertexMap,
        segments: I,
    ) -> Result<ConstructionStats>
    where
        I: IntoIterator<Item = Sequence>,
    {
        let ct = self.threads.max(1);
        let seen = SeenSegments::new();
        let (tx, rx) = bounded::<Sequence>(ct * 64);
        info!(threads = ct, "building graph");

        let stats = crossbeam::scope(|s| {
            let workers: Vec<_> = (0..ct)
                .map(|nr| {
                    let rx = rx.clone();
                    let (seen, kmers) = (&seen, kmers);
                    s.spawn(move |_| work(nr, graph, kmers, seen, rx))
                })
                .collect();
            drop(rx);
            for segment in segments {
                if tx.send(segment).is_err() {
                    // every worker is gone; the join below reports why
                    break;
                }
            }
            drop(tx);
            workers
                .into_iter()
                .map(|w| {
                    w.join().map_err(|_| {
                        GraphError::invariant("construction worker panicked", Vec::new())
                    })?
                })
                .sum::<Result<ConstructionStats>>()
        })
        .map_err(|_| GraphError::invariant("construction scope panicked", Vec::new()))??;
        info!(
            segments = stats.segments,
            edges = stats.edges,
            duplicates = stats.duplicates,
            skipped = stats.skipped,
            "graph built"
        );
        Ok(stats)
    }
}

fn work(
    nr: usize,
    graph: &Graph,
    kmers: &KmerVertexMap,
    seen: &SeenSegments,
    rx: Receiver<Sequence>,
) -> Result<ConstructionStats> {
    let k = graph.k();
    let mut stats = ConstructionStats::default();
    for segment in rx.iter() {
        stats.segments += 1;
        if segment.len() <= k {
            stats.skipped += 1;
            continue;
        }
        if !seen.insert(segment.canonical()) {
            stats.duplicates += 1;
            continue;
        }
        let from = kmers.get_or_insert(graph, &segment.subseq(0, k))?;
        let to = kmers.get_or_insert(graph, &segment.subseq(segment.len() - k, segment.len()))?;
        graph.add_edge(from, to, segment)?;
        stats.edges += 1;
    }
    debug!(nr, edges = stats.edges, "construction worker done");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;

    fn seq(s: &str) -> Sequence {
        s.parse().unwrap()
    }

    #[test]
    fn kmer_map_resolves_both_strands() {
        let g = Graph::new(&GraphConfig::with_k(3)).unwrap();
        let kmers = KmerVertexMap::default();
        let v = kmers.get_or_insert(&g, &seq("AAC")).unwrap();
        let t = kmers.get_or_insert(&g, &seq("GTT")).unwrap();
        assert_eq!(g.conjugate_vertex(v).unwrap(), t);
        assert_eq!(kmers.get_or_insert(&g, &seq("AAC")).unwrap(), v);
        assert_eq!(kmers.len(), 1);
        assert_eq!(g.vertex_count(), 2);
    }

    #[test]
    fn duplicate_and_short_segments() {
        let g = Graph::new(&GraphConfig::with_k(3)).unwrap();
        let segments = ["AACGT", "ACGTT", "AAC", "AACGTG"].map(seq);
        let stats = ConstructionThreads::new(2).build(&g, segments).unwrap();
        // ACGTT is the reverse complement of AACGT
        assert_eq!(stats, ConstructionStats::new(4, 2, 1, 1));
        assert_eq!(g.edge_count(), 4);
        g.check_invariants().unwrap();
    }
}
