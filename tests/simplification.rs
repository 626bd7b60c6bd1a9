// Roel Kluin, 2023, GPL v3

mod common;

use common::{graph, random_seq, seq, unipath};
use dbgraph::config::{BulgeRemoverConfig, SimplificationConfig, TipClipperConfig};
use dbgraph::handlers::CoverageIndex;
use dbgraph::simplification::{clip_tips, compress_all, remove_bulges, simplify};
use dbgraph::{EdgeId, Graph, Sequence};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn coverage(g: &Graph) -> Arc<CoverageIndex> {
    let coverage = Arc::new(CoverageIndex::default());
    g.handlers().register(coverage.clone());
    coverage
}

/// Give `e` and its twin a mean coverage of `depth`.
fn cover(g: &Graph, coverage: &CoverageIndex, e: EdgeId, depth: u64) {
    let count = depth * g.length(e).unwrap() as u64;
    coverage.add_symmetric(g, e, count).unwrap();
}

fn joined(parts: &[&Sequence]) -> Sequence {
    parts.iter().flat_map(|s| s.iter()).collect()
}

#[test]
fn weak_tip_is_clipped() {
    let mut rng = StdRng::seed_from_u64(17);
    let (g, counter) = graph(5);
    let cov = coverage(&g);
    let p = unipath(&g, &mut rng, 10, 15);
    let x = g.label(p.b).unwrap();
    let tip_seq = joined(&[&random_seq(&mut rng, 6), &x]);
    let t = g.add_vertex(tip_seq.subseq(0, 5)).unwrap();
    let tip = g.add_edge(t, p.b, tip_seq).unwrap();
    cover(&g, &cov, p.e1, 10);
    cover(&g, &cov, p.e2, 10);
    cover(&g, &cov, tip, 1);
    assert_eq!(g.vertex_count(), 8);

    let clipped = clip_tips(&g, &cov, &TipClipperConfig::default()).unwrap();
    assert_eq!(clipped, 1);
    assert!(!g.contains_edge(tip));
    assert!(!g.contains_vertex(t));
    // the main path was compressed afterwards
    assert_eq!(g.vertex_count(), 4);
    assert_eq!(g.edge_count(), 2);
    let e = g.out_edges(p.a).unwrap()[0];
    assert_eq!(g.sequence(e).unwrap(), p.spelled);
    assert_eq!(cov.count(e), 10 * 10 + 10 * 15);
    assert_eq!(counter.vertices(), 4);
    g.check_invariants().unwrap();
}

#[test]
fn covered_tip_is_kept() {
    let mut rng = StdRng::seed_from_u64(18);
    let (g, _) = graph(5);
    let cov = coverage(&g);
    let p = unipath(&g, &mut rng, 10, 15);
    let x = g.label(p.b).unwrap();
    let tip_seq = joined(&[&random_seq(&mut rng, 6), &x]);
    let t = g.add_vertex(tip_seq.subseq(0, 5)).unwrap();
    let tip = g.add_edge(t, p.b, tip_seq).unwrap();
    cover(&g, &cov, p.e1, 10);
    cover(&g, &cov, p.e2, 10);
    cover(&g, &cov, tip, 8);

    let config = TipClipperConfig {
        max_coverage: 5.0,
        ..TipClipperConfig::default()
    };
    assert_eq!(clip_tips(&g, &cov, &config).unwrap(), 0);
    assert!(g.contains_edge(tip));
    assert_eq!(g.vertex_count(), 8);
}

#[test]
fn bulge_is_glued_onto_best_covered_edge() {
    let mut rng = StdRng::seed_from_u64(19);
    let (g, _) = graph(5);
    let cov = coverage(&g);
    let a = g.add_vertex(seq("AACGT")).unwrap();
    let b = g.add_vertex(seq("GGATC")).unwrap();
    let (la, lb) = (g.label(a).unwrap(), g.label(b).unwrap());
    let strong = g
        .add_edge(a, b, joined(&[&la, &random_seq(&mut rng, 5), &lb]))
        .unwrap();
    let weak = g
        .add_edge(a, b, joined(&[&la, &random_seq(&mut rng, 5), &lb]))
        .unwrap();
    cover(&g, &cov, strong, 10);
    cover(&g, &cov, weak, 1);

    let removed = remove_bulges(&g, &cov, &BulgeRemoverConfig::default()).unwrap();
    assert_eq!(removed, 1);
    assert!(g.contains_edge(strong));
    assert!(!g.contains_edge(weak));
    assert_eq!(g.edge_count(), 2);
    assert_eq!(cov.count(strong), 10 * 10 + 10);
    let t = g.conjugate_edge(strong).unwrap();
    assert_eq!(cov.count(t), 10 * 10 + 10);
    g.check_invariants().unwrap();
}

#[test]
fn long_bulge_is_kept() {
    let mut rng = StdRng::seed_from_u64(20);
    let (g, _) = graph(5);
    let cov = coverage(&g);
    let a = g.add_vertex(seq("AACGT")).unwrap();
    let b = g.add_vertex(seq("GGATC")).unwrap();
    let (la, lb) = (g.label(a).unwrap(), g.label(b).unwrap());
    for depth in [10, 1] {
        // 25 k-mers, over 3 * k
        let e = g
            .add_edge(a, b, joined(&[&la, &random_seq(&mut rng, 20), &lb]))
            .unwrap();
        cover(&g, &cov, e, depth);
    }
    assert_eq!(remove_bulges(&g, &cov, &BulgeRemoverConfig::default()).unwrap(), 0);
    assert_eq!(g.edge_count(), 4);
}

#[test]
fn compress_all_merges_chains() {
    let mut rng = StdRng::seed_from_u64(21);
    let (g, _) = graph(7);
    let s = random_seq(&mut rng, 7 + 4 * 6);
    let vertices: Vec<_> = (0..5)
        .map(|i| g.add_vertex(s.subseq(6 * i, 6 * i + 7)).unwrap())
        .collect();
    for i in 0..4 {
        g.add_edge(vertices[i], vertices[i + 1], s.subseq(6 * i, 6 * i + 13))
            .unwrap();
    }
    assert_eq!(compress_all(&g).unwrap(), 1);
    assert_eq!(g.vertex_count(), 4);
    assert_eq!(g.edge_count(), 2);
    let e = g.out_edges(vertices[0]).unwrap()[0];
    assert_eq!(g.sequence(e).unwrap(), s);
    assert_eq!(g.length(e).unwrap(), 24);
    // nothing left to do
    assert_eq!(compress_all(&g).unwrap(), 0);
    g.check_invariants().unwrap();
}

#[test]
fn simplify_runs_until_quiet() {
    let mut rng = StdRng::seed_from_u64(22);
    let (g, _) = graph(5);
    let cov = coverage(&g);
    let p = unipath(&g, &mut rng, 10, 15);
    let x = g.label(p.b).unwrap();
    let tip_seq = joined(&[&random_seq(&mut rng, 6), &x]);
    let t = g.add_vertex(tip_seq.subseq(0, 5)).unwrap();
    let tip = g.add_edge(t, p.b, tip_seq).unwrap();
    cover(&g, &cov, p.e1, 10);
    cover(&g, &cov, p.e2, 10);
    cover(&g, &cov, tip, 1);

    let stats = simplify(&g, &cov, &SimplificationConfig::default()).unwrap();
    assert_eq!((stats.tips, stats.bulges, stats.compressed), (1, 0, 0));
    assert_eq!(g.edge_count(), 2);
    g.check_invariants().unwrap();
}
