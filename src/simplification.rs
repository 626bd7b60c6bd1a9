// Roel Kluin, 2023, GPL v3

//! Single-writer clean-up passes, built on the mutator alone.

use crate::config::{BulgeRemoverConfig, SimplificationConfig, TipClipperConfig};
use crate::error::Result;
use crate::graph::Graph;
use crate::handlers::{CompressionQueue, CoverageIndex};
use crate::ids::{EdgeId, VertexId};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimplificationStats {
    pub tips: usize,
    pub bulges: usize,
    pub compressed: usize,
}

/// Merge every unipath. Returns the number of merges.
pub fn compress_all(graph: &Graph) -> Result<usize> {
    let vertices: Vec<VertexId> = graph.vertices().collect();
    let mut merged = 0;
    for v in vertices {
        if graph.contains_vertex(v) && graph.compress_vertex(v)?.is_some() {
            merged += 1;
        }
    }
    debug!(merged, "compressed unipaths");
    Ok(merged)
}

/// Run `pass` with a `CompressionQueue` registered, then compress around every vertex that
/// lost an edge.
fn compressing_after<T>(graph: &Graph, pass: impl FnOnce() -> Result<T>) -> Result<T> {
    let queue = Arc::new(CompressionQueue::default());
    let id = graph.handlers().register(queue.clone());
    let result = pass();
    graph.handlers().unregister(id);
    let result = result?;
    for v in queue.queue.drain() {
        if graph.contains_vertex(v) {
            graph.compress_vertex(v)?;
        }
    }
    Ok(result)
}

fn is_tip(
    graph: &Graph,
    coverage: &CoverageIndex,
    config: &TipClipperConfig,
    e: EdgeId,
) -> Result<bool> {
    let (start, end) = graph.endpoints(e)?;
    if start == end
        || graph.in_degree(start)? != 0
        || graph.out_degree(start)? != 1
        || graph.in_degree(end)? < 2
        || graph.length(e)? > config.max_tip_length
    {
        return Ok(false);
    }
    let cov = coverage.coverage(graph, e)?;
    if cov > config.max_coverage {
        return Ok(false);
    }
    let mut best = 0.0_f64;
    for other in graph.in_edges(end)? {
        if other != e {
            best = best.max(coverage.coverage(graph, other)?);
        }
    }
    Ok(cov <= config.max_relative_coverage * best)
}

/// Delete short, weakly covered edges hanging off a vertex with no other edges. A tip at the
/// end of a path is the twin of one at a start, so it goes too.
pub fn clip_tips(
    graph: &Graph,
    coverage: &CoverageIndex,
    config: &TipClipperConfig,
) -> Result<usize> {
    let clipped = compressing_after(graph, || {
        let edges: Vec<EdgeId> = graph.edges().collect();
        let mut clipped = 0;
        for e in edges {
            if !graph.contains_edge(e) || !is_tip(graph, coverage, config, e)? {
                continue;
            }
            let start = graph.edge_start(e)?;
            graph.delete_edge(e)?;
            if graph.contains_vertex(start) && graph.is_isolated(start)? {
                graph.delete_isolated_vertex(start)?;
            }
            clipped += 1;
        }
        Ok(clipped)
    })?;
    info!(clipped, "tip clipping");
    Ok(clipped)
}

/// Glue parallel edges onto the best covered edge between the same two vertices.
pub fn remove_bulges(
    graph: &Graph,
    coverage: &CoverageIndex,
    config: &BulgeRemoverConfig,
) -> Result<usize> {
    let max_length = config.max_length_div_k * graph.k();
    let removed = compressing_after(graph, || {
        let vertices: Vec<VertexId> = graph.vertices().collect();
        let mut removed = 0;
        for v in vertices {
            if !graph.contains_vertex(v) {
                continue;
            }
            let outs = graph.out_edges(v)?;
            let mut targets: Vec<VertexId> = Vec::new();
            for &e in &outs {
                let to = graph.edge_end(e)?;
                if !targets.contains(&to) {
                    targets.push(to);
                }
            }
            for to in targets {
                removed += glue_parallel(graph, coverage, config, max_length, v, to)?;
            }
        }
        Ok(removed)
    })?;
    info!(removed, "bulge removal");
    Ok(removed)
}

fn glue_parallel(
    graph: &Graph,
    coverage: &CoverageIndex,
    config: &BulgeRemoverConfig,
    max_length: usize,
    from: VertexId,
    to: VertexId,
) -> Result<usize> {
    let mut parallel = Vec::new();
    for e in graph.out_edges(from)? {
        if graph.edge_end(e)? == to && !graph.is_self_conjugate_edge(e)? {
            parallel.push((e, coverage.coverage(graph, e)?));
        }
    }
    if parallel.len() < 2 {
        return Ok(0);
    }
    // best covered first, lowest id on ties
    parallel.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let (keep, keep_cov) = parallel[0];
    let keep_len = graph.length(keep)?;
    let mut glued = 0;
    for &(e, cov) in &parallel[1..] {
        if !graph.contains_edge(e) || graph.conjugate_edge(e)? == keep {
            continue;
        }
        let len = graph.length(e)?;
        let delta = len.abs_diff(keep_len);
        if len <= max_length
            && delta <= config.max_delta
            && delta as f64 <= config.max_relative_delta * keep_len as f64
            && cov <= config.max_coverage
            && cov <= config.max_relative_coverage * keep_cov
        {
            graph.glue_edges(e, keep)?;
            glued += 1;
        }
    }
    Ok(glued)
}

/// `cycles` rounds of tip clipping and bulge removal, then a final compression.
pub fn simplify(
    graph: &Graph,
    coverage: &CoverageIndex,
    config: &SimplificationConfig,
) -> Result<SimplificationStats> {
    let mut stats = SimplificationStats::default();
    for cycle in 0..config.cycles {
        let tips = clip_tips(graph, coverage, &config.tip_clipper)?;
        let bulges = remove_bulges(graph, coverage, &config.bulge_remover)?;
        debug!(cycle, tips, bulges, "simplification cycle");
        stats.tips += tips;
        stats.bulges += bulges;
        if tips + bulges == 0 {
            break;
        }
    }
    stats.compressed = compress_all(graph)?;
    Ok(stats)
}
