// Roel Kluin, 2023, GPL v3

use crate::config::AssemblyConfig;
use crate::graph::Graph;
use crate::persistence;
use anyhow::Result;
use clap::Args;
use itertools::Itertools;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct StatsCmd {
    /// Prefix of the saved graph
    #[arg(short, long, value_name = "PREFIX", required = true)]
    input: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub vertices: usize,
    pub palindromic_vertices: usize,
    pub edges: usize,
    pub self_conjugate_edges: usize,
    /// Over one strand, in k-mers.
    pub total_length: usize,
    pub n50: usize,
}

/// Counts over one strand: each twin pair counts once.
pub fn graph_stats(graph: &Graph) -> Result<GraphStats> {
    let mut stats = GraphStats {
        vertices: graph.vertex_count(),
        edges: graph.edge_count(),
        ..Default::default()
    };
    for v in graph.vertices() {
        if graph.is_palindromic_vertex(v)? {
            stats.palindromic_vertices += 1;
        }
    }
    let mut lengths = Vec::new();
    for e in graph.edges() {
        let t = graph.conjugate_edge(e)?;
        if t == e {
            stats.self_conjugate_edges += 1;
        }
        if e <= t {
            lengths.push(graph.length(e)?);
        }
    }
    stats.total_length = lengths.iter().sum();
    let mut running = 0;
    for len in lengths.into_iter().sorted_unstable_by(|a, b| b.cmp(a)) {
        running += len;
        if 2 * running >= stats.total_length {
            stats.n50 = len;
            break;
        }
    }
    Ok(stats)
}

pub fn stats(cmd: StatsCmd, config: AssemblyConfig) -> Result<()> {
    let graph = persistence::load_with(&cmd.input, &config.graph)?;
    let s = graph_stats(&graph)?;
    println!("k\t{}", graph.k());
    println!("vertices\t{}\t({} palindromic)", s.vertices, s.palindromic_vertices);
    println!("edges\t{}\t({} self-conjugate)", s.edges, s.self_conjugate_edges);
    println!("total length\t{}", s.total_length);
    println!("N50\t{}", s.n50);
    Ok(())
}
