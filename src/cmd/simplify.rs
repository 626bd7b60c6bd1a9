// Roel Kluin, 2023, GPL v3

use crate::config::AssemblyConfig;
use crate::handlers::{CoverageIndex, EntityCounter};
use crate::persistence;
use crate::simplification;
use anyhow::{ensure, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct SimplifyCmd {
    /// Prefix of the saved graph
    #[arg(short, long, value_name = "PREFIX", required = true)]
    input: PathBuf,

    /// Output prefix
    #[arg(short, long, value_name = "PREFIX", required = true)]
    out: PathBuf,

    /// Rounds of tip clipping and bulge removal, overrides the config
    #[arg(short, long)]
    cycles: Option<usize>,

    /// Maximal tip length in k-mers, overrides the config
    #[arg(long)]
    max_tip_length: Option<usize>,
}

pub fn simplify(cmd: SimplifyCmd, mut config: AssemblyConfig) -> Result<()> {
    ensure!(cmd.input != cmd.out, "refusing to overwrite the input graph");
    if let Some(cycles) = cmd.cycles {
        config.simplification.cycles = cycles;
    }
    if let Some(len) = cmd.max_tip_length {
        config.simplification.tip_clipper.max_tip_length = len;
    }
    let graph = persistence::load_with(&cmd.input, &config.graph)?;

    // no read coverage is stored with the graph, so every edge starts at zero
    let coverage = Arc::new(CoverageIndex::default());
    let counter = Arc::new(EntityCounter::default());
    graph.handlers().register(coverage.clone());
    graph.handlers().register(counter.clone());

    let (v0, e0) = (graph.vertex_count(), graph.edge_count());
    let stats = simplification::simplify(&graph, &coverage, &config.simplification)?;
    println!(
        "{} tips clipped, {} bulges removed, {} unipaths compressed",
        stats.tips, stats.bulges, stats.compressed
    );
    println!(
        "vertices {} -> {} ({:+}), edges {} -> {} ({:+})",
        v0,
        graph.vertex_count(),
        counter.vertices(),
        e0,
        graph.edge_count(),
        counter.edges()
    );
    graph.check_invariants()?;
    persistence::save(&graph, &cmd.out)?;
    Ok(())
}
