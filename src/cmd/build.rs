// Roel Kluin, 2023, GPL v3

use super::{parse_fasta_file, segments};
use crate::config::AssemblyConfig;
use crate::construction::ConstructionThreads;
use crate::graph::Graph;
use crate::persistence;
use anyhow::{ensure, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug)]
pub struct BuildCmd {
    /// Edge segments (e.g. unitigs) as FASTA; runs of non-ACGT split a record
    #[arg(short = 'i', long, value_name = "FASTA", required = true)]
    segments: PathBuf,

    /// Output prefix for the saved graph
    #[arg(short, long, value_name = "PREFIX", required = true)]
    out: PathBuf,

    /// k-mer length, overrides the config
    #[arg(short)]
    k: Option<usize>,

    /// Worker threads, overrides the config
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Overwrite an existing graph
    #[arg(short, long)]
    force: bool,
}

pub fn build(cmd: BuildCmd, mut config: AssemblyConfig) -> Result<()> {
    if let Some(k) = cmd.k {
        config.graph.k = k;
    }
    if let Some(threads) = cmd.threads {
        config.threads = threads;
    }
    let vertices = persistence::vertex_path(&cmd.out);
    ensure!(
        cmd.force || !Path::new(&vertices).exists(),
        "{vertices:?} already exists!"
    );
    ensure!(config.threads > 0, "need at least one thread");

    let k = config.graph.k;
    let graph = Graph::new(&config.graph)?;
    let mut fa = parse_fasta_file(&cmd.segments)?;
    let mut segs = Vec::new();
    for res in fa.records() {
        let record = res?;
        dbg_print!("Segments from record {}.", record.name());
        segs.extend(segments(record.sequence().as_ref(), k));
    }
    info!(segments = segs.len(), k, "read {:?}", cmd.segments);

    let stats = ConstructionThreads::new(config.threads).build(&graph, segs)?;
    println!(
        "{} segments: {} edges, {} duplicates, {} too short",
        stats.segments, stats.edges, stats.duplicates, stats.skipped
    );
    println!(
        "{} vertices, {} edges (both strands)",
        graph.vertex_count(),
        graph.edge_count()
    );
    persistence::save(&graph, &cmd.out)?;
    Ok(())
}
