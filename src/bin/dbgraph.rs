// Roel Kluin, 2023, GPL v3

extern crate dbgraph;

// target/release/dbgraph build -k 31 -i unitigs.fa -o asm
// target/release/dbgraph simplify -i asm -o asm.simple
// target/release/dbgraph export -i asm.simple -o contigs.fa

use anyhow::Result;
use clap::{Parser, Subcommand};
use dbgraph::cmd;
use std::path;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Subcommand, Debug)]
enum Commands {
    /// Builds a graph from edge segments
    Build(cmd::BuildCmd),

    /// Clips tips, removes bulges and compresses unipaths
    Simplify(cmd::SimplifyCmd),

    /// Checks a saved graph and prints its size
    Stats(cmd::StatsCmd),

    /// Writes the edges of a saved graph as FASTA
    Export(cmd::ExportCmd),
}

/// de Bruijn graph construction and simplification
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Dbgraph {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<path::PathBuf>,

    /// Turn debugging information on
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn init_logging(debug: u8) {
    let level = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn main() -> Result<()> {
    let dbgraph = Dbgraph::parse();
    init_logging(dbgraph.debug);
    let config = cmd::load_config(dbgraph.config.as_ref())?;

    match dbgraph.command {
        Some(Commands::Build(build_cmd)) => cmd::build(build_cmd, config),
        Some(Commands::Simplify(simplify_cmd)) => cmd::simplify(simplify_cmd, config),
        Some(Commands::Stats(stats_cmd)) => cmd::stats(stats_cmd, config),
        Some(Commands::Export(export_cmd)) => cmd::export(export_cmd, config),
        None => Ok(()),
    }
}
