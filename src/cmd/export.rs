// Roel Kluin, 2023, GPL v3

use crate::config::AssemblyConfig;
use crate::graph::Graph;
use crate::ids::EntityId;
use crate::persistence;
use anyhow::Result;
use clap::Args;
use noodles_fasta::{
    self as fasta,
    record::{Definition, Sequence},
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ExportCmd {
    /// Prefix of the saved graph
    #[arg(short, long, value_name = "PREFIX", required = true)]
    input: PathBuf,

    /// FASTA output, stdout if absent
    #[arg(short, long, value_name = "FASTA")]
    out: Option<PathBuf>,
}

/// One record per twin pair, the strand with the lower id.
pub fn write_edges<W: Write>(graph: &Graph, out: W) -> Result<usize> {
    let mut writer = fasta::Writer::new(out);
    let mut n = 0;
    for e in graph.edges() {
        if graph.conjugate_edge(e)? < e {
            continue;
        }
        let name = format!("EDGE_{}_length_{}", e.raw(), graph.length(e)?);
        let seq = graph.sequence(e)?.to_string().into_bytes();
        let record = fasta::Record::new(Definition::new(name, None), Sequence::from(seq));
        writer.write_record(&record)?;
        n += 1;
    }
    Ok(n)
}

pub fn export(cmd: ExportCmd, config: AssemblyConfig) -> Result<()> {
    let graph = persistence::load_with(&cmd.input, &config.graph)?;
    let n = match cmd.out {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            let n = write_edges(&graph, &mut out)?;
            out.flush()?;
            n
        }
        None => write_edges(&graph, std::io::stdout().lock())?,
    };
    eprintln!("{n} edges written");
    Ok(())
}
