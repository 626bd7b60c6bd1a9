// Roel Kluin, 2023, GPL v3

//! Subcommands of the `dbgraph` binary.

pub mod build;
pub mod export;
pub mod simplify;
pub mod stats;

use crate::config::AssemblyConfig;
use crate::sequence::Sequence;
use anyhow::{anyhow, Result};
use noodles_fasta as fasta;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub use build::{build, BuildCmd};
pub use export::{export, ExportCmd};
pub use simplify::{simplify, SimplifyCmd};
pub use stats::{stats, StatsCmd};

pub fn parse_fasta_file(fa: impl AsRef<Path>) -> Result<fasta::Reader<BufReader<File>>> {
    let fa = fa.as_ref();
    File::open(fa)
        .map(BufReader::new)
        .map(fasta::Reader::new)
        .map_err(|e| anyhow!("Error opening {}: {}", fa.display(), e))
}

/// The configuration file if given, defaults otherwise.
pub fn load_config(path: Option<&PathBuf>) -> Result<AssemblyConfig> {
    match path {
        Some(p) => AssemblyConfig::from_file(p)
            .map_err(|e| anyhow!("Error reading config {}: {}", p.display(), e)),
        None => Ok(AssemblyConfig::default()),
    }
}

/// The maximal runs of ACGT in `seq` that span at least one edge.
pub fn segments(seq: &[u8], k: usize) -> impl Iterator<Item = Sequence> + '_ {
    seq.split(|b| !matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T'))
        .filter(move |run| run.len() > k)
        .filter_map(|run| Sequence::from_ascii(run).ok())
}
