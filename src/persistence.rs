// Roel Kluin, 2023, GPL v3

//! Save and load a graph as three files next to `prefix`:
//! `.vertices` and `.edges` (bincode tables) and `.seq.gz` (the packed nucleotides of every
//! label and edge sequence, gzipped; the tables point into it by byte offset).

use crate::config::GraphConfig;
use crate::edge_store::EdgeRecord;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::ids::{EdgeId, EntityId, VertexId};
use crate::sequence::Sequence;
use crate::vertex_store::{Adjacency, VertexRecord};
use bincode::{deserialize_from, serialize_into};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Header {
    k: usize,
    vertex_bias: u64,
    edge_bias: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct VertexRow {
    id: VertexId,
    twin: VertexId,
    palindromic: bool,
    label_offset: u64,
    outgoing: Adjacency,
    incoming: Adjacency,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct EdgeRow {
    id: EdgeId,
    from: VertexId,
    to: VertexId,
    twin: EdgeId,
    /// In k-mers.
    length: u64,
    sequence_offset: u64,
}

#[derive(Serialize, Deserialize)]
struct VertexTable {
    header: Header,
    rows: Vec<VertexRow>,
}

pub fn vertex_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".vertices")
}
pub fn edge_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".edges")
}
pub fn sequence_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".seq.gz")
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Appends packed sequences, handing back their byte offsets.
#[derive(Default)]
struct Blob {
    bytes: Vec<u8>,
}

impl Blob {
    fn push(&mut self, seq: &Sequence) -> u64 {
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(seq.as_packed());
        offset
    }
    fn get(&self, offset: u64, len: usize) -> Result<Sequence> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let packed = self.bytes.get(start..).ok_or_else(|| {
            GraphError::invariant("sequence offset past end of blob", vec![offset])
        })?;
        if len / 4 > packed.len() {
            return Err(GraphError::invariant(
                format!("sequence of {len} nucleotides runs past end of blob"),
                vec![offset],
            ));
        }
        Sequence::from_packed(packed, len)
    }
}

/// Write the graph. Call it between mutations.
pub fn save(graph: &Graph, prefix: impl AsRef<Path>) -> Result<()> {
    let prefix = prefix.as_ref();
    let k = graph.k();
    let mut blob = Blob::default();

    let mut vertex_rows = Vec::with_capacity(graph.vertex_count());
    for id in graph.vertices() {
        let record = graph.vertex(id)?;
        vertex_rows.push(VertexRow {
            id,
            twin: graph.conjugate_vertex(id)?,
            palindromic: record.is_palindromic(),
            label_offset: blob.push(record.label()),
            outgoing: record.outgoing().into(),
            incoming: record.incoming().into(),
        });
    }
    let mut edge_rows = Vec::with_capacity(graph.edge_count());
    for id in graph.edges() {
        let record = graph.edge(id)?;
        edge_rows.push(EdgeRow {
            id,
            from: record.from(),
            to: record.to(),
            twin: graph.conjugate_edge(id)?,
            length: record.length(k) as u64,
            sequence_offset: blob.push(record.sequence()),
        });
    }

    let table = VertexTable {
        header: Header {
            k,
            vertex_bias: graph.vertex_store().bias(),
            edge_bias: graph.edge_store().bias(),
        },
        rows: vertex_rows,
    };
    let mut out = BufWriter::new(File::create(vertex_path(prefix))?);
    serialize_into(&mut out, &table)?;
    out.flush()?;

    let mut out = BufWriter::new(File::create(edge_path(prefix))?);
    serialize_into(&mut out, &edge_rows)?;
    out.flush()?;

    let out = BufWriter::new(File::create(sequence_path(prefix))?);
    let mut gz = GzEncoder::new(out, Compression::default());
    gz.write_all(&blob.bytes)?;
    gz.finish()?.flush()?;

    info!(
        vertices = table.rows.len(),
        edges = edge_rows.len(),
        blob = blob.bytes.len(),
        prefix = %prefix.display(),
        "saved graph"
    );
    Ok(())
}

pub fn load(prefix: impl AsRef<Path>) -> Result<Graph> {
    load_with(prefix, &GraphConfig::default())
}

/// Load a saved graph. `k` and the biases come from the file, capacities and tracing from
/// `config`. Ids are restored as saved, no events fire, and the result is checked with
/// `check_invariants` before it is returned.
pub fn load_with(prefix: impl AsRef<Path>, config: &GraphConfig) -> Result<Graph> {
    let prefix = prefix.as_ref();
    let table: VertexTable = deserialize_from(BufReader::new(File::open(vertex_path(prefix))?))?;
    let edge_rows: Vec<EdgeRow> =
        deserialize_from(BufReader::new(File::open(edge_path(prefix))?))?;
    let mut blob = Blob::default();
    GzDecoder::new(BufReader::new(File::open(sequence_path(prefix))?))
        .read_to_end(&mut blob.bytes)?;

    let Header {
        k,
        vertex_bias,
        edge_bias,
    } = table.header;
    let graph = Graph::new(&GraphConfig {
        k,
        vertex_bias,
        edge_bias,
        ..config.clone()
    })?;

    for row in &table.rows {
        graph.vertices.reserve_at(row.id)?;
        let label = blob.get(row.label_offset, k)?;
        let record = VertexRecord::with_adjacency(
            label,
            row.outgoing.clone(),
            row.incoming.clone(),
            row.palindromic,
        );
        graph.vertices.install(row.id, record)?;
    }
    for row in &table.rows {
        if row.id <= row.twin {
            graph.vertex_twins.pair(row.id, row.twin)?;
        }
    }
    for row in &edge_rows {
        graph.edges.reserve_at(row.id)?;
        let len = usize::try_from(row.length)
            .ok()
            .and_then(|length| length.checked_add(k))
            .ok_or_else(|| GraphError::invariant("saved edge length overflows", vec![row.id.raw()]))?;
        let sequence = blob.get(row.sequence_offset, len)?;
        let record = EdgeRecord::new(row.from, row.to, sequence, row.id == row.twin);
        graph.edges.install(row.id, record)?;
    }
    for row in &edge_rows {
        if row.id <= row.twin {
            graph.edge_twins.pair(row.id, row.twin)?;
        }
    }
    for id in graph.vertices() {
        if !graph.vertex_twins.is_paired(id) {
            return Err(GraphError::invariant("saved vertex has no twin", vec![id.raw()]));
        }
    }
    for id in graph.edges() {
        if !graph.edge_twins.is_paired(id) {
            return Err(GraphError::invariant("saved edge has no twin", vec![id.raw()]));
        }
    }
    graph.check_invariants()?;
    info!(
        vertices = table.rows.len(),
        edges = edge_rows.len(),
        prefix = %prefix.display(),
        "loaded graph"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes_keep_dots_in_prefix() {
        let prefix = Path::new("/tmp/run.k21");
        assert_eq!(vertex_path(prefix), PathBuf::from("/tmp/run.k21.vertices"));
        assert_eq!(sequence_path(prefix), PathBuf::from("/tmp/run.k21.seq.gz"));
    }

    #[test]
    fn blob_offsets_are_bytes() {
        let mut blob = Blob::default();
        let a: Sequence = "ACGTA".parse().unwrap();
        let b: Sequence = "GG".parse().unwrap();
        assert_eq!(blob.push(&a), 0);
        assert_eq!(blob.push(&b), 2);
        assert_eq!(blob.get(0, 5).unwrap(), a);
        assert_eq!(blob.get(2, 2).unwrap(), b);
        assert!(blob.get(9, 1).is_err());
        // a corrupt length is rejected, not allocated
        assert!(matches!(
            blob.get(0, usize::MAX),
            Err(GraphError::InvariantBroken { .. })
        ));
        assert!(matches!(blob.get(2, 9), Err(GraphError::InvariantBroken { .. })));
    }

    #[test]
    fn corrupt_edge_length_is_rejected() {
        let g = Graph::new(&GraphConfig::with_k(3)).unwrap();
        let a = g.add_vertex("AAC".parse().unwrap()).unwrap();
        let b = g.add_vertex("ACA".parse().unwrap()).unwrap();
        g.add_edge(a, b, "AACA".parse().unwrap()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("g");
        save(&g, &prefix).unwrap();

        let path = edge_path(&prefix);
        let mut rows: Vec<EdgeRow> =
            deserialize_from(BufReader::new(File::open(&path).unwrap())).unwrap();
        rows[0].length = u64::MAX;
        serialize_into(BufWriter::new(File::create(&path).unwrap()), &rows).unwrap();
        assert!(matches!(
            load(&prefix),
            Err(GraphError::InvariantBroken { .. })
        ));
    }
}
