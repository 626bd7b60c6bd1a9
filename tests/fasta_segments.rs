// Roel Kluin, 2023, GPL v3

mod common;

use dbgraph::cmd::export::write_edges;
use dbgraph::cmd::{parse_fasta_file, segments};
use dbgraph::construction::ConstructionThreads;
use dbgraph::{Graph, GraphConfig};
use noodles_fasta::{
    self as fasta,
    record::{Definition, Sequence},
};
use std::io::Write;
use std::path::PathBuf;

#[test]
fn test_parse_fasta() {
    let mut temp_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(temp_file, ">seq1\nATCG\n>seq2\nGCTA").unwrap();
    let file_path = PathBuf::from(temp_file.path());

    let mut reader = parse_fasta_file(file_path).unwrap();
    let mut records = reader.records();

    assert_eq!(
        records.next().transpose().unwrap(),
        Some(fasta::Record::new(
            Definition::new("seq1", None),
            Sequence::from(b"ATCG".to_vec()),
        ))
    );
    assert_eq!(
        records.next().transpose().unwrap(),
        Some(fasta::Record::new(
            Definition::new("seq2", None),
            Sequence::from(b"GCTA".to_vec()),
        ))
    );
    assert_eq!(records.next().transpose().unwrap(), None);
}

#[test]
fn missing_fasta_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(parse_fasta_file(dir.path().join("absent.fa")).is_err());
}

#[test]
fn build_and_export() {
    let mut temp_file = tempfile::NamedTempFile::new().unwrap();
    // the second record splits at N into two edges; the third is the twin of the first
    writeln!(
        temp_file,
        ">a\nAACCGGTTA\n>b\nCCGGTTACANTTACAGG\n>c\nTAACCGGTT"
    )
    .unwrap();

    let k = 5;
    let mut reader = parse_fasta_file(temp_file.path()).unwrap();
    let mut segs = Vec::new();
    for record in reader.records() {
        let record = record.unwrap();
        segs.extend(segments(record.sequence().as_ref(), k));
    }
    assert_eq!(segs.len(), 4);

    let g = Graph::new(&GraphConfig::with_k(k)).unwrap();
    let stats = ConstructionThreads::new(3).build(&g, segs).unwrap();
    assert_eq!((stats.edges, stats.duplicates), (3, 1));
    assert_eq!(g.edge_count(), 6);
    g.check_invariants().unwrap();

    let mut out = Vec::new();
    assert_eq!(write_edges(&g, &mut out).unwrap(), 3);
    let mut reader = fasta::Reader::new(&out[..]);
    let mut exported: Vec<(String, String)> = reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            let seq = String::from_utf8(r.sequence().as_ref().to_vec()).unwrap();
            let rc = common::seq(&seq).reverse_complement().to_string();
            (seq.min(rc), r.name().to_string())
        })
        .collect();
    exported.sort();
    let seqs: Vec<&str> = exported.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(seqs, vec!["AACCGGTTA", "CCGGTTACA", "CCTGTAA"]);
    for (seq, name) in &exported {
        let len = seq.len() - k;
        assert!(name.starts_with("EDGE_"), "{name}");
        assert!(name.ends_with(&format!("_length_{len}")), "{name}");
    }
}
