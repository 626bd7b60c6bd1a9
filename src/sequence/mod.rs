// Roel Kluin, 2023, GPL v3

pub mod twobit;

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
pub use twobit::TwoBit;
use twobit::TwoBitx4;

/// Nucleotide sequence, packed 4 per byte. Unused bits of the last byte are always zero, so
/// equal sequences have equal bytes.
///
/// The derived order compares length first and then the packed bytes. It is total and
/// consistent with equality, which is all `canonical` needs, but it is not lexicographic.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sequence {
    len: usize,
    packed: Vec<u8>,
}

impl Sequence {
    fn with_capacity(n: usize) -> Self {
        Sequence {
            len: 0,
            packed: Vec::with_capacity((n + 3) / 4),
        }
    }
    fn push(&mut self, b2: TwoBit) {
        if self.len & 3 == 0 {
            self.packed.push(0);
        }
        self.packed[self.len >> 2] |= b2.pos_shift(self.len);
        self.len += 1;
    }

    pub fn from_ascii(seq: &[u8]) -> Result<Self> {
        let mut s = Sequence::with_capacity(seq.len());
        for (i, &b) in seq.iter().enumerate() {
            let b2 = TwoBit::from_ascii(b).ok_or_else(|| {
                GraphError::InvalidSequence(format!("{:?} at position {}", b as char, i))
            })?;
            s.push(b2);
        }
        Ok(s)
    }
    /// Rebuild from the packed representation of `as_packed`.
    pub fn from_packed(packed: &[u8], len: usize) -> Result<Self> {
        let n_bytes = len / 4 + usize::from(len % 4 != 0);
        if packed.len() < n_bytes {
            return Err(GraphError::InvalidSequence(format!(
                "{} packed bytes cannot hold {} nucleotides",
                packed.len(),
                len
            )));
        }
        let mut s = Sequence {
            len,
            packed: packed[..n_bytes].to_vec(),
        };
        if len & 3 != 0 {
            if let Some(last) = s.packed.last_mut() {
                *last &= (1 << ((len & 3) << 1)) - 1;
            }
        }
        Ok(s)
    }
    pub fn as_packed(&self) -> &[u8] {
        &self.packed
    }

    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    #[inline]
    pub fn get(&self, i: usize) -> TwoBit {
        assert!(i < self.len, "index {} out of range for sequence of length {}", i, self.len);
        TwoBitx4::from(&self.packed[i >> 2]).to_b2(i)
    }
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = TwoBit> + ExactSizeIterator + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Nucleotides `[start, end)`.
    pub fn subseq(&self, start: usize, end: usize) -> Sequence {
        assert!(
            start <= end && end <= self.len,
            "subseq [{}, {}) out of range for length {}",
            start,
            end,
            self.len
        );
        (start..end).map(|i| self.get(i)).collect()
    }
    pub fn reverse_complement(&self) -> Sequence {
        self.iter().rev().map(|b2| b2.complement()).collect()
    }
    pub fn is_palindrome(&self) -> bool {
        self.iter()
            .zip(self.iter().rev())
            .take(self.len / 2 + 1)
            .all(|(a, b)| a == b.complement())
    }
    /// Of this sequence and its reverse complement, the smaller one.
    pub fn canonical(&self) -> Sequence {
        let rc = self.reverse_complement();
        if rc < *self {
            rc
        } else {
            self.clone()
        }
    }
    pub fn starts_with(&self, prefix: &Sequence) -> bool {
        prefix.len <= self.len && prefix.iter().enumerate().all(|(i, b2)| self.get(i) == b2)
    }
    pub fn ends_with(&self, suffix: &Sequence) -> bool {
        let offset = match self.len.checked_sub(suffix.len) {
            Some(offset) => offset,
            None => return false,
        };
        suffix
            .iter()
            .enumerate()
            .all(|(i, b2)| self.get(offset + i) == b2)
    }
    /// `self` followed by `other` without its first `k` nucleotides, which must repeat the
    /// last `k` of `self`.
    pub fn merge_overlapping(&self, other: &Sequence, k: usize) -> Sequence {
        dbg_assert!(
            k <= self.len && k <= other.len && self.ends_with(&other.subseq(0, k)),
            "{} and {} do not overlap by {}",
            self,
            other,
            k
        );
        let mut merged = Sequence::with_capacity(self.len + other.len - k);
        merged.extend(self.iter());
        merged.extend(other.iter().skip(k));
        merged
    }
}

impl Extend<TwoBit> for Sequence {
    fn extend<I: IntoIterator<Item = TwoBit>>(&mut self, iter: I) {
        for b2 in iter {
            self.push(b2);
        }
    }
}

impl FromIterator<TwoBit> for Sequence {
    fn from_iter<I: IntoIterator<Item = TwoBit>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut s = Sequence::with_capacity(iter.size_hint().0);
        s.extend(iter);
        s
    }
}

impl FromStr for Sequence {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        Sequence::from_ascii(s.as_bytes())
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ascii: String = self.iter().map(|b2| b2.as_ascii() as char).collect();
        f.write_str(&ascii)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sequence({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seq(s: &str) -> Sequence {
        s.parse().unwrap()
    }

    #[test]
    fn ascii_round_trip() {
        let s = seq("ACGTTGCAa");
        assert_eq!(s.len(), 9);
        assert_eq!(s.to_string(), "ACGTTGCAA");
        assert!(Sequence::from_ascii(b"ACGN").is_err());
    }

    #[test]
    fn reverse_complement_and_palindromes() {
        assert_eq!(seq("AACG").reverse_complement(), seq("CGTT"));
        assert!(seq("ACGT").is_palindrome());
        assert!(seq("GAATTC").is_palindrome());
        assert!(!seq("ACG").is_palindrome());
        assert!(!seq("AAAA").is_palindrome());
        assert!(Sequence::default().is_palindrome());
    }

    #[test]
    fn subsequences_and_affixes() {
        let s = seq("ACCGTTAG");
        assert_eq!(s.subseq(2, 5), seq("CGT"));
        assert_eq!(s.subseq(3, 3), Sequence::default());
        assert!(s.starts_with(&seq("ACC")));
        assert!(s.ends_with(&seq("TAG")));
        assert!(!s.ends_with(&seq("ACCGTTAGA")));
    }

    #[test]
    fn merge_with_overlap() {
        let k = 3;
        let merged = seq("ACCGT").merge_overlapping(&seq("CGTAA"), k);
        assert_eq!(merged, seq("ACCGTAA"));
        assert_eq!(merged.len() - k, (5 - k) + (5 - k));
    }

    #[test]
    fn canonical_is_strand_independent() {
        let s = seq("AACGTG");
        assert_eq!(s.canonical(), s.reverse_complement().canonical());
    }

    #[test]
    fn packed_round_trip_masks_tail() {
        let s = seq("ACGTG");
        let mut bytes = s.as_packed().to_vec();
        *bytes.last_mut().unwrap() |= 0b1111_1100;
        let back = Sequence::from_packed(&bytes, s.len()).unwrap();
        assert_eq!(back, s);
        assert!(Sequence::from_packed(&bytes, 9).is_err());
    }

    proptest! {
        #[test]
        fn reverse_complement_is_an_involution(s in "[ACGT]{0,80}") {
            let s = seq(&s);
            prop_assert_eq!(s.reverse_complement().reverse_complement(), s.clone());
            prop_assert_eq!(s.is_palindrome(), s.reverse_complement() == s);
        }

        #[test]
        fn split_then_merge_restores(s in "[ACGT]{8,60}", cut in 0usize..100) {
            let s = seq(&s);
            let k = 4;
            let pos = cut % (s.len() - k);
            let left = s.subseq(0, pos + k);
            let right = s.subseq(pos, s.len());
            prop_assert_eq!(left.merge_overlapping(&right, k), s);
        }
    }
}
