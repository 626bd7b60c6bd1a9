// Roel Kluin, 2023, GPL v3

use std::fmt;

/// A nucleotide in two bits. The codes may be unexpected: A: 0x0, C: 0x1, T: 0x2, G: 0x3,
/// which is bits 1-2 of the ASCII letter and makes the complement a xor with 2.
#[derive(new, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TwoBit(u8);

/// 4 packed twobits per u8, first nucleotide in the lowest bits.
pub(crate) struct TwoBitx4(u8);

impl TwoBit {
    pub fn from_ascii(b: u8) -> Option<TwoBit> {
        match b.to_ascii_uppercase() {
            b'A' | b'C' | b'G' | b'T' => Some(TwoBit((b >> 1) & 0x3)),
            _ => None,
        }
    }
    pub fn as_ascii(&self) -> u8 {
        b"ACTG"[self.0 as usize]
    }
    #[inline]
    pub fn complement(&self) -> TwoBit {
        TwoBit(2 ^ self.0)
    }
    pub fn as_u8(&self) -> u8 {
        self.0
    }
    /// twobit shifted to its place in a packed byte.
    #[inline]
    pub(crate) fn pos_shift(&self, i: usize) -> u8 {
        self.0 << ((i & 3) << 1)
    }
}

impl TwoBitx4 {
    #[inline]
    pub(crate) fn to_b2(&self, i: usize) -> TwoBit {
        TwoBit((self.0 >> ((i & 3) << 1)) & 3)
    }
}

impl From<&u8> for TwoBitx4 {
    fn from(val: &u8) -> TwoBitx4 {
        TwoBitx4(*val)
    }
}

impl fmt::Debug for TwoBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "A (0)"),
            1 => write!(f, "C (1)"),
            2 => write!(f, "T (2)"),
            3 => write!(f, "G (3)"),
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_codes() {
        let codes: Vec<u8> = b"ACTGactg"
            .iter()
            .map(|&b| TwoBit::from_ascii(b).unwrap().as_u8())
            .collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 0, 1, 2, 3]);
        assert_eq!(TwoBit::from_ascii(b'N'), None);
        assert_eq!(TwoBit::from_ascii(b'E'), None);
    }

    #[test]
    fn complement_pairs() {
        for (b, c) in [(b'A', b'T'), (b'C', b'G'), (b'G', b'C'), (b'T', b'A')] {
            assert_eq!(TwoBit::from_ascii(b).unwrap().complement().as_ascii(), c);
        }
    }

    #[test]
    fn packing() {
        let g = TwoBit::new(3);
        let byte = g.pos_shift(2) | TwoBit::new(1).pos_shift(5);
        assert_eq!(byte, 0b0000_0100 | 0b0011_0000);
        assert_eq!(TwoBitx4::from(&byte).to_b2(2), g);
        assert_eq!(TwoBitx4::from(&byte).to_b2(1), TwoBit::new(1));
    }
}
