// Roel Kluin, 2023, GPL v3

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Dense integer identifier of a graph entity. The raw value is `bias + slot`.
pub trait EntityId:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const KIND: &'static str;

    fn from_raw(raw: u64) -> Self;
    fn raw(self) -> u64;
}

macro_rules! implement_entity_id { ($($ty:ident, $kind:literal, $prefix:literal);*) => ($(
	#[derive(
		Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Serialize, Deserialize,
	)]
	pub struct $ty(u64);

	impl EntityId for $ty {
		const KIND: &'static str = $kind;

		#[inline]
		fn from_raw(raw: u64) -> Self {
			$ty(raw)
		}
		#[inline]
		fn raw(self) -> u64 {
			self.0
		}
	}

	impl fmt::Display for $ty {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "{}{}", $prefix, self.0)
		}
	}

	impl fmt::Debug for $ty {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			fmt::Display::fmt(self, f)
		}
	}
	)*)
}

implement_entity_id!(VertexId, "vertex", "v"; EdgeId, "edge", "e");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_survive_conversion() {
        let v = VertexId::from_raw(17);
        assert_eq!(v.raw(), 17);
        assert_eq!(u64::from(v), 17);
        assert_eq!(EdgeId::from(5_u64).to_string(), "e5");
        assert_eq!(format!("{:?}", v), "v17");
        assert_eq!(format!("{v}/{}", EdgeId::from_raw(1 << 40)), "v17/e1099511627776");
        assert_eq!(VertexId::KIND, "vertex");
    }
}
