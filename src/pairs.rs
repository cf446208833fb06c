//! Unordered pair generation.

use serde::Serialize;

/// An unordered pair of positions into the enumerated image sequence.
///
/// `first < second` always holds, so `(a, b)` and `(b, a)` are never both
/// produced. `index` is the pair's slot in generation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ImagePair {
    pub index: usize,
    pub first: usize,
    pub second: usize,
}

/// Number of unordered pairs over `n` items.
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// All unordered pairs over `n` items, ordered by (outer, inner) position.
///
/// Empty and singleton inputs produce no pairs.
pub fn generate_pairs(n: usize) -> Vec<ImagePair> {
    let mut pairs = Vec::with_capacity(pair_count(n));
    for first in 0..n {
        for second in (first + 1)..n {
            pairs.push(ImagePair {
                index: pairs.len(),
                first,
                second,
            });
        }
    }
    pairs
}
