//! Pair generation for survey prompts.
//!
//! Every unordered pair of items is produced exactly once, as
//! `(earlier, later)` by input position. The presentation order of the pairs
//! is shuffled with a caller-supplied RNG so tests can seed it.

use rand::seq::SliceRandom;
use rand::Rng;

/// All unordered pairs in input order, without shuffling.
pub fn ordered_combinations<T: Clone>(items: &[T]) -> Vec<(T, T)> {
    let n = items.len();
    if n < 2 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n - 1 {
        for j in (i + 1)..n {
            out.push((items[i].clone(), items[j].clone()));
        }
    }
    out
}

/// All unordered pairs, in a uniformly random presentation order.
pub fn generate_combinations<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<(T, T)> {
    let mut pairs = ordered_combinations(items);
    pairs.shuffle(rng);
    pairs
}
