//! Shared helpers for the unit test tree.

use rand::rngs::SmallRng;
use rand::Rng;

pub const BASES: [u8; 4] = [b'a', b'c', b'g', b't'];

/// Uniform random DNA of the given length.
pub fn random_dna(rng: &mut SmallRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| BASES[rng.gen_range(0..4)]).collect()
}

/// Copy of `seq` with roughly one substitution per `rate` bases.
pub fn mutate(rng: &mut SmallRng, seq: &[u8], rate: usize) -> Vec<u8> {
    let mut out = seq.to_vec();
    for b in out.iter_mut() {
        if rng.gen_range(0..rate) == 0 {
            let mut new = BASES[rng.gen_range(0..4)];
            while new == *b {
                new = BASES[rng.gen_range(0..4)];
            }
            *b = new;
        }
    }
    out
}
