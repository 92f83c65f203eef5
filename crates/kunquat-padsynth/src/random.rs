//! Deterministic per-context PRNG seeding.
//!
//! The original keys each sample's randomness off a short context string
//! (`"PADsynth3"`, `"PADphase3"`) so that rebuilding with identical
//! parameters reproduces identical samples regardless of build order or
//! thread scheduling. Seeding a `ChaCha8Rng` from an FNV-1a hash of the
//! same kind of context string gives the same property here.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    bytes.iter().fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

pub fn context_rng(context: &str) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(fnv1a(context.as_bytes()))
}

/// Uniform sample from `[0, 1)`, matching `Random_get_float_lb`.
pub fn next_unit(rng: &mut ChaCha8Rng) -> f64 {
    rng.gen_range(0.0..1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_context_yields_same_sequence() {
        let mut a = context_rng("PADsynth0");
        let mut b = context_rng("PADsynth0");
        for _ in 0..8 {
            assert_eq!(next_unit(&mut a), next_unit(&mut b));
        }
    }

    #[test]
    fn different_context_yields_different_sequence() {
        let mut a = context_rng("PADsynth0");
        let mut b = context_rng("PADsynth1");
        let seq_a: Vec<f64> = (0..8).map(|_| next_unit(&mut a)).collect();
        let seq_b: Vec<f64> = (0..8).map(|_| next_unit(&mut b)).collect();
        assert_ne!(seq_a, seq_b);
    }
}
