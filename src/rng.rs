//! Deterministic, parallelism-safe RNG hierarchy.
//!
//! `reject_prob` sampling must be bit-identical across runs and across
//! parallelism modes (§5). Rather than threading a single shared RNG (which
//! would make results depend on thread scheduling order), every (group,
//! iteration) pair gets its own sub-seed derived from a BLAKE3 hash of the
//! master seed, so derivation order never affects the result.

use blake3::Hasher;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Deterministic sub-seed for a given group and iteration (bar index),
    /// independent of the order in which callers derive it.
    pub fn sub_seed(&self, group: usize, iteration: u64) -> u64 {
        let mut hasher = Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(&(group as u64).to_le_bytes());
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap())
    }

    pub fn rng_for(&self, group: usize, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(group, iteration))
    }
}
