use rand::rngs::StdRng;
use rand::SeedableRng;

const STREAM_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;
const DERIVE_TAG: u64 = 0xA076_1D64_78BD_642F;

/// Seed of the `index`-th sub-stream of `base_seed`.
#[inline]
pub fn stream_seed(base_seed: u64, index: usize) -> u64 {
    base_seed.wrapping_add((index as u64).wrapping_mul(STREAM_STRIDE))
}

/// Explicit source of randomness handed to the valuation engine.
///
/// Holds a master seed and hands out independent `StdRng` sub-streams, one
/// per path partition, so results depend only on the seed and the partition
/// layout, never on global state or thread scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomSource {
    seed: u64,
}

impl RandomSource {
    pub fn seeded(seed: u64) -> Self {
        Self { seed }
    }

    /// Draw a fresh master seed from the OS. Results are not reproducible.
    pub fn from_entropy() -> Self {
        Self {
            seed: rand::random(),
        }
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(s) => Self::seeded(s),
            None => Self::from_entropy(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generator for partition `index`.
    pub fn stream(&self, index: usize) -> StdRng {
        StdRng::seed_from_u64(stream_seed(self.seed, index))
    }

    /// Independent child source, e.g. one per deal in a batch.
    pub fn derive(&self, index: usize) -> RandomSource {
        Self::seeded(stream_seed(self.seed ^ DERIVE_TAG, index))
    }
}
