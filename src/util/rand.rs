// PopContext
// copyright zipxing@hotmail.com 2022～2025

use rand::Rng;
use rand_xoshiro::{
    rand_core::{RngCore, SeedableRng},
    Xoshiro256StarStar,
};

/// Seeded Xoshiro256** stream owned by one cooking context.
///
/// `random` and `random_sample` draw from the same state, so interleaving
/// them differently between two runs yields different sequences.
#[derive(Clone, Debug)]
pub struct Rand {
    rng: Xoshiro256StarStar,
}

impl Default for Rand {
    fn default() -> Self {
        Rand::new()
    }
}

impl Rand {
    pub fn new() -> Self {
        Self {
            rng: Xoshiro256StarStar::seed_from_u64(0),
        }
    }

    pub fn srand(&mut self, seed: u64) {
        self.rng = Xoshiro256StarStar::seed_from_u64(seed);
    }

    pub fn rand64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform float in [0,1).
    pub fn random(&mut self) -> f32 {
        self.rng.random::<f32>()
    }

    /// Uniform float in [0,1), passed through an extra mixing step.
    ///
    /// Slower than `random`, but successive samples are far less
    /// correlated. Prefer it when sampling structured domains such as a
    /// volume, where `random` can leave visible patterns.
    pub fn random_sample(&mut self) -> f32 {
        let h = mix64(self.rng.next_u64());
        // top 24 bits fill the f32 mantissa exactly
        (h >> 40) as f32 * (1.0 / (1u64 << 24) as f32)
    }

    pub fn gen_range(&mut self, min: f32, max: f32) -> f32 {
        if min >= max {
            return min;
        }
        self.rng.random_range(min..max)
    }
}

/// splitmix64 finalizer
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
