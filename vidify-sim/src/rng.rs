//! Seeded random number generation for reproducible runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Stream used for feed generation.
pub const FEED_STREAM: u64 = 1;

/// Stream used for the simulated user.
pub const USER_STREAM: u64 = 2;

/// Deterministic random number generator.
///
/// The same seed and stream always produce the same sequence. Separate
/// streams from one seed are independent, so changing how many values the
/// feed generator draws does not shift the user's trajectory.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates deterministic RNG from seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Creates an RNG on a numbered stream of `seed`.
    pub fn stream(seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Self { rng, seed }
    }

    /// Returns the seed used for this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates random number in range [0, 1).
    pub fn random_f64(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Generates random number in range [min, max). Returns `min` if empty or not finite.
    pub fn random_range_f64(&mut self, min: f64, max: f64) -> f64 {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return min;
        }
        self.rng.random_range(min..max)
    }

    /// Generates random integer in range [min, max]. Returns `min` if empty.
    pub fn random_inclusive(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    /// Generates random boolean with given probability.
    ///
    /// Probabilities outside `[0, 1]` are clamped; NaN never succeeds.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        if probability.is_nan() {
            return false;
        }
        self.rng.random_bool(probability.clamp(0.0, 1.0))
    }

    /// Normally distributed sample (Box-Muller).
    pub fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        // 1 - [0, 1) keeps the logarithm finite
        let u1 = 1.0 - self.random_f64();
        let u2 = self.random_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        mean + std_dev * z
    }

    /// Selects random element from slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let index = self.rng.random_range(0..slice.len());
            Some(&slice[index])
        }
    }
}
