//! Seeded randomness for the simulated backend.
//!
//! Every consumer draws from its own named stream, so adding a fault rule
//! to one operation does not shift the rolls seen by another.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random stream.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    inner: ChaCha8Rng,
    seed: u64,
}

/// FNV-1a, enough to spread stream labels over the seed space.
fn label_hash(label: &str) -> u64 {
    label.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl DeterministicRng {
    /// Stream for `seed`.
    ///
    /// ```
    /// use testlog_store::dst::DeterministicRng;
    /// let mut a = DeterministicRng::new(7);
    /// let mut b = DeterministicRng::new(7);
    /// assert_eq!(a.chance(0.5), b.chance(0.5));
    /// ```
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed this stream was built from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent stream derived from this seed and `label`.
    ///
    /// The same seed and label always give the same stream, regardless of
    /// how much the parent has been used.
    #[must_use]
    pub fn stream(&self, label: &str) -> Self {
        Self::new(self.seed ^ label_hash(label).rotate_left(17))
    }

    /// `true` with the given probability.
    ///
    /// # Panics
    /// Panics if `probability` is outside `[0, 1]`.
    pub fn chance(&mut self, probability: f64) -> bool {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );
        if probability >= 1.0 {
            return true;
        }
        self.inner.gen_bool(probability)
    }

    /// Uniform value in `[0, bound)`.
    ///
    /// # Panics
    /// Panics if `bound` is zero.
    pub fn below(&mut self, bound: u64) -> u64 {
        assert!(bound > 0, "bound must be positive");
        self.inner.gen_range(0..bound)
    }
}
