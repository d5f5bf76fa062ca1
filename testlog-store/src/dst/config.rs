//! Simulation seed.
//!
//! `TigerStyle`: A failing run prints its seed; `DST_SEED=<seed>` replays it.

use rand::Rng;

/// Environment variable holding a replay seed.
pub const DST_SEED_ENV: &str = "DST_SEED";

/// Seed source for [`SimLogBackend`](crate::storage::SimLogBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    seed: u64,
}

impl SimConfig {
    /// Fixed seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from `DST_SEED`, or a fresh one.
    ///
    /// An unparsable `DST_SEED` is ignored with a warning rather than
    /// silently replaying something else.
    #[must_use]
    pub fn from_env_or_random() -> Self {
        match std::env::var(DST_SEED_ENV) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(seed) => {
                    tracing::info!(seed, "replaying simulation seed");
                    Self::with_seed(seed)
                }
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "ignoring invalid {DST_SEED_ENV}");
                    Self::random()
                }
            },
            Err(_) => Self::random(),
        }
    }

    fn random() -> Self {
        let seed = rand::thread_rng().gen::<u64>();
        tracing::info!(seed, "simulation seed (replay with {DST_SEED_ENV})");
        Self::with_seed(seed)
    }

    /// The seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::from_env_or_random()
    }
}
