//! DST - Deterministic Simulation Testing
//!
//! Seeded randomness and fault injection for the simulated backend.
//!
//! # Usage
//!
//! ```rust
//! use testlog_store::dst::{FaultConfig, FaultType, SimConfig};
//! use testlog_store::storage::SimLogBackend;
//!
//! let backend = SimLogBackend::new(SimConfig::with_seed(42))
//!     .with_faults(FaultConfig::new(FaultType::NetworkTimeout, 0.1));
//! # let _ = backend;
//! ```
//!
//! Run with explicit seed for reproducibility:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

mod config;
mod fault;
mod rng;

pub use config::{SimConfig, DST_SEED_ENV};
pub use fault::{FaultConfig, FaultInjector, FaultType};
pub use rng::DeterministicRng;
