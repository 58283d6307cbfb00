//! Seeded environment for simulations.

use std::sync::{Arc, Mutex, PoisonError};

use parley_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Environment whose randomness comes from a seeded ChaCha RNG.
///
/// Clones share one RNG stream, so a simulation that hands the same `SimEnv`
/// to every component draws a single reproducible sequence.
#[derive(Clone, Debug)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Create an environment with the given seed.
    pub fn with_seed(seed: u64) -> Self {
        tracing::debug!(seed, "simulation environment seeded");
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl Environment for SimEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
