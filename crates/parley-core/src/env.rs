//! Environment abstraction.
//!
//! The `Environment` trait decouples session logic from system randomness.
//! Production uses OS entropy (`SystemEnv` in `parley-server`); simulations
//! use a seeded RNG so that every id a run hands out can be reproduced.
//!
//! # Invariants
//!
//! - Determinism: given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: implementations must not share global state

use crate::{ID_ALPHABET, ID_LEN, SessionId};

/// Bytes at or above this value are redrawn when mapping onto the id
/// alphabet, so every symbol has the same probability.
const REJECTION_BOUND: u8 = (256 - 256 % ID_ALPHABET.len()) as u8;

/// Source of randomness for the session layer.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Determinism during simulations: given the same RNG seed, this
    ///   produces the same sequence of bytes
    /// - Unpredictability in production: uses OS entropy
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a session id.
    ///
    /// Draws random bytes and maps them onto [`ID_ALPHABET`] by rejection
    /// sampling. Ids are not guaranteed unique; see [`SessionId`].
    fn generate_id(&self) -> SessionId {
        let mut indices = [0usize; ID_LEN];
        let mut filled = 0;
        let mut buffer = [0u8; 16];

        while filled < ID_LEN {
            self.random_bytes(&mut buffer);
            for &byte in buffer.iter().filter(|&&b| b < REJECTION_BOUND) {
                if filled == ID_LEN {
                    break;
                }
                indices[filled] = usize::from(byte) % ID_ALPHABET.len();
                filled += 1;
            }
        }

        SessionId::from_indices(&indices)
    }
}
