//! Production Environment implementation using OS randomness.

use parley_core::Environment;

/// Production environment backed by `getrandom`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // NOTE: This should never fail on supported platforms. Zeros keep the
            // server alive; Room::vacant_id gives up once every draw collides.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
