//! Server error types.

use thiserror::Error;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Could not bind a listening address
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address that failed to bind
        address: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Transport/network error
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
