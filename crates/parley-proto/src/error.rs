//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding frames.
///
/// Every variant is a protocol violation: a session that sees one of these on
/// its inbound stream closes instead of trying to resynchronise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Body length exceeds the protocol ceiling.
    #[error("body length {len} exceeds maximum {max}")]
    OversizedBody {
        /// Announced or requested body length.
        len: usize,
        /// Maximum allowed body length.
        max: usize,
    },

    /// Header field is not a right-justified decimal number.
    #[error("malformed header {header:?}")]
    MalformedHeader {
        /// The raw header bytes as received.
        header: [u8; 4],
    },

    /// Value does not fit in four decimal digits.
    #[error("header value {len} does not fit in 4 digits")]
    HeaderOverflow {
        /// The value that could not be encoded.
        len: usize,
    },

    /// Buffer ends before the frame does.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required for a complete frame.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// Buffer continues past the end of the frame.
    #[error("{extra} trailing bytes after frame")]
    TrailingBytes {
        /// Number of unexpected bytes.
        extra: usize,
    },
}

impl ProtocolError {
    /// Returns true if this error was caused by the header field itself.
    ///
    /// Header errors on an inbound stream mean the peer is not speaking the
    /// protocol (or the stream is corrupted), as opposed to a short buffer.
    pub fn is_header_error(&self) -> bool {
        matches!(self, Self::OversizedBody { .. } | Self::MalformedHeader { .. })
    }
}
