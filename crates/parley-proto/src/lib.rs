//! Parley wire format.
//!
//! A Parley stream is a plain concatenation of frames in both directions. Each
//! frame is a 4-byte ASCII header followed by the body it announces:
//!
//! ```text
//! +---------------------+--------------------------+
//! | header (4 bytes)    | body (0..=512 bytes)     |
//! | "%4d", space-padded | raw, usually UTF-8 text  |
//! +---------------------+--------------------------+
//! ```
//!
//! There is no version field and no framing beyond the header. This crate has
//! no I/O and no runtime dependency; sessions drive it from `parley-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;

pub use error::ProtocolError;
pub use frame::{
    Frame, HEADER_LEN, MAX_BODY_LEN, MAX_HEADER_VALUE, RECIPIENT_ID_LEN, RECIPIENT_MARKER,
    decode_header, encode_header,
};
