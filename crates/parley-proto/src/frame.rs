//! Frame encoding and decoding.
//!
//! # Header policy
//!
//! The header is four ASCII bytes holding the body length as a right-justified
//! decimal number padded with spaces on the left (`"   5"`, `" 512"`). Leading
//! zeros are accepted (`"0042"`). Decoding is strict: any byte other than
//! leading spaces followed by at least one digit is a
//! [`ProtocolError::MalformedHeader`], so `"abcd"` or `" 1 2"` end the
//! stream rather than decoding as a length.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 4;

/// Maximum body length a frame may carry.
pub const MAX_BODY_LEN: usize = 512;

/// Largest value representable in the header field.
pub const MAX_HEADER_VALUE: usize = 9999;

/// Marker that prefixes the recipient id in an addressed message body.
pub const RECIPIENT_MARKER: &[u8] = b"Recipient:";

/// Number of bytes taken after [`RECIPIENT_MARKER`] as the recipient id.
pub const RECIPIENT_ID_LEN: usize = 5;

/// Encode a body length as a 4-byte header field.
///
/// The field is the value formatted as `%4d`.
///
/// # Errors
///
/// Returns [`ProtocolError::HeaderOverflow`] if `body_len` needs more than
/// four digits. Lengths above [`MAX_BODY_LEN`] but within four digits encode
/// fine here; [`Frame`] never produces them.
pub fn encode_header(body_len: usize) -> Result<[u8; HEADER_LEN], ProtocolError> {
    if body_len > MAX_HEADER_VALUE {
        return Err(ProtocolError::HeaderOverflow { len: body_len });
    }

    let text = format!("{body_len:>4}");
    let mut header = [b' '; HEADER_LEN];
    header.copy_from_slice(text.as_bytes());
    Ok(header)
}

/// Decode a 4-byte header field into a body length.
///
/// # Errors
///
/// - [`ProtocolError::MalformedHeader`] if the field is not leading spaces
///   followed by one or more ASCII digits
/// - [`ProtocolError::OversizedBody`] if the value exceeds [`MAX_BODY_LEN`]
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<usize, ProtocolError> {
    let malformed = || ProtocolError::MalformedHeader { header: *header };

    let digits_start = header.iter().position(|&b| b != b' ').ok_or_else(malformed)?;
    let digits = &header[digits_start..];
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }

    let len = digits.iter().fold(0usize, |acc, &digit| acc * 10 + usize::from(digit - b'0'));
    if len > MAX_BODY_LEN {
        return Err(ProtocolError::OversizedBody { len, max: MAX_BODY_LEN });
    }

    Ok(len)
}

/// A single chat frame.
///
/// The body is a shared [`Bytes`] buffer, so cloning a frame to fan it out to
/// many sessions never copies the payload.
///
/// # Invariants
///
/// - `body_len() <= MAX_BODY_LEN`, enforced by every constructor
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Frame {
    body: Bytes,
}

impl Frame {
    /// Create a frame from a body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::OversizedBody`] if the body is longer than
    /// [`MAX_BODY_LEN`].
    pub fn new(body: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let body = body.into();
        if body.len() > MAX_BODY_LEN {
            return Err(ProtocolError::OversizedBody { len: body.len(), max: MAX_BODY_LEN });
        }
        Ok(Self { body })
    }

    /// Create a frame carrying UTF-8 text.
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        Self::new(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Frame body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the frame, returning its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Body length in bytes.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Total length on the wire (header + body).
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// Body as text, replacing invalid UTF-8. Intended for logging.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Recipient id embedded in the body, if any.
    ///
    /// Finds the first `Recipient:` marker and returns up to
    /// [`RECIPIENT_ID_LEN`] bytes after it. The slice is shorter when the body
    /// ends early; it is never matched against anything but full ids.
    pub fn recipient(&self) -> Option<&[u8]> {
        let marker_at =
            self.body.windows(RECIPIENT_MARKER.len()).position(|w| w == RECIPIENT_MARKER)?;
        let start = marker_at + RECIPIENT_MARKER.len();
        let end = (start + RECIPIENT_ID_LEN).min(self.body.len());
        Some(&self.body[start..end])
    }

    /// Append the wire form of this frame to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be encoded. Unreachable for a
    /// frame built through the constructors, but still checked.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), ProtocolError> {
        let header = encode_header(self.body.len())?;
        dst.put_slice(&header);
        dst.put_slice(&self.body);
        Ok(())
    }

    /// Wire form of this frame as one contiguous buffer.
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one frame from a contiguous buffer.
    ///
    /// # Errors
    ///
    /// - Header errors from [`decode_header`]
    /// - [`ProtocolError::Truncated`] if `buf` ends before the frame does
    /// - [`ProtocolError::TrailingBytes`] if `buf` continues past the frame
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let Some((header, rest)) = buf.split_first_chunk::<HEADER_LEN>() else {
            return Err(ProtocolError::Truncated { needed: HEADER_LEN, available: buf.len() });
        };

        let body_len = decode_header(header)?;
        if rest.len() < body_len {
            return Err(ProtocolError::Truncated {
                needed: HEADER_LEN + body_len,
                available: buf.len(),
            });
        }
        if rest.len() > body_len {
            return Err(ProtocolError::TrailingBytes { extra: rest.len() - body_len });
        }

        Ok(Self { body: Bytes::copy_from_slice(rest) })
    }
}
