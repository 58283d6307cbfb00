//! Fuzz target for frame header and body boundaries
//!
//! # Strategy
//!
//! - Raw input: arbitrary bytes fed straight to the decoder
//! - Header probing: padded, signed, hex and overflowing length fields
//! - Body sizes: lengths straddling the 512-byte limit
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - A decoded frame consumes the whole input and survives re-encoding
//! - No frame with a body over 512 bytes is ever produced
//! - Header errors are reported for every non-numeric header

#![no_main]

use arbitrary::Arbitrary;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use parley_proto::{decode_header, encode_header, Frame, ProtocolError, HEADER_LEN, MAX_BODY_LEN};

#[derive(Debug, Arbitrary)]
enum FuzzInput {
    Raw(Vec<u8>),
    Header([u8; HEADER_LEN]),
    Sized { len: u16, fill: u8 },
}

fuzz_target!(|input: FuzzInput| {
    match input {
        FuzzInput::Raw(bytes) => check_decode(&bytes),
        FuzzInput::Header(header) => {
            let canonical = header.iter().skip_while(|b| **b == b' ').all(u8::is_ascii_digit)
                && header.last().is_some_and(u8::is_ascii_digit);

            match decode_header(&header) {
                Ok(len) => {
                    assert!(canonical, "non-numeric header {header:?} accepted");
                    assert!(len <= MAX_BODY_LEN);
                },
                Err(e) => assert!(e.is_header_error(), "unexpected error {e} for {header:?}"),
            }
        },
        FuzzInput::Sized { len, fill } => {
            let len = usize::from(len) % (MAX_BODY_LEN * 2);
            let result = Frame::new(vec![fill; len]);

            match result {
                Ok(frame) => {
                    assert!(len <= MAX_BODY_LEN);
                    let mut wire = BytesMut::new();
                    frame.encode(&mut wire).expect("valid frame encodes");
                    assert_eq!(&wire[..HEADER_LEN], &encode_header(len).expect("valid length")[..]);
                    check_decode(&wire);
                },
                Err(ProtocolError::OversizedBody { len: reported, max }) => {
                    assert!(len > MAX_BODY_LEN);
                    assert_eq!(reported, len);
                    assert_eq!(max, MAX_BODY_LEN);
                },
                Err(e) => panic!("unexpected error {e}"),
            }
        },
    }
});

fn check_decode(bytes: &[u8]) {
    if let Ok(frame) = Frame::decode(bytes) {
        assert!(frame.body_len() <= MAX_BODY_LEN);
        assert_eq!(frame.encoded_len(), bytes.len());

        assert_eq!(&frame.body()[..], &bytes[HEADER_LEN..]);

        // Leading zeros are accepted but re-encode space padded.
        let wire = frame.to_bytes().expect("decoded frame encodes");
        assert_eq!(Frame::decode(&wire).expect("canonical frame decodes"), frame);
    }
}
