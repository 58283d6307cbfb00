//! Core chat logic for Parley.
//!
//! This crate holds everything between the socket and the room: the
//! per-connection [`Session`] pipeline and the shared [`Room`] hub. It is
//! generic over `AsyncRead + AsyncWrite` and never spawns tasks or binds
//! sockets, so the same code runs under Tokio in production and under
//! turmoil in simulation.
//!
//! ## Architecture
//!
//! ```text
//! bytes in ─► FrameReader ─► Session ─► Room::deliver ─► Participant::enqueue_outbound
//!                                                               │
//! bytes out ◄──────────────── write loop (one write at a time) ◄┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
mod error;
mod id;
pub mod room;
pub mod session;

pub use env::Environment;
pub use error::{IdError, RoomError, SessionError};
pub use id::{ID_ALPHABET, ID_LEN, SessionId};
pub use room::{
    DEFAULT_HISTORY_CAPACITY, Delivery, DeliveryPolicy, MAX_ID_ATTEMPTS, Participant, Room,
    RoomConfig,
};
pub use session::{
    FrameReader, GREETING_PREFIX, ReadState, Session, SessionConfig, SessionHandle,
};
