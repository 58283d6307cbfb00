//! Core error types.

use parley_proto::ProtocolError;
use thiserror::Error;

use crate::SessionId;

/// Errors that terminate a session.
///
/// Every variant is terminal for the session that produced it and for that
/// session only. Nothing is reported to the peer; the connection just closes.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport read or write failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Peer sent bytes that are not a valid frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Room refused the session.
    #[error("room error: {0}")]
    Room(#[from] RoomError),

    /// Session is already closed.
    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Returns true if the peer violated the wire protocol.
    ///
    /// Protocol violations are worth a warning; transport errors and closes
    /// are ordinary disconnects.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Errors from [`Room`](crate::Room) membership operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// Another member already uses this id.
    #[error("session id already in use: {0}")]
    IdInUse(SessionId),

    /// Participant closed before it could be admitted.
    #[error("participant closed while joining: {0}")]
    ParticipantClosed(SessionId),
}

/// Errors from parsing a [`SessionId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Wrong number of characters.
    #[error("session id must be {expected} characters, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length of the rejected input.
        actual: usize,
    },

    /// Character outside the id alphabet.
    #[error("invalid character {0:?} in session id")]
    InvalidCharacter(char),
}
