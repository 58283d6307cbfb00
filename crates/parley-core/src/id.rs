//! Session identifiers.

use std::{borrow::Borrow, fmt, str::FromStr};

use crate::IdError;

/// Characters a session id is drawn from.
pub const ID_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Number of characters in a session id.
pub const ID_LEN: usize = 5;

/// Short public identifier of a connected session.
///
/// Ids are random, so uniqueness is probabilistic. The room refuses a second
/// member with the same id and the dispatcher draws again, which keeps ids
/// unique among concurrently joined sessions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Parse and validate an id.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.len() != ID_LEN {
            return Err(IdError::InvalidLength { expected: ID_LEN, actual: s.len() });
        }
        if let Some(ch) = s.chars().find(|c| !c.is_ascii() || !ID_ALPHABET.contains(&(*c as u8))) {
            return Err(IdError::InvalidCharacter(ch));
        }
        Ok(Self(s.to_owned()))
    }

    /// Build an id from alphabet indices. Callers guarantee every index is in
    /// range.
    pub(crate) fn from_indices(indices: &[usize; ID_LEN]) -> Self {
        Self(indices.iter().map(|&i| char::from(ID_ALPHABET[i % ID_ALPHABET.len()])).collect())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as raw bytes, for matching against frame bodies.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
