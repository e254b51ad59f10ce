//! Protocol-level errors.
//!
//! Decode and routing failures are recoverable by design: a transport loop
//! answers them with a `Failure` response and keeps running.

/// Operational failures within the command protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The byte stream or field sequence did not match the expected command
    /// layout (field-order divergence, exhausted data, bad field syntax).
    Malformed(String),
    /// The `message_type` is not recognized by any route.
    Unroutable(String),
    /// The underlying positional codec failed.
    Pack(mvmpack::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed command: {}", msg),
            Self::Unroutable(ty) => write!(f, "unroutable message type: {}", ty),
            Self::Pack(e) => write!(f, "malformed command: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<mvmpack::Error> for Error {
    fn from(e: mvmpack::Error) -> Self {
        Self::Pack(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
