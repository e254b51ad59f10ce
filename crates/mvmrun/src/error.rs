//! Runtime errors.

use mvmrpc::IsolateId;

#[derive(Debug, Clone)]
pub enum Error {
    /// Wire decode or routing failure, recovered locally by the transport.
    Protocol(mvmrpc::Error),
    /// A synchronous call exceeded its deadline.
    Timeout,
    /// The target isolate is destroyed or never existed.
    Unreachable(IsolateId),
    /// The remote side answered with a `Failure` response.
    Remote(String),
    /// Class-loading the requested application failed.
    Instantiation(String),
    /// A response channel closed before fulfillment.
    ChannelClosed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol error: {}", e),
            Self::Timeout => write!(f, "request timed out"),
            Self::Unreachable(id) => write!(f, "target unreachable: {}", id),
            Self::Remote(msg) => write!(f, "remote failure: {}", msg),
            Self::Instantiation(msg) => write!(f, "instantiation failure: {}", msg),
            Self::ChannelClosed => write!(f, "response channel closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<mvmrpc::Error> for Error {
    fn from(e: mvmrpc::Error) -> Self {
        Self::Protocol(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
