//! # Transport Frames
//!
//! The envelope carried over event queues. A frame is either a request
//! (expects exactly one correlated response), a response, or a notification
//! (no response expected or possible).
//!
//! ## Invariants
//! - `seq` is the correlation token value: allocated per request, echoed by
//!   exactly one response.
//! - `from` names the source isolate so the target knows where to send the
//!   response, and so per-pair FIFO ordering is meaningful.

use mvmpack::Decoder;
use mvmpack::Encoder;

use crate::error::Error;
use crate::error::Result;
use crate::id::IsolateId;
use crate::response::Response;
use crate::wire::WireCommand;

/// The on-queue envelope for all cross-isolate traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request {
        seq: u64,
        from: IsolateId,
        cmd: WireCommand,
    },
    Response {
        seq: u64,
        response: Response,
    },
    Notify {
        from: IsolateId,
        cmd: WireCommand,
    },
}

impl Frame {
    /// Serializes this frame: kind id first, then the kind's fields.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        match self {
            Self::Request { seq, from, cmd } => {
                enc.str("Request")?;
                enc.u64(*seq)?;
                enc.i32(from.0)?;
                cmd.put(&mut enc)?;
            }
            Self::Response { seq, response } => {
                enc.str("Response")?;
                enc.u64(*seq)?;
                response.put(&mut enc)?;
            }
            Self::Notify { from, cmd } => {
                enc.str("Notify")?;
                enc.i32(from.0)?;
                cmd.put(&mut enc)?;
            }
        }
        Ok(enc.into_bytes())
    }

    /// Deserializes a frame, mirroring [`Frame::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        match dec.str()? {
            "Request" => {
                let seq = dec.u64()?;
                let from = IsolateId(dec.i32()?);
                let cmd = WireCommand::take(&mut dec)?;
                Ok(Self::Request { seq, from, cmd })
            }
            "Response" => {
                let seq = dec.u64()?;
                let response = Response::take(&mut dec)?;
                Ok(Self::Response { seq, response })
            }
            "Notify" => {
                let from = IsolateId(dec.i32()?);
                let cmd = WireCommand::take(&mut dec)?;
                Ok(Self::Notify { from, cmd })
            }
            kind => Err(Error::Malformed(format!("unknown frame kind '{}'", kind))),
        }
    }
}
