//! Responses: the one correlated answer every request receives.

use mvmpack::Decoder;
use mvmpack::Encoder;

use crate::error::Error;
use crate::error::Result;

/// Typed payload carried by a `Data` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A single integer, e.g. the app id returned by `StartApp`.
    Int(i32),
    /// A list of integers, e.g. the window ids returned by `GetAppWindows`.
    Ints(Vec<i32>),
}

/// The answer to a request. Exactly one of these is correlated back to each
/// synchronous call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Success,
    Failure(String),
    Data(Payload),
}

impl Response {
    /// Convenience constructor for descriptive failures.
    pub fn failure(msg: impl Into<String>) -> Self {
        Self::Failure(msg.into())
    }

    /// Writes this response's fields into an open encoder: kind id first,
    /// then the kind-specific fields.
    pub fn put(&self, enc: &mut Encoder) -> Result<()> {
        match self {
            Self::Success => enc.str("Success")?,
            Self::Failure(msg) => {
                enc.str("Failure")?;
                enc.str(msg)?;
            }
            Self::Data(Payload::Int(v)) => {
                enc.str("Data")?;
                enc.str("Int")?;
                enc.i32(*v)?;
            }
            Self::Data(Payload::Ints(vs)) => {
                enc.str("Data")?;
                enc.str("Ints")?;
                enc.u32(vs.len() as u32)?;
                for v in vs {
                    enc.i32(*v)?;
                }
            }
        }
        Ok(())
    }

    /// Reads a response from an open decoder, mirroring [`Response::put`].
    pub fn take(dec: &mut Decoder<'_>) -> Result<Self> {
        match dec.str()? {
            "Success" => Ok(Self::Success),
            "Failure" => Ok(Self::Failure(dec.str()?.to_string())),
            "Data" => match dec.str()? {
                "Int" => Ok(Self::Data(Payload::Int(dec.i32()?))),
                "Ints" => {
                    let count = dec.u32()? as usize;
                    let mut vs = Vec::new();
                    for _ in 0..count {
                        vs.push(dec.i32()?);
                    }
                    Ok(Self::Data(Payload::Ints(vs)))
                }
                kind => Err(Error::Malformed(format!("unknown data payload kind '{}'", kind))),
            },
            kind => Err(Error::Malformed(format!("unknown response kind '{}'", kind))),
        }
    }
}
