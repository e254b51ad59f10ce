//! # Wire Command
//!
//! The typed, positionally-serialized unit of communication. A command is its
//! routing key (`message_type`), its name (`id`), an ordered string-array
//! data section whose semantics are defined per command, and an optional
//! binary payload.
//!
//! ## Invariants
//! - Field order on the wire is fixed: message_type, id, data, payload.
//! - There is no checksum and no recovery after a divergence point; a stream
//!   exhausted before all fields are read is a malformed command.

use mvmpack::Decoder;
use mvmpack::Encoder;

use crate::error::Result;

/// An immutable, typed unit of communication between executive and isolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireCommand {
    /// Routing string, e.g. `"mvm/lifecycle"` or `"executive/window"`.
    pub message_type: String,
    /// Command name, e.g. `"StartApp"`.
    pub id: String,
    /// Ordered sequence of UTF-8 string fields.
    pub data: Vec<String>,
    /// Optional binary blob (application descriptors and the like).
    pub payload: Option<Vec<u8>>,
}

impl WireCommand {
    /// Writes this command's fields into an open encoder.
    ///
    /// Used when the command is nested inside a larger envelope.
    pub fn put(&self, enc: &mut Encoder) -> Result<()> {
        enc.str(&self.message_type)?;
        enc.str(&self.id)?;
        enc.str_list(&self.data)?;
        enc.opt_bytes(self.payload.as_deref())?;
        Ok(())
    }

    /// Reads a command from an open decoder, mirroring [`WireCommand::put`].
    pub fn take(dec: &mut Decoder<'_>) -> Result<Self> {
        let message_type = dec.str()?.to_string();
        let id = dec.str()?.to_string();
        let data = dec.str_list()?.into_iter().map(str::to_string).collect();
        let payload = dec.opt_bytes()?.map(<[u8]>::to_vec);
        Ok(Self { message_type, id, data, payload })
    }

    /// Serializes this command to a standalone byte vector.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.put(&mut enc)?;
        Ok(enc.into_bytes())
    }

    /// Deserializes a standalone command, consuming the whole input.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        Self::take(&mut dec)
    }
}
