//! The contract every typed command implements.

use crate::error::Error;
use crate::error::Result;
use crate::fields::FieldReader;
use crate::fields::FieldWriter;
use crate::wire::WireCommand;

/// A typed command that knows how to project itself into a [`WireCommand`]
/// and back.
///
/// # Invariants
/// - `write_fields` and `read_fields` must perform mirror sequences of field
///   operations; there is no schema to recover from a divergence.
/// - A command embedding a base field group must write it before its own
///   fields (see [`crate::fields`]).
pub trait Command: Sized {
    /// Routing string; picks the decode route before any field is read.
    const MESSAGE_TYPE: &'static str;
    /// Command name within the message type.
    const ID: &'static str;

    fn write_fields(&self, w: &mut FieldWriter);

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self>;

    /// Binary payload, for the few commands that carry one.
    fn payload(&self) -> Option<&[u8]> {
        None
    }

    /// Projects this command into its wire form.
    fn to_wire(&self) -> WireCommand {
        let mut w = FieldWriter::new();
        self.write_fields(&mut w);
        WireCommand {
            message_type: Self::MESSAGE_TYPE.to_string(),
            id: Self::ID.to_string(),
            data: w.into_data(),
            payload: self.payload().map(<[u8]>::to_vec),
        }
    }

    /// Reconstructs this command from its wire form.
    ///
    /// An unrecognized `message_type` is unroutable; a recognized type with
    /// the wrong command id, or a field mismatch, is malformed.
    fn from_wire(cmd: &WireCommand) -> Result<Self> {
        if cmd.message_type != Self::MESSAGE_TYPE {
            return Err(Error::Unroutable(cmd.message_type.clone()));
        }
        if cmd.id != Self::ID {
            return Err(Error::Malformed(format!(
                "expected command '{}', got '{}'",
                Self::ID,
                cmd.id
            )));
        }
        let mut r = FieldReader::new(&cmd.data, cmd.payload.as_deref());
        Self::read_fields(&mut r)
    }
}
