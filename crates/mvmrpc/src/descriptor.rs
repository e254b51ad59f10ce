//! Application descriptors.
//!
//! The executive names an application by suite, class, and launch arguments;
//! the hosting isolate's loader decodes this from the `StartApp` payload.
//! Loaders are free to accept other payload formats, so the descriptor is a
//! convention, not part of the frame envelope.

use mvmpack::Decoder;
use mvmpack::Encoder;

use crate::error::Result;

/// What to launch: suite, class, display name, and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub suite_id: String,
    pub class_name: String,
    pub display_name: String,
    pub args: Vec<String>,
}

impl AppDescriptor {
    /// Serializes the descriptor for the `StartApp` payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        enc.str(&self.suite_id)?;
        enc.str(&self.class_name)?;
        enc.str(&self.display_name)?;
        enc.str_list(&self.args)?;
        Ok(enc.into_bytes())
    }

    /// Deserializes a descriptor, mirroring [`AppDescriptor::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        Ok(Self {
            suite_id: dec.str()?.to_string(),
            class_name: dec.str()?.to_string(),
            display_name: dec.str()?.to_string(),
            args: dec.str_list()?.into_iter().map(str::to_string).collect(),
        })
    }
}
