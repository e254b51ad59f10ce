//! # Window Commands
//!
//! Foreground/background handoff between executive and isolate. The requests
//! are synchronous so the executive can guarantee that at most one window is
//! foreground at any instant; the notifications flow back whenever a window
//! changes visibility for any reason, including local ones.

use crate::command::Command;
use crate::error::Result;
use crate::fields::FieldReader;
use crate::fields::FieldWriter;
use crate::fields::WindowRef;
use crate::id::WindowId;

/// Routing key for window requests and notifications.
pub const EXECUTIVE_WINDOW: &str = "executive/window";

/// Executive → isolate: bring a window to the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Foreground {
    pub window_id: WindowId,
}

impl Command for Foreground {
    const MESSAGE_TYPE: &'static str = EXECUTIVE_WINDOW;
    const ID: &'static str = "Foreground";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.i32(self.window_id.0);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { window_id: WindowId(r.i32()?) })
    }
}

/// Executive → isolate: push a window to the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Background {
    pub window_id: WindowId,
}

impl Command for Background {
    const MESSAGE_TYPE: &'static str = EXECUTIVE_WINDOW;
    const ID: &'static str = "Background";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.i32(self.window_id.0);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { window_id: WindowId(r.i32()?) })
    }
}

/// Isolate → executive: one of this isolate's windows became foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyFg {
    pub window: WindowRef,
}

impl Command for NotifyFg {
    const MESSAGE_TYPE: &'static str = EXECUTIVE_WINDOW;
    const ID: &'static str = "NotifyFg";

    fn write_fields(&self, w: &mut FieldWriter) {
        self.window.put(w);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { window: WindowRef::take(r)? })
    }
}

/// Isolate → executive: one of this isolate's windows left the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyBg {
    pub window: WindowRef,
}

impl Command for NotifyBg {
    const MESSAGE_TYPE: &'static str = EXECUTIVE_WINDOW;
    const ID: &'static str = "NotifyBg";

    fn write_fields(&self, w: &mut FieldWriter) {
        self.window.put(w);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { window: WindowRef::take(r)? })
    }
}
