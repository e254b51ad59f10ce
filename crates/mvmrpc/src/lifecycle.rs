//! # Lifecycle Command Set
//!
//! Executive → isolate lifecycle requests (all synchronous, each answered by
//! exactly one correlated response) and isolate → executive lifecycle
//! notifications (fire-and-forget).

use crate::command::Command;
use crate::error::Result;
use crate::fields::AppRef;
use crate::fields::FieldReader;
use crate::fields::FieldWriter;
use crate::id::AppId;
use crate::id::IsolateId;

/// Routing key for executive → isolate lifecycle requests.
pub const MVM_LIFECYCLE: &str = "mvm/lifecycle";
/// Routing key for isolate → executive lifecycle notifications.
pub const ISOLATE_LIFECYCLE: &str = "isolate/lifecycle";

// ---------------------------------------------------------------------------
// Executive → isolate requests
// ---------------------------------------------------------------------------

/// Initializes a freshly created isolate with its application model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitIsolate {
    /// Application-model selector; stored by the runtime, no semantics here.
    pub app_model: i32,
}

impl Command for InitIsolate {
    const MESSAGE_TYPE: &'static str = MVM_LIFECYCLE;
    const ID: &'static str = "InitIsolate";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.i32(self.app_model);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { app_model: r.i32()? })
    }
}

/// Tears the target isolate down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyIsolate {
    /// When set, the isolate may skip graceful per-app destruction.
    pub best_effort: bool,
}

impl Command for DestroyIsolate {
    const MESSAGE_TYPE: &'static str = MVM_LIFECYCLE;
    const ID: &'static str = "DestroyIsolate";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.bool(self.best_effort);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { best_effort: r.bool()? })
    }
}

/// Starts an application inside the target isolate.
///
/// The descriptor travels as the binary payload; a successful response is
/// `Data(app_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartApp {
    pub descriptor: Vec<u8>,
}

impl Command for StartApp {
    const MESSAGE_TYPE: &'static str = MVM_LIFECYCLE;
    const ID: &'static str = "StartApp";

    fn write_fields(&self, _w: &mut FieldWriter) {}

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { descriptor: r.take_payload()?.to_vec() })
    }

    fn payload(&self) -> Option<&[u8]> {
        Some(&self.descriptor)
    }
}

/// Requests that an application move towards the paused state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseApp {
    pub app_id: AppId,
}

impl Command for PauseApp {
    const MESSAGE_TYPE: &'static str = MVM_LIFECYCLE;
    const ID: &'static str = "PauseApp";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.i32(self.app_id.0);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { app_id: AppId(r.i32()?) })
    }
}

/// Requests that a paused application move back towards the active state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeApp {
    pub app_id: AppId,
}

impl Command for ResumeApp {
    const MESSAGE_TYPE: &'static str = MVM_LIFECYCLE;
    const ID: &'static str = "ResumeApp";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.i32(self.app_id.0);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { app_id: AppId(r.i32()?) })
    }
}

/// Asks the isolate for the windows an application owns.
///
/// Answered with `Data(window ids)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAppWindows {
    pub app_id: AppId,
}

impl Command for GetAppWindows {
    const MESSAGE_TYPE: &'static str = MVM_LIFECYCLE;
    const ID: &'static str = "GetAppWindows";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.i32(self.app_id.0);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { app_id: AppId(r.i32()?) })
    }
}

/// Requests destruction of an application. The app id is the base field;
/// `best_effort` is appended after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyApp {
    pub app_id: AppId,
    pub best_effort: bool,
}

impl Command for DestroyApp {
    const MESSAGE_TYPE: &'static str = MVM_LIFECYCLE;
    const ID: &'static str = "DestroyApp";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.i32(self.app_id.0);
        w.bool(self.best_effort);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            app_id: AppId(r.i32()?),
            best_effort: r.bool()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Isolate → executive notifications
// ---------------------------------------------------------------------------

macro_rules! app_notification {
    ($(#[$doc:meta])* $name:ident, $id:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub app: AppRef,
        }

        impl Command for $name {
            const MESSAGE_TYPE: &'static str = ISOLATE_LIFECYCLE;
            const ID: &'static str = $id;

            fn write_fields(&self, w: &mut FieldWriter) {
                self.app.put(w);
            }

            fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
                Ok(Self { app: AppRef::take(r)? })
            }
        }
    };
}

app_notification!(
    /// The hosted application asked to be paused.
    AppRequestPause, "AppRequestPause");
app_notification!(
    /// The hosted application asked to be resumed.
    AppRequestResume, "AppRequestResume");
app_notification!(
    /// The application's pause callback completed.
    AppPaused, "AppPaused");
app_notification!(
    /// The application's activation callback completed.
    AppResumed, "AppResumed");

/// The isolate finished initialization and is ready for lifecycle requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolateInitialized {
    pub isolate_id: IsolateId,
}

impl Command for IsolateInitialized {
    const MESSAGE_TYPE: &'static str = ISOLATE_LIFECYCLE;
    const ID: &'static str = "IsolateInitialized";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.i32(self.isolate_id.0);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { isolate_id: IsolateId(r.i32()?) })
    }
}

/// The isolate is gone; outstanding calls against it must fail, not hang.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolateDestroyed {
    pub isolate_id: IsolateId,
}

impl Command for IsolateDestroyed {
    const MESSAGE_TYPE: &'static str = ISOLATE_LIFECYCLE;
    const ID: &'static str = "IsolateDestroyed";

    fn write_fields(&self, w: &mut FieldWriter) {
        w.i32(self.isolate_id.0);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { isolate_id: IsolateId(r.i32()?) })
    }
}
