//! Seams between the management core and its external collaborators.
//!
//! The core contains no application logic and no rendering: applications live
//! behind [`MidletApp`], their construction behind [`AppLoader`], and the UI
//! subsystem consumes [`UiEvent`]s through a [`UiSink`].

use std::sync::Arc;

use mvmrpc::IsolateId;
use mvmrpc::WindowId;

use crate::error::Result;

/// One running application, as seen by its hosting isolate.
///
/// The runtime invokes these callbacks when a pending lifecycle state is
/// materialized; a collapsed pause/resume pair invokes neither.
pub trait MidletApp: Send + Sync + 'static {
    /// Activation callback, invoked on first start and on every resume.
    fn start_app(&self) -> Result<()>;

    /// Pause callback.
    fn pause_app(&self);

    /// Destruction callback; the peer is terminal afterwards.
    fn destroy_app(&self);
}

/// Constructs applications from their opaque descriptors.
pub trait AppLoader: Send + Sync + 'static {
    /// Loads the application named by `descriptor`.
    ///
    /// Failures surface as `Error::Instantiation` and are mapped to a
    /// `Failure` response by the runtime, never to a transport fault.
    fn load(&self, descriptor: &[u8]) -> Result<Arc<dyn MidletApp>>;
}

/// Events the core emits towards the rendering/UI subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    ActivateMidlet { isolate_id: IsolateId, display_id: WindowId },
    PauseMidlet { isolate_id: IsolateId, display_id: WindowId },
    DestroyMidlet { isolate_id: IsolateId, display_id: WindowId },
    ForegroundNotify { isolate_id: IsolateId, display_id: WindowId },
    BackgroundNotify { isolate_id: IsolateId, display_id: WindowId },
}

/// Consumer of [`UiEvent`]s. The UI subsystem interprets these to drive
/// repaint and calls back into the runtime (`notify_paused`,
/// `notify_destroyed`, `resume_request`) in response to user action.
pub trait UiSink: Send + Sync + 'static {
    fn emit(&self, event: UiEvent);
}

/// Discards every event; the default when no UI subsystem is attached.
pub struct NullUiSink;

impl UiSink for NullUiSink {
    fn emit(&self, _event: UiEvent) {}
}
