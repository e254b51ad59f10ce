//! # Event Queue
//!
//! The asynchronous, per-isolate delivery channel underlying everything else.
//! It carries both raw UI/system events and command frames; the owning
//! isolate's event loop drains it strictly in delivery order and dispatches
//! each item sequentially, so two events from the same queue are never
//! handled concurrently.

use mvmrpc::Frame;
use mvmrpc::WindowId;
use tokio::sync::mpsc;

/// One item on an isolate's event queue.
#[derive(Debug, Clone)]
pub enum Event {
    /// Cross-isolate command traffic (requests, responses, notifications).
    Command(Frame),
    /// The window identified by `display_id` should move towards active.
    ActivateMidlet { display_id: WindowId },
    /// The window identified by `display_id` should move towards paused.
    PauseMidlet { display_id: WindowId },
    /// The window identified by `display_id` should move towards destroyed.
    DestroyMidlet { display_id: WindowId },
    /// The window became foreground for a local reason.
    ForegroundNotify { display_id: WindowId },
    /// The window left the foreground for a local reason.
    BackgroundNotify { display_id: WindowId },
    /// Materialize the pending lifecycle state of the peer driving
    /// `display_id`, invoking the application callback it implies.
    Settle { display_id: WindowId },
    /// Orderly teardown marker; the event loop exits after draining it.
    Shutdown,
}

/// Sending half of an isolate's event queue.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving half of an isolate's event queue, owned by its event loop.
///
/// The channel preserves per-sender FIFO, which gives the per
/// (source, target) ordering guarantee the transport promises.
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventQueue {
    /// Creates a queue and its sending half.
    pub fn channel() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Awaits the next event, or `None` once all senders are gone.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
