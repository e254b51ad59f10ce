//! # Runtime Context
//!
//! The explicit, process-wide context object: the queue table mapping each
//! live isolate to its event queue, plus id generators. Constructed once at
//! process start and shared by handle; there are no global statics, and the
//! executive-vs-application distinction is plain configuration
//! (`isolate_id == ams_isolate_id`).

use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use mvmrpc::IsolateId;
use mvmrpc::WindowId;

use crate::error::Error;
use crate::error::Result;
use crate::queue::Event;
use crate::queue::EventSender;

/// Shared runtime context. Cheap to clone behind an `Arc`.
pub struct Context {
    ams_isolate_id: IsolateId,
    queues: DashMap<IsolateId, EventSender>,
    next_isolate_id: AtomicI32,
    next_window_id: AtomicI32,
}

impl Context {
    /// Creates a context with the given executive isolate id.
    pub fn new(ams_isolate_id: IsolateId) -> Self {
        Self {
            ams_isolate_id,
            queues: DashMap::new(),
            next_isolate_id: AtomicI32::new(ams_isolate_id.0 + 1),
            next_window_id: AtomicI32::new(1),
        }
    }

    /// The distinguished executive isolate.
    pub fn ams_isolate_id(&self) -> IsolateId {
        self.ams_isolate_id
    }

    /// True if `id` names the executive.
    pub fn is_executive(&self, id: IsolateId) -> bool {
        id == self.ams_isolate_id
    }

    /// Allocates a fresh, process-unique isolate id.
    pub fn alloc_isolate_id(&self) -> IsolateId {
        IsolateId(self.next_isolate_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a fresh, process-unique window id.
    pub fn alloc_window_id(&self) -> WindowId {
        WindowId(self.next_window_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers an isolate's event queue sender.
    pub fn register_queue(&self, id: IsolateId, sender: EventSender) {
        self.queues.insert(id, sender);
    }

    /// Removes an isolate's queue; subsequent deliveries fail as unreachable.
    pub fn unregister_queue(&self, id: IsolateId) {
        self.queues.remove(&id);
    }

    /// True if the isolate currently has a registered queue.
    pub fn is_reachable(&self, id: IsolateId) -> bool {
        self.queues.contains_key(&id)
    }

    /// Enqueues an event on the target isolate's queue.
    ///
    /// Fails with `Unreachable` if the isolate has no queue (destroyed or
    /// never existed) or its receiving half is gone.
    pub fn deliver(&self, target: IsolateId, event: Event) -> Result<()> {
        let sender = self
            .queues
            .get(&target)
            .ok_or(Error::Unreachable(target))?;
        sender.send(event).map_err(|_| Error::Unreachable(target))
    }
}
