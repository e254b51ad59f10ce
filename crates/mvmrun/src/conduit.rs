//! # Command Conduit
//!
//! Request/response and fire-and-forget semantics over the event queues.
//! Each isolate owns one conduit; it allocates correlation sequence numbers,
//! keeps the pending map, and is fed every `Frame::Response` the owning event
//! loop receives. Because responses arrive on the caller's own queue,
//! asynchronous callbacks always run in the caller's event-processing
//! context.
//!
//! ## Invariants
//! - At-most-once fulfillment: a correlation token is live from send until
//!   exactly one response, error, or cancellation is observed.
//! - A late response for a timed-out or cancelled call finds no waiter and is
//!   silently discarded.
//! - A destroyed target never leaves a synchronous caller hanging: its
//!   outstanding waiters are failed with `Unreachable`.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use mvmrpc::Frame;
use mvmrpc::IsolateId;
use mvmrpc::Response;
use mvmrpc::WireCommand;
use tokio::sync::oneshot;
use tracing::debug;

use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::queue::Event;

/// Opaque handle for an asynchronous registration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token(u64);

type Callback = Box<dyn FnOnce(Result<Response>) + Send + Sync + 'static>;

enum Waiter {
    Sync(oneshot::Sender<Result<Response>>),
    Callback(Callback),
}

struct Pending {
    target: IsolateId,
    waiter: Waiter,
}

impl Pending {
    fn fulfill(self, result: Result<Response>) {
        match self.waiter {
            Waiter::Sync(tx) => {
                // Receiver dropped means the caller timed out; nothing to do.
                let _ = tx.send(result);
            }
            Waiter::Callback(cb) => cb(result),
        }
    }
}

/// One isolate's request/response correlation engine.
pub struct Conduit {
    self_id: IsolateId,
    ctx: Arc<Context>,
    pending: DashMap<u64, Pending>,
    seq_gen: AtomicU64,
}

impl Conduit {
    pub fn new(self_id: IsolateId, ctx: Arc<Context>) -> Self {
        Self {
            self_id,
            ctx,
            pending: DashMap::new(),
            seq_gen: AtomicU64::new(1),
        }
    }

    /// The isolate this conduit belongs to.
    pub fn self_id(&self) -> IsolateId {
        self.self_id
    }

    fn next_seq(&self) -> u64 {
        self.seq_gen.fetch_add(1, Ordering::Relaxed)
    }

    fn dispatch(&self, target: IsolateId, seq: u64, cmd: WireCommand) -> Result<()> {
        let frame = Frame::Request { seq, from: self.self_id, cmd };
        if let Err(e) = self.ctx.deliver(target, Event::Command(frame)) {
            self.pending.remove(&seq);
            return Err(e);
        }
        Ok(())
    }

    /// Sends a request and blocks the calling task until the correlated
    /// response arrives.
    ///
    /// `timeout == Duration::ZERO` means wait indefinitely; lifecycle calls
    /// use this default on the assumption that they are always eventually
    /// answered. A timeout does not retroactively cancel delivery; it only
    /// removes the waiter, so a late response is discarded.
    pub async fn send_sync(
        &self,
        target: IsolateId,
        cmd: WireCommand,
        timeout: Duration,
    ) -> Result<Response> {
        let seq = self.next_seq();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, Pending { target, waiter: Waiter::Sync(tx) });
        self.dispatch(target, seq, cmd)?;

        if timeout.is_zero() {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::ChannelClosed),
            }
        } else {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => {
                    self.pending.remove(&seq);
                    Err(Error::ChannelClosed)
                }
                Err(_) => {
                    self.pending.remove(&seq);
                    Err(Error::Timeout)
                }
            }
        }
    }

    /// Sends a request and registers `on_response`, invoked exactly once from
    /// the calling isolate's event-processing context when the matching
    /// response arrives or the target dies.
    pub fn send_async(
        &self,
        target: IsolateId,
        cmd: WireCommand,
        on_response: impl FnOnce(Result<Response>) + Send + Sync + 'static,
    ) -> Result<Token> {
        let seq = self.next_seq();
        self.pending.insert(
            seq,
            Pending { target, waiter: Waiter::Callback(Box::new(on_response)) },
        );
        self.dispatch(target, seq, cmd)?;
        Ok(Token(seq))
    }

    /// Cancels an asynchronous registration before fulfillment.
    ///
    /// Returns false if the token was already fulfilled or cancelled. After a
    /// successful cancel the callback never fires.
    pub fn cancel(&self, token: Token) -> bool {
        self.pending.remove(&token.0).is_some()
    }

    /// Enqueues a notification; no reply is awaited or possible.
    pub fn notify(&self, target: IsolateId, cmd: WireCommand) -> Result<()> {
        let frame = Frame::Notify { from: self.self_id, cmd };
        self.ctx.deliver(target, Event::Command(frame))
    }

    /// Correlates an incoming response with its waiter.
    ///
    /// Called by the owning event loop for every `Frame::Response` it drains.
    pub fn fulfill(&self, seq: u64, response: Response) {
        match self.pending.remove(&seq) {
            Some((_, pending)) => pending.fulfill(Ok(response)),
            None => debug!(seq, "discarding late response with no waiter"),
        }
    }

    /// Fails every outstanding waiter addressed to `target`.
    ///
    /// Invoked when an isolate is destroyed so that synchronous callers get a
    /// synthesized failure instead of hanging forever, and asynchronous
    /// registrations see the error in their callback.
    pub fn fail_target(&self, target: IsolateId) {
        let seqs: Vec<u64> = self
            .pending
            .iter()
            .filter(|entry| entry.value().target == target)
            .map(|entry| *entry.key())
            .collect();
        for seq in seqs {
            if let Some((_, pending)) = self.pending.remove(&seq) {
                pending.fulfill(Err(Error::Unreachable(target)));
            }
        }
    }

    /// Number of in-flight registrations, for diagnostics.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
