//! # Mvmrun
//!
//! The runtime half of the multi-VM application-management core: per-isolate
//! event queues, the command conduit that correlates requests with responses,
//! the per-application lifecycle state machine, and the executive-side
//! orchestrator that owns the isolate/app/window bookkeeping.
//!
//! ## Topology
//!
//! One distinguished isolate (the executive) coordinates all others. Every
//! isolate owns exactly one event queue; its event loop drains that queue
//! strictly in delivery order. All cross-isolate traffic travels as frames on
//! those queues, so FIFO holds per (source, target) pair and nothing else is
//! guaranteed.

pub mod conduit;
pub mod context;
pub mod error;
pub mod isolate;
pub mod midlet;
pub mod orchestrator;
pub mod policy;
pub mod queue;
pub mod traits;

#[cfg(test)]
mod tests;

pub use conduit::Conduit;
pub use context::Context;
pub use error::Error;
pub use error::Result;
pub use isolate::InProcessFactory;
pub use isolate::IsolateRuntime;
pub use midlet::MidletPeer;
pub use midlet::MidletState;
pub use orchestrator::IsolateFactory;
pub use orchestrator::Orchestrator;
pub use policy::ActivationPolicy;
pub use policy::HighestPriority;
pub use queue::Event;
pub use queue::EventQueue;
pub use traits::AppLoader;
pub use traits::MidletApp;
pub use traits::UiEvent;
pub use traits::UiSink;
