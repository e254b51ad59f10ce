//! # Mvmrpc
//!
//! The command protocol of the multi-VM application-management core: typed
//! wire commands, the lifecycle/window command set, and the request/response
//! envelope carried over per-isolate event queues.
//!
//! ## Architecture
//!
//! Commands serialize positionally over `mvmpack`. Every concrete command
//! writes its base field group first, then its own fields, in the same order
//! on both ends; that symmetry is the load-bearing invariant of the wire
//! format. Routing happens on `message_type` before any field is decoded.

pub mod command;
pub mod descriptor;
pub mod error;
pub mod fields;
pub mod frame;
pub mod id;
pub mod lifecycle;
pub mod response;
pub mod route;
pub mod window;
pub mod wire;


pub use command::Command;
pub use descriptor::AppDescriptor;
pub use error::Error;
pub use error::Result;
pub use frame::Frame;
pub use id::AppId;
pub use id::IsolateId;
pub use id::WindowId;
pub use response::Payload;
pub use response::Response;
pub use wire::WireCommand;
