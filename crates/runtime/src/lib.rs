//! Session layer between a coordination client and a host event loop.
//!
//! The underlying client library speaks a poll-style protocol: it reports which
//! descriptor it wants watched, for which conditions, and how long it can wait
//! before it must run again. This crate owns everything between that interest
//! model and the host:
//!
//! * [`Session`] - one connection handle with its descriptor, keep-alive timer,
//!   identity, and callback registry
//! * the event-loop bridge (`yield_interest`, `on_io_ready`, `on_timer_fire`)
//! * [`SessionStateMachine`] - lifecycle interpretation of session events
//! * [`CallbackRegistry`] - exactly-once completion and watch delivery
//! * [`codec`] - stat, ACL, and identity conversion
//!
//! # Message Flow
//!
//! 1. The host reactor reports readiness (or the keep-alive timer fires)
//! 2. The session feeds the client's processing step
//! 3. The client reports completions, watches, and session events into a
//!    [`Deliveries`] buffer
//! 4. The session marshals each result and queues the caller's callback
//! 5. [`Sessions`] runs the queued callbacks with no session borrowed
//! 6. The session re-queries interest and re-arms the reactor
//!
//! Everything runs on the thread that drives the reactor; nothing here blocks.

pub mod bridge;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod fake;
#[cfg(unix)]
pub mod host;
pub mod native;
pub mod ops;
pub mod reactor;
pub mod registry;
pub mod session;
pub mod state;
pub mod table;

pub use bridge::Readiness;
pub use client::{Connection, CoordinationClient, Deliveries, Delivery, OpenRequest, Operation, Reply, Watch};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use native::{AclVector, InterestQuery, RawAcl, RawStat};
pub use reactor::Reactor;
pub use registry::{
	AclCallback, CallbackRegistry, Children2Callback, ChildrenCallback, Completion, DataCallback, Dispatch, OpKind, PathCallback, RequestToken,
	StatCallback, VoidCallback, WatchCallback, WatchToken,
};
pub use session::Session;
pub use state::{SessionStateMachine, Transition};
pub use table::{SessionId, Sessions};
