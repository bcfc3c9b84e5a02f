//! Event-loop driven client sessions for ZooKeeper-style coordination services.
//!
//! A [`ZooKeeper`] handle owns one session inside a [`Sessions`] arena. Every
//! operation is asynchronous: the call validates its arguments and issues the
//! request, and the outcome arrives later through the callback, on the thread
//! that drives the reactor.
//!
//! ```ignore
//! use zk::{SessionConfig, ZooKeeper, create_flags};
//! use zk::host::{TokioReactor, drive};
//!
//! let reactor = TokioReactor::new();
//! let zk = ZooKeeper::new(client, reactor.clone());
//! zk.init(&SessionConfig::new("localhost:2181"))?;
//! zk.create("/app", b"", create_flags::PERSISTENT, |status, path| {
//!     println!("{status:?} {path:?}");
//! })?;
//! drive(zk.sessions(), zk.id(), &reactor).await?;
//! ```

pub mod discovery;
pub mod zookeeper;

pub use discovery::{DEFAULT_WEIGHT, Member, MemberError, ServiceDirectory};
pub use zk_protocol::{
	Acl, ClientId, DebugLevel, ErrorClass, ErrorCode, EventType, Interest, LifecycleEvent, SessionState, Stat, Status, WatchedEvent, create_flags,
	perms,
};
#[cfg(unix)]
pub use zk_runtime::host;
pub use zk_runtime::{CoordinationClient, Error, Reactor, Readiness, Result, SessionConfig, SessionId, Sessions, fake};
pub use zookeeper::ZooKeeper;
