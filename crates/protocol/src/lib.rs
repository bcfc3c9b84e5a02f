//! Data types shared by the session layer and the coordination client.
//!
//! This crate holds the plain values that cross the boundary between the
//! underlying coordination client and the host: return codes, session states,
//! watch event types, permission bits, and the host-side shapes of node
//! metadata and ACL entries.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and code mapping
//! * 1:1 with the client library's numeric constants
//! * Stable: Changes only when the client library's constants change
//!
//! Conversion from the client's native structures lives in `zk-runtime`.

pub mod acl;
pub mod codes;
pub mod event;
pub mod stat;
pub mod types;

pub use acl::*;
pub use codes::*;
pub use event::*;
pub use stat::*;
pub use types::*;
