//! Conversion between the client's native structures and their host shapes.
//!
//! * [`stat`] - [`RawStat`](crate::RawStat) to [`Stat`](zk_protocol::Stat)
//! * [`acl`] - host ACL lists to and from [`AclVector`](crate::AclVector)
//! * [`identity`] - session id and password to and from hex text

pub mod acl;
pub mod identity;
pub mod stat;
