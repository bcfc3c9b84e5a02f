//! Structures in the shape the coordination client produces and consumes.

use std::ffi::CString;
use std::os::fd::RawFd;
use std::time::Duration;

use zk_protocol::Interest;

/// Node metadata as reported by the client: raw ids and millisecond timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawStat {
	pub czxid: i64,
	pub mzxid: i64,
	pub ctime: i64,
	pub mtime: i64,
	pub version: i32,
	pub cversion: i32,
	pub aversion: i32,
	pub ephemeral_owner: i64,
	pub data_length: i32,
	pub num_children: i32,
	pub pzxid: i64,
}

/// One ACL entry with natively owned, NUL-terminated strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAcl {
	pub perms: i32,
	pub scheme: CString,
	pub id: CString,
}

/// Owned ACL vector, as passed to or returned by the client.
///
/// Whoever holds the vector releases it (with all of its strings) on drop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclVector {
	data: Vec<RawAcl>,
}

impl AclVector {
	pub fn with_capacity(count: usize) -> Self {
		Self {
			data: Vec::with_capacity(count),
		}
	}

	pub fn push(&mut self, acl: RawAcl) {
		self.data.push(acl);
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, RawAcl> {
		self.data.iter()
	}
}

impl FromIterator<RawAcl> for AclVector {
	fn from_iter<I: IntoIterator<Item = RawAcl>>(iter: I) -> Self {
		Self {
			data: iter.into_iter().collect(),
		}
	}
}

/// What the client is waiting on: descriptor, conditions, and time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestQuery {
	/// `None` while no socket exists yet (e.g. host resolution in progress).
	pub fd: Option<RawFd>,
	pub interest: Interest,
	pub timeout: Duration,
}
