use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Node metadata as handed to completion callbacks.
///
/// `ephemeral_owner` is kept as lowercase hex: session ids use the full 64-bit
/// range and do not survive a trip through a floating-point host number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
	pub czxid: i64,
	pub mzxid: i64,
	pub pzxid: i64,
	pub data_length: i32,
	pub num_children: i32,
	pub version: i32,
	pub cversion: i32,
	pub aversion: i32,
	pub ctime: SystemTime,
	pub mtime: SystemTime,
	pub ephemeral_owner: String,
	pub created_in_this_session: bool,
}

impl Stat {
	/// True when the node is ephemeral (owned by some session).
	pub fn is_ephemeral(&self) -> bool {
		self.ephemeral_owner != "0"
	}
}
