use serde::{Deserialize, Serialize};

use crate::types::perms;

/// One access-control entry in its host shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
	pub scheme: String,
	/// Identity within the scheme (`anyone`, a digest, an address range...).
	#[serde(rename = "auth")]
	pub id: String,
	pub perms: i32,
}

impl Acl {
	pub fn new(scheme: impl Into<String>, id: impl Into<String>, perms: i32) -> Self {
		Self {
			scheme: scheme.into(),
			id: id.into(),
			perms,
		}
	}

	/// `world:anyone` with every permission.
	pub fn open_unsafe() -> Self {
		Acl::new("world", "anyone", perms::ALL)
	}

	/// `world:anyone` with read permission only.
	pub fn read_unsafe() -> Self {
		Acl::new("world", "anyone", perms::READ)
	}

	/// Every permission for whoever authenticated the creating session.
	pub fn creator_all() -> Self {
		Acl::new("auth", "", perms::ALL)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn well_known_entries() {
		assert_eq!(Acl::open_unsafe(), Acl::new("world", "anyone", 31));
		assert_eq!(Acl::read_unsafe(), Acl::new("world", "anyone", 1));
		assert_eq!(Acl::creator_all(), Acl::new("auth", "", 31));
	}

	#[test]
	fn identity_serializes_as_auth() {
		let value = serde_json::to_value(Acl::open_unsafe()).unwrap();
		assert_eq!(value["scheme"], "world");
		assert_eq!(value["auth"], "anyone");
		assert_eq!(value["perms"], 31);
	}
}
