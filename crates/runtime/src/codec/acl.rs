use std::ffi::CString;

use zk_protocol::Acl;

use crate::error::Result;
use crate::native::{AclVector, RawAcl};

/// Builds a natively owned ACL vector from host entries.
///
/// Fails when a scheme or id contains an interior NUL byte.
pub fn encode(list: &[Acl]) -> Result<AclVector> {
	let mut vector = AclVector::with_capacity(list.len());
	for acl in list {
		vector.push(RawAcl {
			perms: acl.perms,
			scheme: CString::new(acl.scheme.as_str())?,
			id: CString::new(acl.id.as_str())?,
		});
	}
	Ok(vector)
}

pub fn decode(vector: &AclVector) -> Vec<Acl> {
	vector
		.iter()
		.map(|raw| Acl::new(raw.scheme.to_string_lossy(), raw.id.to_string_lossy(), raw.perms))
		.collect()
}

#[cfg(test)]
mod tests {
	use zk_protocol::perms;

	use super::*;
	use crate::error::Error;

	#[test]
	fn round_trips_entries_in_order() {
		let list = vec![
			Acl::open_unsafe(),
			Acl::new("digest", "user:hash=", perms::READ | perms::WRITE),
			Acl::new("ip", "10.0.0.0/8", perms::ADMIN),
		];
		let vector = encode(&list).unwrap();
		assert_eq!(vector.len(), 3);
		assert_eq!(decode(&vector), list);
	}

	#[test]
	fn empty_list_is_empty_vector() {
		let vector = encode(&[]).unwrap();
		assert!(vector.is_empty());
		assert!(decode(&vector).is_empty());
	}

	#[test]
	fn interior_nul_is_rejected() {
		let err = encode(&[Acl::new("wor\0ld", "anyone", perms::ALL)]).unwrap_err();
		assert!(matches!(err, Error::AclNul(_)));
	}
}
