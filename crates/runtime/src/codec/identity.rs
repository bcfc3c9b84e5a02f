//! Hex text forms of a session identity.
//!
//! The password is rendered as 32 uppercase hex digits and parsed in either
//! case. The session id is rendered as unpadded lowercase hex of its unsigned
//! 64-bit value, so negative ids survive the round trip.

use zk_protocol::{ClientId, PASSWORD_LEN};

use crate::error::{Error, Result};

pub fn encode_password(password: &[u8; PASSWORD_LEN]) -> String {
	hex::encode_upper(password)
}

pub fn decode_password(text: &str) -> Result<[u8; PASSWORD_LEN]> {
	if text.len() != PASSWORD_LEN * 2 {
		return Err(Error::password_length(text.len()));
	}
	let mut password = [0u8; PASSWORD_LEN];
	hex::decode_to_slice(text, &mut password).map_err(|source| Error::Hex {
		field: "client_password",
		source,
	})?;
	Ok(password)
}

pub fn encode_id(id: i64) -> String {
	format!("{:x}", id as u64)
}

pub fn decode_id(text: &str) -> Result<i64> {
	let digits = text.strip_prefix("0x").unwrap_or(text);
	if digits.is_empty() || digits.len() > 16 {
		return Err(Error::ClientId(text.to_string()));
	}
	u64::from_str_radix(digits, 16)
		.map(|value| value as i64)
		.map_err(|_| Error::ClientId(text.to_string()))
}

/// Parses a full identity from its two hex fields.
pub fn decode(id: &str, password: &str) -> Result<ClientId> {
	Ok(ClientId::new(decode_id(id)?, decode_password(password)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn password_is_uppercase_and_round_trips() {
		let password: [u8; PASSWORD_LEN] = [0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0xa0, 0xff];
		let text = encode_password(&password);
		assert_eq!(text, "DEADBEEF00010203040506070809A0FF");
		assert_eq!(decode_password(&text).unwrap(), password);
		assert_eq!(decode_password(&text.to_lowercase()).unwrap(), password);
	}

	#[test]
	fn password_length_is_checked() {
		let err = decode_password("ABCD").unwrap_err();
		assert!(matches!(err, Error::PasswordLength { expected: 32, actual: 4 }));

		let err = decode_password(&"Z".repeat(32)).unwrap_err();
		assert!(matches!(err, Error::Hex { field: "client_password", .. }));
	}

	#[test]
	fn id_round_trips_full_range() {
		for id in [0i64, 1, 0x1_5a2b_0000_0001, i64::MAX, -1, i64::MIN] {
			assert_eq!(decode_id(&encode_id(id)).unwrap(), id);
		}
		assert_eq!(encode_id(255), "ff");
		assert_eq!(encode_id(-1), "ffffffffffffffff");
	}

	#[test]
	fn id_rejects_garbage() {
		assert!(decode_id("").is_err());
		assert!(decode_id("xyz").is_err());
		assert!(decode_id("11112222333344445").is_err());
		assert_eq!(decode_id("0x10").unwrap(), 16);
	}
}
