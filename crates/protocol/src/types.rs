//! Session states, watch event types, interest flags, and permission bits.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Size of the session password negotiated with the server.
pub const PASSWORD_LEN: usize = 16;

/// Default session timeout used when the caller asks for `0` or nothing.
pub const DEFAULT_SESSION_TIMEOUT_MS: i32 = 20_000;

/// Permission bits carried by an ACL entry.
pub mod perms {
	pub const READ: i32 = 1 << 0;
	pub const WRITE: i32 = 1 << 1;
	pub const CREATE: i32 = 1 << 2;
	pub const DELETE: i32 = 1 << 3;
	pub const ADMIN: i32 = 1 << 4;
	pub const ALL: i32 = READ | WRITE | CREATE | DELETE | ADMIN;
}

/// Flags accepted by `create`.
pub mod create_flags {
	pub const PERSISTENT: u32 = 0;
	pub const EPHEMERAL: u32 = 1;
	pub const SEQUENCE: u32 = 2;
}

/// Connection state of a session.
///
/// `Init` and `Closed` both report code `0`, which is what a session without a
/// live connection handle exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
	#[default]
	Init,
	Connecting,
	Associating,
	Connected,
	Expired,
	AuthFailed,
	Closed,
}

impl SessionState {
	pub fn code(self) -> i32 {
		match self {
			SessionState::Init | SessionState::Closed => 0,
			SessionState::Connecting => 1,
			SessionState::Associating => 2,
			SessionState::Connected => 3,
			SessionState::Expired => -112,
			SessionState::AuthFailed => -113,
		}
	}

	/// Maps a raw state code; unknown codes yield `None`.
	pub fn from_code(code: i32) -> Option<Self> {
		match code {
			0 => Some(SessionState::Init),
			1 => Some(SessionState::Connecting),
			2 => Some(SessionState::Associating),
			3 => Some(SessionState::Connected),
			-112 => Some(SessionState::Expired),
			-113 => Some(SessionState::AuthFailed),
			_ => None,
		}
	}

	/// States after which the session cannot be used again without re-initialization.
	pub fn is_terminal(self) -> bool {
		matches!(self, SessionState::Expired | SessionState::AuthFailed | SessionState::Closed)
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SessionState::Init => "init",
			SessionState::Connecting => "connecting",
			SessionState::Associating => "associating",
			SessionState::Connected => "connected",
			SessionState::Expired => "expired",
			SessionState::AuthFailed => "auth_failed",
			SessionState::Closed => "closed",
		};
		f.write_str(name)
	}
}

/// Type of a watch notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
	Created,
	Deleted,
	Changed,
	Child,
	Session,
	NotWatching,
}

impl EventType {
	pub fn code(self) -> i32 {
		match self {
			EventType::Created => 1,
			EventType::Deleted => 2,
			EventType::Changed => 3,
			EventType::Child => 4,
			EventType::Session => -1,
			EventType::NotWatching => -2,
		}
	}

	pub fn from_code(code: i32) -> Option<Self> {
		match code {
			1 => Some(EventType::Created),
			2 => Some(EventType::Deleted),
			3 => Some(EventType::Changed),
			4 => Some(EventType::Child),
			-1 => Some(EventType::Session),
			-2 => Some(EventType::NotWatching),
			_ => None,
		}
	}
}

/// I/O conditions the client needs before it can make progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interest(u8);

impl Interest {
	pub const NONE: Interest = Interest(0);
	pub const WRITE: Interest = Interest(1 << 0);
	pub const READ: Interest = Interest(1 << 1);
	pub const BOTH: Interest = Interest((1 << 0) | (1 << 1));

	pub fn from_flags(readable: bool, writable: bool) -> Self {
		let mut mask = Interest::NONE;
		if readable {
			mask = mask | Interest::READ;
		}
		if writable {
			mask = mask | Interest::WRITE;
		}
		mask
	}

	pub fn bits(self) -> u8 {
		self.0
	}

	pub fn contains(self, other: Interest) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn readable(self) -> bool {
		self.contains(Interest::READ)
	}

	pub fn writable(self) -> bool {
		self.contains(Interest::WRITE)
	}

	pub fn is_empty(self) -> bool {
		self.0 == 0
	}
}

impl BitOr for Interest {
	type Output = Interest;

	fn bitor(self, rhs: Interest) -> Interest {
		Interest(self.0 | rhs.0)
	}
}

/// Log verbosity handed to the underlying client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
	Error,
	#[default]
	Warn,
	Info,
	Debug,
}

impl DebugLevel {
	pub fn code(self) -> i32 {
		match self {
			DebugLevel::Error => 1,
			DebugLevel::Warn => 2,
			DebugLevel::Info => 3,
			DebugLevel::Debug => 4,
		}
	}

	pub fn from_code(code: i32) -> Option<Self> {
		match code {
			1 => Some(DebugLevel::Error),
			2 => Some(DebugLevel::Warn),
			3 => Some(DebugLevel::Info),
			4 => Some(DebugLevel::Debug),
			_ => None,
		}
	}
}

/// Session identity: the server-assigned id plus its password.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId {
	pub id: i64,
	pub password: [u8; PASSWORD_LEN],
}

impl ClientId {
	pub fn new(id: i64, password: [u8; PASSWORD_LEN]) -> Self {
		Self { id, password }
	}

	/// True for the all-zero identity used when no prior session is resumed.
	pub fn is_zero(&self) -> bool {
		self.id == 0 && self.password == [0; PASSWORD_LEN]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn interest_flags_compose() {
		let both = Interest::from_flags(true, true);
		assert_eq!(both, Interest::BOTH);
		assert!(both.readable() && both.writable());
		assert!(Interest::from_flags(false, false).is_empty());
		assert!(!Interest::READ.writable());
		assert_eq!(Interest::WRITE.bits(), 1);
		assert_eq!(Interest::READ.bits(), 2);
	}

	#[test]
	fn state_codes_round_trip() {
		for state in [
			SessionState::Connecting,
			SessionState::Associating,
			SessionState::Connected,
			SessionState::Expired,
			SessionState::AuthFailed,
		] {
			assert_eq!(SessionState::from_code(state.code()), Some(state));
		}
		assert_eq!(SessionState::Closed.code(), 0);
		assert_eq!(SessionState::from_code(999), None);
	}

	#[test]
	fn terminal_states() {
		assert!(SessionState::Expired.is_terminal());
		assert!(SessionState::AuthFailed.is_terminal());
		assert!(SessionState::Closed.is_terminal());
		assert!(!SessionState::Connected.is_terminal());
	}

	#[test]
	fn all_permission_covers_each_bit() {
		for bit in [perms::READ, perms::WRITE, perms::CREATE, perms::DELETE, perms::ADMIN] {
			assert_eq!(perms::ALL & bit, bit);
		}
		assert_eq!(perms::ALL, 31);
	}

	#[test]
	fn debug_level_parses_lowercase() {
		let level: DebugLevel = serde_json::from_str("\"info\"").unwrap();
		assert_eq!(level, DebugLevel::Info);
		assert_eq!(DebugLevel::from_code(level.code()), Some(DebugLevel::Info));
	}

	#[test]
	fn zero_identity() {
		assert!(ClientId::default().is_zero());
		assert!(!ClientId::new(1, [0; PASSWORD_LEN]).is_zero());
	}
}
