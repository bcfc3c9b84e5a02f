//! Session configuration as supplied by the host.

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use zk_protocol::{ClientId, DEFAULT_SESSION_TIMEOUT_MS, DebugLevel};

use crate::client::OpenRequest;
use crate::codec::identity;
use crate::error::{Error, Result};

/// Options for initializing a session.
///
/// Deserializes from the host's option object:
///
/// ```json
/// {
///   "connect": "zk1:2181,zk2:2181/app",
///   "timeout": 30000,
///   "debug_level": "info",
///   "host_order_deterministic": false,
///   "client_id": "15a2b00000001",
///   "client_password": "DEADBEEF00010203040506070809A0FF"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// Comma-separated `host:port` list with an optional chroot suffix.
	pub connect: String,
	/// Session timeout in milliseconds; `0` or absent selects the default.
	pub timeout: Option<i32>,
	pub host_order_deterministic: bool,
	pub debug_level: Option<DebugLevel>,
	/// Hex session id of a session to resume. Requires `client_password`.
	pub client_id: Option<String>,
	/// 32 hex digits. Requires `client_id`.
	pub client_password: Option<String>,
}

impl SessionConfig {
	pub fn new(connect: impl Into<String>) -> Self {
		Self {
			connect: connect.into(),
			..Self::default()
		}
	}

	pub fn with_timeout(mut self, timeout_ms: i32) -> Self {
		self.timeout = Some(timeout_ms);
		self
	}

	pub fn with_debug_level(mut self, level: DebugLevel) -> Self {
		self.debug_level = Some(level);
		self
	}

	pub fn with_host_order_deterministic(mut self, deterministic: bool) -> Self {
		self.host_order_deterministic = deterministic;
		self
	}

	/// Resumes a previous session from its hex id and password.
	pub fn with_identity(mut self, client_id: impl Into<String>, client_password: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());
		self.client_password = Some(client_password.into());
		self
	}

	pub fn from_json(value: serde_json::Value) -> Result<Self> {
		Ok(serde_json::from_value(value)?)
	}

	/// Validates the options and produces the client's open request.
	pub fn resolve(&self) -> Result<OpenRequest> {
		if self.connect.trim().is_empty() {
			return Err(Error::Config("connect string is required".into()));
		}

		let timeout_ms = match self.timeout {
			None | Some(0) => DEFAULT_SESSION_TIMEOUT_MS,
			Some(ms) if ms < 0 => return Err(Error::Config(format!("timeout must not be negative, got {ms}"))),
			Some(ms) => ms,
		};

		let client_id = match (&self.client_id, &self.client_password) {
			(None, None) => ClientId::default(),
			(Some(id), Some(password)) => identity::decode(id, password)?,
			_ => {
				return Err(Error::Config(
					"client_id and client_password must either be both specified or both unspecified".into(),
				));
			}
		};

		Ok(OpenRequest {
			connect: self.connect.clone(),
			timeout_ms,
			client_id,
			host_order_deterministic: self.host_order_deterministic,
			debug_level: self.debug_level.unwrap_or_default(),
		})
	}
}

/// Tracing filter matching a client debug level.
pub fn level_filter(level: DebugLevel) -> LevelFilter {
	match level {
		DebugLevel::Error => LevelFilter::ERROR,
		DebugLevel::Warn => LevelFilter::WARN,
		DebugLevel::Info => LevelFilter::INFO,
		DebugLevel::Debug => LevelFilter::DEBUG,
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn zero_or_missing_timeout_uses_default() {
		let request = SessionConfig::new("localhost:2181").resolve().unwrap();
		assert_eq!(request.timeout_ms, 20_000);

		let request = SessionConfig::new("localhost:2181").with_timeout(0).resolve().unwrap();
		assert_eq!(request.timeout_ms, 20_000);

		let request = SessionConfig::new("localhost:2181").with_timeout(5_000).resolve().unwrap();
		assert_eq!(request.timeout_ms, 5_000);
	}

	#[test]
	fn negative_timeout_is_rejected() {
		let err = SessionConfig::new("localhost:2181").with_timeout(-5).resolve().unwrap_err();
		assert!(err.is_config());
	}

	#[test]
	fn empty_connect_is_rejected() {
		assert!(SessionConfig::default().resolve().unwrap_err().is_config());
	}

	#[test]
	fn identity_requires_both_fields() {
		let mut config = SessionConfig::new("localhost:2181");
		config.client_id = Some("1".into());
		let err = config.resolve().unwrap_err();
		assert!(matches!(err, Error::Config(_)));

		let mut config = SessionConfig::new("localhost:2181");
		config.client_password = Some("00".repeat(16));
		assert!(config.resolve().is_err());
	}

	#[test]
	fn identity_is_decoded() {
		let request = SessionConfig::new("localhost:2181")
			.with_identity("15a2b00000001", "DEADBEEF00010203040506070809A0FF")
			.resolve()
			.unwrap();
		assert_eq!(request.client_id.id, 0x1_5a2b_0000_0001);
		assert_eq!(request.client_id.password[0], 0xde);
		assert_eq!(request.client_id.password[15], 0xff);
	}

	#[test]
	fn short_password_is_rejected() {
		let err = SessionConfig::new("localhost:2181").with_identity("1", "ABCD").resolve().unwrap_err();
		assert!(matches!(err, Error::PasswordLength { expected: 32, actual: 4 }));
	}

	#[test]
	fn parses_host_options() {
		let config = SessionConfig::from_json(json!({
			"connect": "zk1:2181,zk2:2181/app",
			"timeout": 30000,
			"debug_level": "info",
			"host_order_deterministic": true,
		}))
		.unwrap();
		let request = config.resolve().unwrap();
		assert_eq!(request.connect, "zk1:2181,zk2:2181/app");
		assert_eq!(request.timeout_ms, 30_000);
		assert_eq!(request.debug_level, DebugLevel::Info);
		assert!(request.host_order_deterministic);
		assert!(request.client_id.is_zero());
		assert_eq!(level_filter(request.debug_level), LevelFilter::INFO);
	}

	#[test]
	fn rejects_unknown_debug_level() {
		let err = SessionConfig::from_json(json!({ "connect": "a:1", "debug_level": "loud" })).unwrap_err();
		assert!(matches!(err, Error::Json(_)));
	}
}
