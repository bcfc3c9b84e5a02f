use std::ffi::NulError;
use std::io;

use thiserror::Error;
use zk_protocol::{ErrorCode, PASSWORD_LEN};

use crate::table::SessionId;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported synchronously by the session layer.
///
/// Outcomes of asynchronous operations never surface here; they reach the
/// completion callback as an [`ErrorCode`].
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid session configuration: {0}")]
	Config(String),

	#[error("client password must be {expected} hex characters, got {actual}")]
	PasswordLength { expected: usize, actual: usize },

	#[error("invalid hex in {field}")]
	Hex {
		field: &'static str,
		#[source]
		source: hex::FromHexError,
	},

	#[error("invalid client id {0:?}")]
	ClientId(String),

	#[error("failed to init session handle")]
	Init(#[source] io::Error),

	/// Local status returned by a call that was rejected before (or while) being issued.
	#[error("{0}")]
	Local(ErrorCode),

	#[error("ACL entry contains an interior NUL byte")]
	AclNul(#[from] NulError),

	#[error("unknown session {0}")]
	UnknownSession(SessionId),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub(crate) fn password_length(actual: usize) -> Self {
		Error::PasswordLength {
			expected: PASSWORD_LEN * 2,
			actual,
		}
	}

	/// Local status code, for errors that have one.
	pub fn code(&self) -> Option<ErrorCode> {
		match self {
			Error::Local(code) => Some(*code),
			Error::AclNul(_) => Some(ErrorCode::BadArguments),
			_ => None,
		}
	}

	/// True for errors caused by the session configuration itself.
	pub fn is_config(&self) -> bool {
		matches!(self, Error::Config(_) | Error::PasswordLength { .. } | Error::Hex { .. } | Error::ClientId(_))
	}
}

impl From<ErrorCode> for Error {
	fn from(code: ErrorCode) -> Self {
		Error::Local(code)
	}
}
