//! Return codes reported by the coordination client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Return code of a client call or an asynchronous completion.
///
/// Codes between [`ErrorCode::SystemError`] and [`ErrorCode::ApiError`] are
/// system-class errors (connection trouble the client retries on its own);
/// codes at or below [`ErrorCode::ApiError`] are API-class errors that end a
/// single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ErrorCode {
	Ok,
	SystemError,
	RuntimeInconsistency,
	DataInconsistency,
	ConnectionLoss,
	MarshallingError,
	Unimplemented,
	OperationTimeout,
	BadArguments,
	InvalidState,
	ApiError,
	NoNode,
	NoAuth,
	BadVersion,
	NoChildrenForEphemerals,
	NodeExists,
	NotEmpty,
	SessionExpired,
	InvalidCallback,
	InvalidAcl,
	AuthFailed,
	Closing,
	Nothing,
	SessionMoved,
	/// A code this crate has no name for.
	Other(i32),
}

/// Coarse partition of [`ErrorCode`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
	Ok,
	System,
	Api,
}

impl ErrorCode {
	/// Numeric value as used by the client library.
	pub fn code(self) -> i32 {
		match self {
			ErrorCode::Ok => 0,
			ErrorCode::SystemError => -1,
			ErrorCode::RuntimeInconsistency => -2,
			ErrorCode::DataInconsistency => -3,
			ErrorCode::ConnectionLoss => -4,
			ErrorCode::MarshallingError => -5,
			ErrorCode::Unimplemented => -6,
			ErrorCode::OperationTimeout => -7,
			ErrorCode::BadArguments => -8,
			ErrorCode::InvalidState => -9,
			ErrorCode::ApiError => -100,
			ErrorCode::NoNode => -101,
			ErrorCode::NoAuth => -102,
			ErrorCode::BadVersion => -103,
			ErrorCode::NoChildrenForEphemerals => -108,
			ErrorCode::NodeExists => -110,
			ErrorCode::NotEmpty => -111,
			ErrorCode::SessionExpired => -112,
			ErrorCode::InvalidCallback => -113,
			ErrorCode::InvalidAcl => -114,
			ErrorCode::AuthFailed => -115,
			ErrorCode::Closing => -116,
			ErrorCode::Nothing => -117,
			ErrorCode::SessionMoved => -118,
			ErrorCode::Other(code) => code,
		}
	}

	pub fn from_code(code: i32) -> Self {
		match code {
			0 => ErrorCode::Ok,
			-1 => ErrorCode::SystemError,
			-2 => ErrorCode::RuntimeInconsistency,
			-3 => ErrorCode::DataInconsistency,
			-4 => ErrorCode::ConnectionLoss,
			-5 => ErrorCode::MarshallingError,
			-6 => ErrorCode::Unimplemented,
			-7 => ErrorCode::OperationTimeout,
			-8 => ErrorCode::BadArguments,
			-9 => ErrorCode::InvalidState,
			-100 => ErrorCode::ApiError,
			-101 => ErrorCode::NoNode,
			-102 => ErrorCode::NoAuth,
			-103 => ErrorCode::BadVersion,
			-108 => ErrorCode::NoChildrenForEphemerals,
			-110 => ErrorCode::NodeExists,
			-111 => ErrorCode::NotEmpty,
			-112 => ErrorCode::SessionExpired,
			-113 => ErrorCode::InvalidCallback,
			-114 => ErrorCode::InvalidAcl,
			-115 => ErrorCode::AuthFailed,
			-116 => ErrorCode::Closing,
			-117 => ErrorCode::Nothing,
			-118 => ErrorCode::SessionMoved,
			other => ErrorCode::Other(other),
		}
	}

	pub fn is_ok(self) -> bool {
		self == ErrorCode::Ok
	}

	/// Which side of the system/API split this code falls on.
	pub fn class(self) -> ErrorClass {
		match self.code() {
			0 => ErrorClass::Ok,
			code if code > -100 => ErrorClass::System,
			_ => ErrorClass::Api,
		}
	}

	/// Human-readable message, worded like the client library's `zerror`.
	pub fn message(self) -> &'static str {
		match self {
			ErrorCode::Ok => "ok",
			ErrorCode::SystemError => "system error",
			ErrorCode::RuntimeInconsistency => "run time inconsistency",
			ErrorCode::DataInconsistency => "data inconsistency",
			ErrorCode::ConnectionLoss => "connection loss",
			ErrorCode::MarshallingError => "marshalling error",
			ErrorCode::Unimplemented => "unimplemented",
			ErrorCode::OperationTimeout => "operation timeout",
			ErrorCode::BadArguments => "bad arguments",
			ErrorCode::InvalidState => "invalid zhandle state",
			ErrorCode::ApiError => "api error",
			ErrorCode::NoNode => "no node",
			ErrorCode::NoAuth => "not authenticated",
			ErrorCode::BadVersion => "bad version",
			ErrorCode::NoChildrenForEphemerals => "no children for ephemerals",
			ErrorCode::NodeExists => "node exists",
			ErrorCode::NotEmpty => "not empty",
			ErrorCode::SessionExpired => "session expired",
			ErrorCode::InvalidCallback => "invalid callback",
			ErrorCode::InvalidAcl => "invalid acl",
			ErrorCode::AuthFailed => "authentication failed",
			ErrorCode::Closing => "zookeeper is closing",
			ErrorCode::Nothing => "(not error) no server responses to process",
			ErrorCode::SessionMoved => "session moved to another server, so operation is ignored",
			ErrorCode::Other(_) => "unknown error",
		}
	}
}

impl From<i32> for ErrorCode {
	fn from(code: i32) -> Self {
		ErrorCode::from_code(code)
	}
}

impl From<ErrorCode> for i32 {
	fn from(code: ErrorCode) -> Self {
		code.code()
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.message(), self.code())
	}
}

/// Status delivered alongside every completion: the code and its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
	pub rc: ErrorCode,
	pub message: &'static str,
}

impl Status {
	pub fn new(rc: ErrorCode) -> Self {
		Self { rc, message: rc.message() }
	}

	pub fn is_ok(&self) -> bool {
		self.rc.is_ok()
	}
}

impl From<ErrorCode> for Status {
	fn from(rc: ErrorCode) -> Self {
		Status::new(rc)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_named_code_maps_back_to_itself() {
		for code in [0, -1, -2, -3, -4, -5, -6, -7, -8, -9, -100, -101, -102, -103, -108, -110, -111, -112, -113, -114, -115, -116, -117, -118] {
			let named = ErrorCode::from_code(code);
			assert!(!matches!(named, ErrorCode::Other(_)), "code {code} should be named");
			assert_eq!(named.code(), code);
		}
	}

	#[test]
	fn unknown_codes_are_preserved() {
		assert_eq!(ErrorCode::from_code(-42), ErrorCode::Other(-42));
		assert_eq!(ErrorCode::Other(-42).code(), -42);
		assert_eq!(ErrorCode::Other(-42).message(), "unknown error");
	}

	#[test]
	fn classes_split_at_api_error() {
		assert_eq!(ErrorCode::Ok.class(), ErrorClass::Ok);
		assert_eq!(ErrorCode::ConnectionLoss.class(), ErrorClass::System);
		assert_eq!(ErrorCode::OperationTimeout.class(), ErrorClass::System);
		assert_eq!(ErrorCode::InvalidState.class(), ErrorClass::System);
		assert_eq!(ErrorCode::ApiError.class(), ErrorClass::Api);
		assert_eq!(ErrorCode::NoNode.class(), ErrorClass::Api);
		assert_eq!(ErrorCode::Closing.class(), ErrorClass::Api);
	}

	#[test]
	fn serializes_as_raw_integer() {
		assert_eq!(serde_json::to_string(&ErrorCode::NoNode).unwrap(), "-101");
		let code: ErrorCode = serde_json::from_str("-110").unwrap();
		assert_eq!(code, ErrorCode::NodeExists);
	}

	#[test]
	fn status_carries_message() {
		let status = Status::new(ErrorCode::NoNode);
		assert_eq!(status.message, "no node");
		assert!(!status.is_ok());
	}
}
