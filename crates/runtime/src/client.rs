//! Boundary to the underlying coordination client.
//!
//! The session layer never speaks the wire protocol. It drives a
//! [`Connection`] through its poll-style interface: ask what it is waiting on,
//! tell it what became ready, and collect whatever it delivers.

use std::io;

use zk_protocol::{ClientId, DebugLevel, ErrorCode, Interest, SessionState, WatchedEvent};

use crate::native::{AclVector, InterestQuery, RawStat};
use crate::registry::{RequestToken, WatchToken};

/// Everything the client needs to open a connection handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
	pub connect: String,
	pub timeout_ms: i32,
	/// All zeros when no previous session is being resumed.
	pub client_id: ClientId,
	pub host_order_deterministic: bool,
	pub debug_level: DebugLevel,
}

/// Factory for connection handles. One per session; reused on re-initialization.
pub trait CoordinationClient {
	fn open(&mut self, request: &OpenRequest) -> io::Result<Box<dyn Connection>>;
}

/// A live connection handle owned by exactly one session.
pub trait Connection {
	/// Reports the descriptor and conditions the client is waiting on.
	fn interest(&mut self) -> Result<InterestQuery, ErrorCode>;

	/// Runs one processing step for the conditions in `events`.
	///
	/// Completions, watch notifications, and session events produced by the
	/// step are pushed into `sink` in the order the client produced them.
	fn process(&mut self, events: Interest, sink: &mut Deliveries) -> ErrorCode;

	/// Issues an asynchronous request. A non-OK return means the request was
	/// not issued and nothing will be delivered for `token`.
	fn submit(&mut self, op: Operation<'_>, token: RequestToken, watch: Watch) -> ErrorCode;

	fn state(&self) -> SessionState;

	fn client_id(&self) -> ClientId;

	/// Negotiated session timeout in milliseconds.
	fn recv_timeout(&self) -> i32;

	fn is_unrecoverable(&self) -> bool;

	/// Tears the handle down. Requests still outstanding are reported to `sink`.
	fn close(self: Box<Self>, sink: &mut Deliveries);
}

/// Request payloads, borrowed for the duration of [`Connection::submit`].
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
	Create {
		path: &'a str,
		data: &'a [u8],
		acl: &'a AclVector,
		flags: u32,
	},
	Delete {
		path: &'a str,
		version: i32,
	},
	Exists {
		path: &'a str,
	},
	Get {
		path: &'a str,
	},
	Set {
		path: &'a str,
		data: &'a [u8],
		version: i32,
	},
	GetChildren {
		path: &'a str,
	},
	GetChildren2 {
		path: &'a str,
	},
	GetAcl {
		path: &'a str,
	},
	SetAcl {
		path: &'a str,
		version: i32,
		acl: &'a AclVector,
	},
	AddAuth {
		scheme: &'a str,
		cert: &'a [u8],
	},
	Sync {
		path: &'a str,
	},
}

impl Operation<'_> {
	pub fn name(&self) -> &'static str {
		match self {
			Operation::Create { .. } => "create",
			Operation::Delete { .. } => "delete",
			Operation::Exists { .. } => "exists",
			Operation::Get { .. } => "get",
			Operation::Set { .. } => "set",
			Operation::GetChildren { .. } => "get_children",
			Operation::GetChildren2 { .. } => "get_children2",
			Operation::GetAcl { .. } => "get_acl",
			Operation::SetAcl { .. } => "set_acl",
			Operation::AddAuth { .. } => "add_auth",
			Operation::Sync { .. } => "sync",
		}
	}

	pub fn path(&self) -> Option<&str> {
		match *self {
			Operation::AddAuth { .. } => None,
			Operation::Create { path, .. }
			| Operation::Delete { path, .. }
			| Operation::Exists { path }
			| Operation::Get { path }
			| Operation::Set { path, .. }
			| Operation::GetChildren { path }
			| Operation::GetChildren2 { path }
			| Operation::GetAcl { path }
			| Operation::SetAcl { path, .. }
			| Operation::Sync { path } => Some(path),
		}
	}
}

/// Which watcher a read operation installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watch {
	None,
	/// Notifications go to the session's default watcher.
	Session,
	/// Notifications go to a registered per-call watcher.
	Callback(WatchToken),
}

/// Result payload of a completed request, in native shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
	Void,
	Path(Option<String>),
	Stat(Option<RawStat>),
	Data { stat: Option<RawStat>, data: Option<Vec<u8>> },
	Children(Option<Vec<String>>),
	Children2 { children: Option<Vec<String>>, stat: Option<RawStat> },
	Acl { acl: Option<AclVector>, stat: Option<RawStat> },
}

/// One item produced by a processing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
	Completion { token: RequestToken, rc: ErrorCode, reply: Reply },
	Watch { token: WatchToken, event: WatchedEvent },
	/// Event for the session's default watcher: session transitions and node
	/// events from boolean watches.
	Session(WatchedEvent),
}

/// Ordered buffer the client fills during a processing step.
#[derive(Debug, Default)]
pub struct Deliveries {
	items: Vec<Delivery>,
}

impl Deliveries {
	pub fn complete(&mut self, token: RequestToken, rc: ErrorCode, reply: Reply) {
		self.items.push(Delivery::Completion { token, rc, reply });
	}

	pub fn watch(&mut self, token: WatchToken, event: WatchedEvent) {
		self.items.push(Delivery::Watch { token, event });
	}

	pub fn session_event(&mut self, event: WatchedEvent) {
		self.items.push(Delivery::Session(event));
	}

	pub fn push(&mut self, delivery: Delivery) {
		self.items.push(delivery);
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}
}

impl IntoIterator for Deliveries {
	type Item = Delivery;
	type IntoIter = std::vec::IntoIter<Delivery>;

	fn into_iter(self) -> Self::IntoIter {
		self.items.into_iter()
	}
}
