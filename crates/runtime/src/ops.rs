//! Asynchronous node operations.
//!
//! Each call validates locally, records the callback, and issues the request.
//! `Ok(())` means the request was issued and the callback will fire exactly
//! once. An `Err` means nothing was issued and the callback is dropped
//! without being invoked.

use serde_json::Value;
use tracing::{debug, warn};
use zk_protocol::{Acl, ErrorCode, create_flags};

use crate::client::{Operation, Watch};
use crate::codec;
use crate::error::{Error, Result};
use crate::registry::{
	AclCallback, Children2Callback, ChildrenCallback, Completion, DataCallback, OpKind, PathCallback, RequestToken, StatCallback, VoidCallback,
	WatchCallback,
};
use crate::session::Session;

/// Watcher requested by a read operation.
pub enum WatchMode {
	None,
	/// Boolean watch: notifications reach the session's subscribers.
	Session,
	/// Per-call watcher with caller context.
	Callback { callback: WatchCallback, handback: Option<Value> },
}

impl WatchMode {
	pub fn from_flag(watch: bool) -> Self {
		if watch { WatchMode::Session } else { WatchMode::None }
	}

	pub fn callback(callback: WatchCallback, handback: Option<Value>) -> Self {
		WatchMode::Callback { callback, handback }
	}
}

/// Checks a node path.
///
/// Paths are absolute, have no empty, `.` or `..` segments, no trailing slash
/// (except the root), and no NUL or control characters. A sequential create
/// may end in `/` since the server appends the counter.
pub fn validate_path(path: &str, sequential: bool) -> Result<()> {
	let invalid = || Error::Local(ErrorCode::BadArguments);

	if !path.starts_with('/') {
		return Err(invalid());
	}
	if path == "/" {
		return if sequential { Err(invalid()) } else { Ok(()) };
	}
	if path.chars().any(|c| c == '\0' || c.is_control() || matches!(c, '\u{fff0}'..='\u{ffff}' | '\u{e000}'..='\u{f8ff}')) {
		return Err(invalid());
	}

	let body = if sequential { path.strip_suffix('/').unwrap_or(path) } else { path };
	if body.ends_with('/') {
		return Err(invalid());
	}
	for segment in body[1..].split('/') {
		if segment.is_empty() || segment == "." || segment == ".." {
			return Err(invalid());
		}
	}
	Ok(())
}

impl Session {
	fn issue(&mut self, kind: OpKind, callback: Completion, watch: WatchMode, op: Operation<'_>) -> Result<RequestToken> {
		if self.closed {
			debug!(target = "zk.session", session = %self.id, op = op.name(), "request on closed session");
			return Err(Error::Local(ErrorCode::InvalidState));
		}
		let Some(connection) = self.connection.as_mut() else {
			debug!(target = "zk.session", session = %self.id, op = op.name(), "request before init");
			return Err(Error::Local(ErrorCode::InvalidState));
		};

		let token = self.registry.register(kind, callback);
		let watch = match watch {
			WatchMode::None => Watch::None,
			WatchMode::Session => Watch::Session,
			WatchMode::Callback { callback, handback } => Watch::Callback(self.registry.register_watch(callback, handback)),
		};

		if let Watch::Callback(watch) = watch {
			self.registry.bind_watch(token, watch);
		}

		let rc = connection.submit(op, token, watch);
		if !rc.is_ok() {
			self.registry.take(token);
			if let Watch::Callback(watch) = watch {
				self.registry.take_watch(watch);
			}
			warn!(target = "zk.session", session = %self.id, op = op.name(), path = ?op.path(), rc = %rc, "request rejected");
			return Err(Error::Local(rc));
		}

		debug!(target = "zk.session", session = %self.id, seq = token.seq, op = op.name(), path = ?op.path(), "request issued");
		Ok(token)
	}

	/// Creates a node with the open ACL. The callback receives the actual path
	/// (which differs from `path` for sequential nodes).
	pub fn create(&mut self, path: &str, data: &[u8], flags: u32, callback: PathCallback) -> Result<()> {
		self.create_with_acl(path, data, &[Acl::open_unsafe()], flags, callback)
	}

	pub fn create_with_acl(&mut self, path: &str, data: &[u8], acl: &[Acl], flags: u32, callback: PathCallback) -> Result<()> {
		validate_path(path, flags & create_flags::SEQUENCE != 0)?;
		let acl = codec::acl::encode(acl)?;
		let token = self.issue(
			OpKind::Create,
			Completion::Path(callback),
			WatchMode::None,
			Operation::Create {
				path,
				data,
				acl: &acl,
				flags,
			},
		)?;
		self.registry.attach(token, acl);
		Ok(())
	}

	/// Deletes a node. `version` of `-1` matches any version.
	pub fn delete(&mut self, path: &str, version: i32, callback: VoidCallback) -> Result<()> {
		validate_path(path, false)?;
		self.issue(OpKind::Delete, Completion::Void(callback), WatchMode::None, Operation::Delete { path, version })?;
		Ok(())
	}

	pub fn exists(&mut self, path: &str, watch: WatchMode, callback: StatCallback) -> Result<()> {
		validate_path(path, false)?;
		self.issue(OpKind::Exists, Completion::Stat(callback), watch, Operation::Exists { path })?;
		Ok(())
	}

	pub fn get(&mut self, path: &str, watch: WatchMode, callback: DataCallback) -> Result<()> {
		validate_path(path, false)?;
		self.issue(OpKind::Get, Completion::Data(callback), watch, Operation::Get { path })?;
		Ok(())
	}

	pub fn set(&mut self, path: &str, data: &[u8], version: i32, callback: StatCallback) -> Result<()> {
		validate_path(path, false)?;
		self.issue(OpKind::Set, Completion::Stat(callback), WatchMode::None, Operation::Set { path, data, version })?;
		Ok(())
	}

	pub fn get_children(&mut self, path: &str, watch: WatchMode, callback: ChildrenCallback) -> Result<()> {
		validate_path(path, false)?;
		self.issue(OpKind::GetChildren, Completion::Children(callback), watch, Operation::GetChildren { path })?;
		Ok(())
	}

	pub fn get_children2(&mut self, path: &str, watch: WatchMode, callback: Children2Callback) -> Result<()> {
		validate_path(path, false)?;
		self.issue(OpKind::GetChildren2, Completion::Children2(callback), watch, Operation::GetChildren2 { path })?;
		Ok(())
	}

	pub fn get_acl(&mut self, path: &str, callback: AclCallback) -> Result<()> {
		validate_path(path, false)?;
		self.issue(OpKind::GetAcl, Completion::Acl(callback), WatchMode::None, Operation::GetAcl { path })?;
		Ok(())
	}

	/// Replaces a node's ACL. The encoded list is owned by the request until
	/// its completion has run.
	pub fn set_acl(&mut self, path: &str, version: i32, acl: &[Acl], callback: VoidCallback) -> Result<()> {
		validate_path(path, false)?;
		let acl = codec::acl::encode(acl)?;
		let token = self.issue(
			OpKind::SetAcl,
			Completion::Void(callback),
			WatchMode::None,
			Operation::SetAcl {
				path,
				version,
				acl: &acl,
			},
		)?;
		self.registry.attach(token, acl);
		Ok(())
	}

	pub fn add_auth(&mut self, scheme: &str, cert: &[u8], callback: VoidCallback) -> Result<()> {
		if scheme.is_empty() || scheme.contains('\0') {
			return Err(Error::Local(ErrorCode::BadArguments));
		}
		self.issue(OpKind::AddAuth, Completion::Void(callback), WatchMode::None, Operation::AddAuth { scheme, cert })?;
		Ok(())
	}

	/// Flushes the leader channel for `path`; completes once the server
	/// serving this session has caught up.
	pub fn sync(&mut self, path: &str, callback: VoidCallback) -> Result<()> {
		validate_path(path, false)?;
		self.issue(OpKind::Sync, Completion::Void(callback), WatchMode::None, Operation::Sync { path })?;
		Ok(())
	}
}
