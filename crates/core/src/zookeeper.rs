//! The public session handle.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use zk_protocol::{Acl, ErrorCode, LifecycleEvent, SessionState, Stat, Status, WatchedEvent, create_flags};
use zk_runtime::ops::{WatchMode, validate_path};
use zk_runtime::{CoordinationClient, Error, Reactor, Readiness, Result, Session, SessionConfig, SessionId, Sessions, VoidCallback};

/// Handle to one session.
///
/// Clones refer to the same session. Methods borrow the session only for the
/// duration of the call, so they may be used from inside any callback.
#[derive(Debug, Clone)]
pub struct ZooKeeper {
	sessions: Sessions,
	id: SessionId,
}

impl ZooKeeper {
	/// Creates an uninitialized session in a fresh arena.
	pub fn new(client: impl CoordinationClient + 'static, reactor: impl Reactor + 'static) -> Self {
		Self::with_sessions(&Sessions::new(), client, reactor)
	}

	/// Creates an uninitialized session in an existing arena.
	pub fn with_sessions(sessions: &Sessions, client: impl CoordinationClient + 'static, reactor: impl Reactor + 'static) -> Self {
		let id = sessions.insert(Box::new(client), Box::new(reactor));
		Self {
			sessions: sessions.clone(),
			id,
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn sessions(&self) -> &Sessions {
		&self.sessions
	}

	fn with<R>(&self, f: impl FnOnce(&mut Session) -> Result<R>) -> Result<R> {
		self.sessions.with(self.id, f)?
	}

	fn inspect<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
		self.sessions.with(self.id, f)
	}

	/// Opens the connection. Calling it again replaces the connection; pending
	/// completions of the old one fire with `Closing`.
	pub fn init(&self, config: &SessionConfig) -> Result<()> {
		self.with(|session| session.init(config))
	}

	/// Same as [`ZooKeeper::init`], with the configuration as a JSON object.
	pub fn init_json(&self, config: Value) -> Result<()> {
		let config = SessionConfig::from_json(config)?;
		self.init(&config)
	}

	/// Closes the session. Safe to call more than once.
	pub fn close(&self) -> Result<()> {
		self.inspect(|session| session.close(ErrorCode::Ok.code()))
	}

	/// Lifecycle events of this session: connecting, connect, close, and
	/// notifications for boolean watches.
	pub fn subscribe(&self) -> Result<UnboundedReceiver<LifecycleEvent>> {
		self.inspect(|session| session.subscribe())
	}

	pub fn create(&self, path: &str, data: impl AsRef<[u8]>, flags: u32, callback: impl FnOnce(Status, Option<String>) + 'static) -> Result<()> {
		self.with(|session| session.create(path, data.as_ref(), flags, Box::new(callback)))
	}

	pub fn create_with_acl(
		&self,
		path: &str,
		data: impl AsRef<[u8]>,
		acl: &[Acl],
		flags: u32,
		callback: impl FnOnce(Status, Option<String>) + 'static,
	) -> Result<()> {
		self.with(|session| session.create_with_acl(path, data.as_ref(), acl, flags, Box::new(callback)))
	}

	pub fn delete(&self, path: &str, version: i32, callback: impl FnOnce(Status) + 'static) -> Result<()> {
		self.with(|session| session.delete(path, version, Box::new(callback)))
	}

	pub fn exists(&self, path: &str, watch: bool, callback: impl FnOnce(Status, Option<Stat>) + 'static) -> Result<()> {
		self.with(|session| session.exists(path, WatchMode::from_flag(watch), Box::new(callback)))
	}

	pub fn w_exists(
		&self,
		path: &str,
		watcher: impl FnOnce(WatchedEvent, Option<Value>) + 'static,
		handback: Option<Value>,
		callback: impl FnOnce(Status, Option<Stat>) + 'static,
	) -> Result<()> {
		let watch = WatchMode::callback(Box::new(watcher), handback);
		self.with(|session| session.exists(path, watch, Box::new(callback)))
	}

	pub fn get(&self, path: &str, watch: bool, callback: impl FnOnce(Status, Option<Stat>, Option<Vec<u8>>) + 'static) -> Result<()> {
		self.with(|session| session.get(path, WatchMode::from_flag(watch), Box::new(callback)))
	}

	pub fn w_get(
		&self,
		path: &str,
		watcher: impl FnOnce(WatchedEvent, Option<Value>) + 'static,
		handback: Option<Value>,
		callback: impl FnOnce(Status, Option<Stat>, Option<Vec<u8>>) + 'static,
	) -> Result<()> {
		let watch = WatchMode::callback(Box::new(watcher), handback);
		self.with(|session| session.get(path, watch, Box::new(callback)))
	}

	pub fn set(&self, path: &str, data: impl AsRef<[u8]>, version: i32, callback: impl FnOnce(Status, Option<Stat>) + 'static) -> Result<()> {
		self.with(|session| session.set(path, data.as_ref(), version, Box::new(callback)))
	}

	pub fn get_children(&self, path: &str, watch: bool, callback: impl FnOnce(Status, Option<Vec<String>>) + 'static) -> Result<()> {
		self.with(|session| session.get_children(path, WatchMode::from_flag(watch), Box::new(callback)))
	}

	pub fn w_get_children(
		&self,
		path: &str,
		watcher: impl FnOnce(WatchedEvent, Option<Value>) + 'static,
		handback: Option<Value>,
		callback: impl FnOnce(Status, Option<Vec<String>>) + 'static,
	) -> Result<()> {
		let watch = WatchMode::callback(Box::new(watcher), handback);
		self.with(|session| session.get_children(path, watch, Box::new(callback)))
	}

	pub fn get_children2(
		&self,
		path: &str,
		watch: bool,
		callback: impl FnOnce(Status, Option<Vec<String>>, Option<Stat>) + 'static,
	) -> Result<()> {
		self.with(|session| session.get_children2(path, WatchMode::from_flag(watch), Box::new(callback)))
	}

	pub fn w_get_children2(
		&self,
		path: &str,
		watcher: impl FnOnce(WatchedEvent, Option<Value>) + 'static,
		handback: Option<Value>,
		callback: impl FnOnce(Status, Option<Vec<String>>, Option<Stat>) + 'static,
	) -> Result<()> {
		let watch = WatchMode::callback(Box::new(watcher), handback);
		self.with(|session| session.get_children2(path, watch, Box::new(callback)))
	}

	pub fn get_acl(&self, path: &str, callback: impl FnOnce(Status, Option<Vec<Acl>>, Option<Stat>) + 'static) -> Result<()> {
		self.with(|session| session.get_acl(path, Box::new(callback)))
	}

	pub fn set_acl(&self, path: &str, version: i32, acl: &[Acl], callback: impl FnOnce(Status) + 'static) -> Result<()> {
		self.with(|session| session.set_acl(path, version, acl, Box::new(callback)))
	}

	pub fn add_auth(&self, scheme: &str, cert: impl AsRef<[u8]>, callback: impl FnOnce(Status) + 'static) -> Result<()> {
		self.with(|session| session.add_auth(scheme, cert.as_ref(), Box::new(callback)))
	}

	pub fn sync(&self, path: &str, callback: impl FnOnce(Status) + 'static) -> Result<()> {
		self.with(|session| session.sync(path, Box::new(callback)))
	}

	/// Creates `path` and every missing ancestor as empty persistent nodes.
	///
	/// Nodes that already exist are fine; the callback gets `Ok` once the whole
	/// chain exists, or the first other failure.
	pub fn mkdirp(&self, path: &str, callback: impl FnOnce(Status) + 'static) -> Result<()> {
		validate_path(path, false)?;
		let chain = ancestors(path);
		if chain.is_empty() {
			return self.exists(path, false, move |status, _| callback(status));
		}
		mkdirp_step(self, chain, Chained::new(callback))
	}

	/// Numeric connection state; `0` before init and after close.
	pub fn state(&self) -> Result<i32> {
		self.inspect(|session| session.state())
	}

	pub fn session_state(&self) -> Result<SessionState> {
		self.inspect(|session| session.session_state())
	}

	/// Session id as hex; `"0"` until the server assigns one.
	pub fn client_id(&self) -> Result<String> {
		self.inspect(|session| session.client_id())
	}

	/// Session password as 32 uppercase hex characters.
	pub fn client_password(&self) -> Result<String> {
		self.inspect(|session| session.client_password())
	}

	/// Negotiated session timeout in milliseconds, or `-1` without a connection.
	pub fn timeout(&self) -> Result<i32> {
		self.inspect(|session| session.timeout())
	}

	pub fn is_unrecoverable(&self) -> Result<bool> {
		self.inspect(|session| session.is_unrecoverable())
	}

	/// Reactor entry point: the polled descriptor became ready.
	pub fn on_io_ready(&self, readiness: io::Result<Readiness>) -> Result<()> {
		self.sessions.on_io_ready(self.id, readiness)
	}

	/// Reactor entry point: the keep-alive timer fired.
	pub fn on_timer_fire(&self) -> Result<()> {
		self.sessions.on_timer_fire(self.id)
	}

	/// Re-queries interest and re-arms the reactor.
	pub fn yield_interest(&self) -> Result<()> {
		self.sessions.yield_interest(self.id)
	}
}

/// `/a/b/c` -> `/a`, `/a/b`, `/a/b/c`.
fn ancestors(path: &str) -> VecDeque<String> {
	let mut prefix = String::with_capacity(path.len());
	path.split('/')
		.filter(|segment| !segment.is_empty())
		.map(|segment| {
			prefix.push('/');
			prefix.push_str(segment);
			prefix.clone()
		})
		.collect()
}

/// Status callback shared by the steps of a chained operation. The first
/// step to finish the chain invokes it; later calls do nothing.
#[derive(Clone)]
pub(crate) struct Chained(Rc<RefCell<Option<VoidCallback>>>);

impl Chained {
	pub(crate) fn new(callback: impl FnOnce(Status) + 'static) -> Self {
		let callback: VoidCallback = Box::new(callback);
		Self(Rc::new(RefCell::new(Some(callback))))
	}

	pub(crate) fn finish(&self, status: Status) {
		let callback = self.0.borrow_mut().take();
		if let Some(callback) = callback {
			callback(status);
		}
	}

	/// Finishes with the status of a step that could not be issued.
	pub(crate) fn fail(&self, err: &Error) {
		self.finish(Status::new(err.code().unwrap_or(ErrorCode::InvalidState)));
	}
}

fn mkdirp_step(zk: &ZooKeeper, mut chain: VecDeque<String>, done: Chained) -> Result<()> {
	let Some(path) = chain.pop_front() else {
		return Ok(());
	};
	let next = zk.clone();
	let target = path.clone();
	zk.create(&target, b"", create_flags::PERSISTENT, move |status, _| match status.rc {
		ErrorCode::Ok | ErrorCode::NodeExists if !chain.is_empty() => {
			debug!(target = "zk.session", session = %next.id, path = %path, rc = %status.rc, "mkdirp step done");
			if let Err(err) = mkdirp_step(&next, chain, done.clone()) {
				done.fail(&err);
			}
		}
		ErrorCode::NodeExists => done.finish(Status::new(ErrorCode::Ok)),
		_ => done.finish(status),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ancestors_of_nested_path() {
		assert_eq!(ancestors("/a/b/c"), ["/a", "/a/b", "/a/b/c"]);
		assert_eq!(ancestors("/a"), ["/a"]);
		assert!(ancestors("/").is_empty());
	}
}
