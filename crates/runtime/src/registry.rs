//! Pending completions and watch registrations for one session.
//!
//! Every issued request gets a record keyed by a per-session sequence number.
//! The record is removed when the result arrives, so a callback can fire at
//! most once; [`CallbackRegistry::drain_completions`] on close makes it fire
//! at least once.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use serde_json::Value;
use tracing::{debug, trace};
use zk_protocol::{Acl, ErrorCode, Stat, Status, WatchedEvent};

use crate::client::Reply;
use crate::codec;
use crate::native::{AclVector, RawStat};
use crate::table::SessionId;

pub type VoidCallback = Box<dyn FnOnce(Status)>;
pub type PathCallback = Box<dyn FnOnce(Status, Option<String>)>;
pub type StatCallback = Box<dyn FnOnce(Status, Option<Stat>)>;
pub type DataCallback = Box<dyn FnOnce(Status, Option<Stat>, Option<Vec<u8>>)>;
pub type ChildrenCallback = Box<dyn FnOnce(Status, Option<Vec<String>>)>;
pub type Children2Callback = Box<dyn FnOnce(Status, Option<Vec<String>>, Option<Stat>)>;
pub type AclCallback = Box<dyn FnOnce(Status, Option<Vec<Acl>>, Option<Stat>)>;
pub type WatchCallback = Box<dyn FnOnce(WatchedEvent, Option<Value>)>;

/// A callback ready to run, with its arguments already marshalled.
pub type Invocation = Box<dyn FnOnce()>;

/// Identifies one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken {
	pub session: SessionId,
	pub seq: u64,
}

/// Identifies one per-call watcher registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken {
	pub session: SessionId,
	pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
	Create,
	Delete,
	Exists,
	Get,
	Set,
	GetChildren,
	GetChildren2,
	GetAcl,
	SetAcl,
	AddAuth,
	Sync,
}

/// Caller's completion callback, tagged by result shape.
pub enum Completion {
	Void(VoidCallback),
	Path(PathCallback),
	Stat(StatCallback),
	Data(DataCallback),
	Children(ChildrenCallback),
	Children2(Children2Callback),
	Acl(AclCallback),
}

impl fmt::Debug for Completion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let shape = match self {
			Completion::Void(_) => "Void",
			Completion::Path(_) => "Path",
			Completion::Stat(_) => "Stat",
			Completion::Data(_) => "Data",
			Completion::Children(_) => "Children",
			Completion::Children2(_) => "Children2",
			Completion::Acl(_) => "Acl",
		};
		write!(f, "Completion::{shape}")
	}
}

/// Record for one in-flight request.
#[derive(Debug)]
pub struct PendingCompletion {
	pub kind: OpKind,
	pub callback: Completion,
	/// Request payload owned for the lifetime of the request (the encoded ACL
	/// of `create`/`set_acl`). Released after the callback runs.
	pub aux: Option<AclVector>,
	/// Per-call watcher issued with the request.
	pub watch: Option<WatchToken>,
}

impl PendingCompletion {
	/// Whether the server left a watch behind when the request finished with `rc`.
	///
	/// `exists` watches a missing node for its creation; the other reads only
	/// watch a node they found.
	pub fn installs_watch(&self, rc: ErrorCode) -> bool {
		match self.kind {
			OpKind::Exists => matches!(rc, ErrorCode::Ok | ErrorCode::NoNode),
			OpKind::Get | OpKind::GetChildren | OpKind::GetChildren2 => rc.is_ok(),
			_ => false,
		}
	}

	/// Marshals `reply` for the caller and packages the callback.
	///
	/// `owner` is the receiving session's id, used for `created_in_this_session`.
	pub fn complete(self, rc: ErrorCode, reply: Reply, owner: i64) -> Invocation {
		let status = Status::new(rc);
		let aux = self.aux;
		let decode_stat = |raw: Option<RawStat>| raw.map(|raw| codec::stat::decode(&raw, owner));

		match self.callback {
			Completion::Void(callback) => Box::new(move || {
				callback(status);
				drop(aux);
			}),
			Completion::Path(callback) => {
				let path = match reply {
					Reply::Path(path) => path,
					_ => None,
				};
				Box::new(move || {
					callback(status, path);
					drop(aux);
				})
			}
			Completion::Stat(callback) => {
				let stat = match reply {
					Reply::Stat(raw) if rc.is_ok() => decode_stat(raw),
					_ => None,
				};
				Box::new(move || {
					callback(status, stat);
					drop(aux);
				})
			}
			Completion::Data(callback) => {
				let (stat, data) = match reply {
					Reply::Data { stat: raw, data } => (decode_stat(raw), data),
					_ => (None, None),
				};
				Box::new(move || {
					callback(status, stat, data);
					drop(aux);
				})
			}
			Completion::Children(callback) => {
				let children = match reply {
					Reply::Children(children) => children,
					_ => None,
				};
				Box::new(move || {
					callback(status, children);
					drop(aux);
				})
			}
			Completion::Children2(callback) => {
				let (children, stat) = match reply {
					Reply::Children2 { children, stat: raw } => (children, decode_stat(raw)),
					_ => (None, None),
				};
				Box::new(move || {
					callback(status, children, stat);
					drop(aux);
				})
			}
			Completion::Acl(callback) => {
				let (acl, stat) = match reply {
					Reply::Acl { acl, stat: raw } => (acl.as_ref().map(codec::acl::decode), decode_stat(raw)),
					_ => (None, None),
				};
				Box::new(move || {
					callback(status, acl, stat);
					drop(aux);
				})
			}
		}
	}
}

/// A per-call watcher and its caller-supplied context.
pub struct WatchRegistration {
	pub callback: WatchCallback,
	pub handback: Option<Value>,
}

impl WatchRegistration {
	pub fn fire(self, event: WatchedEvent) -> Invocation {
		let WatchRegistration { callback, handback } = self;
		Box::new(move || callback(event, handback))
	}
}

impl fmt::Debug for WatchRegistration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WatchRegistration").field("handback", &self.handback).finish_non_exhaustive()
	}
}

#[derive(Debug)]
pub struct CallbackRegistry {
	session: SessionId,
	next_seq: u64,
	completions: BTreeMap<u64, PendingCompletion>,
	watches: HashMap<u64, WatchRegistration>,
}

impl CallbackRegistry {
	pub fn new(session: SessionId) -> Self {
		Self {
			session,
			next_seq: 0,
			completions: BTreeMap::new(),
			watches: HashMap::new(),
		}
	}

	fn next(&mut self) -> u64 {
		let seq = self.next_seq;
		self.next_seq += 1;
		seq
	}

	pub fn register(&mut self, kind: OpKind, callback: Completion) -> RequestToken {
		let seq = self.next();
		self.completions.insert(
			seq,
			PendingCompletion {
				kind,
				callback,
				aux: None,
				watch: None,
			},
		);
		trace!(target = "zk.registry", session = %self.session, seq, ?kind, "completion registered");
		RequestToken {
			session: self.session,
			seq,
		}
	}

	/// Hands request-scoped payload to the record for `token`.
	pub fn attach(&mut self, token: RequestToken, aux: AclVector) {
		if let Some(pending) = self.owned_mut(token) {
			pending.aux = Some(aux);
		}
	}

	/// Links a watcher registration to the request that carries it.
	pub fn bind_watch(&mut self, token: RequestToken, watch: WatchToken) {
		if let Some(pending) = self.owned_mut(token) {
			pending.watch = Some(watch);
		}
	}

	pub fn register_watch(&mut self, callback: WatchCallback, handback: Option<Value>) -> WatchToken {
		let seq = self.next();
		self.watches.insert(seq, WatchRegistration { callback, handback });
		trace!(target = "zk.registry", session = %self.session, seq, "watcher registered");
		WatchToken {
			session: self.session,
			seq,
		}
	}

	/// Removes the record for `token`. Returns `None` for unknown or foreign tokens.
	pub fn take(&mut self, token: RequestToken) -> Option<PendingCompletion> {
		if token.session != self.session {
			return None;
		}
		self.completions.remove(&token.seq)
	}

	pub fn take_watch(&mut self, token: WatchToken) -> Option<WatchRegistration> {
		if token.session != self.session {
			return None;
		}
		self.watches.remove(&token.seq)
	}

	fn owned_mut(&mut self, token: RequestToken) -> Option<&mut PendingCompletion> {
		if token.session != self.session {
			return None;
		}
		self.completions.get_mut(&token.seq)
	}

	/// Removes every pending completion, oldest first.
	pub fn drain_completions(&mut self) -> Vec<PendingCompletion> {
		std::mem::take(&mut self.completions).into_values().collect()
	}

	/// Drops every watcher registration; they can no longer fire.
	pub fn clear_watches(&mut self) -> usize {
		let count = self.watches.len();
		self.watches.clear();
		if count > 0 {
			debug!(target = "zk.registry", session = %self.session, count, "dropped watcher registrations");
		}
		count
	}

	pub fn pending_completions(&self) -> usize {
		self.completions.len()
	}

	pub fn pending_watches(&self) -> usize {
		self.watches.len()
	}

	pub fn is_empty(&self) -> bool {
		self.completions.is_empty() && self.watches.is_empty()
	}
}

/// Callbacks that are ready to run once no session is borrowed.
#[derive(Default)]
pub struct Dispatch {
	queue: VecDeque<Invocation>,
}

impl Dispatch {
	pub fn push(&mut self, invocation: Invocation) {
		self.queue.push_back(invocation);
	}

	pub fn append(&mut self, other: &mut Dispatch) {
		self.queue.append(&mut other.queue);
	}

	pub fn len(&self) -> usize {
		self.queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}

	/// Runs every queued callback in order.
	pub fn run(self) {
		for invocation in self.queue {
			invocation();
		}
	}
}

impl fmt::Debug for Dispatch {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatch").field("len", &self.queue.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use zk_protocol::{EventType, perms};

	use super::*;

	fn registry() -> CallbackRegistry {
		CallbackRegistry::new(SessionId::new(1))
	}

	#[test]
	fn completion_is_taken_exactly_once() {
		let mut registry = registry();
		let seen = Rc::new(RefCell::new(Vec::new()));
		let sink = Rc::clone(&seen);
		let token = registry.register(OpKind::Sync, Completion::Void(Box::new(move |status| sink.borrow_mut().push(status.rc))));

		let pending = registry.take(token).unwrap();
		assert!(registry.take(token).is_none());
		pending.complete(ErrorCode::Ok, Reply::Void, 0)();

		assert_eq!(*seen.borrow(), vec![ErrorCode::Ok]);
		assert!(registry.is_empty());
	}

	#[test]
	fn foreign_tokens_are_ignored() {
		let mut registry = registry();
		let token = registry.register(OpKind::Sync, Completion::Void(Box::new(|_| {})));
		let foreign = RequestToken {
			session: SessionId::new(2),
			seq: token.seq,
		};
		assert!(registry.take(foreign).is_none());
		assert_eq!(registry.pending_completions(), 1);
	}

	#[test]
	fn drain_is_oldest_first() {
		let mut registry = registry();
		registry.register(OpKind::Get, Completion::Void(Box::new(|_| {})));
		registry.register(OpKind::Set, Completion::Void(Box::new(|_| {})));
		registry.register(OpKind::Delete, Completion::Void(Box::new(|_| {})));

		let kinds: Vec<_> = registry.drain_completions().into_iter().map(|pending| pending.kind).collect();
		assert_eq!(kinds, vec![OpKind::Get, OpKind::Set, OpKind::Delete]);
		assert_eq!(registry.pending_completions(), 0);
	}

	#[test]
	fn stat_is_withheld_on_failure() {
		let seen = Rc::new(RefCell::new(None));
		let sink = Rc::clone(&seen);
		let pending = PendingCompletion {
			kind: OpKind::Exists,
			callback: Completion::Stat(Box::new(move |status, stat| *sink.borrow_mut() = Some((status.rc, stat.is_some())))),
			aux: None,
			watch: None,
		};
		pending.complete(ErrorCode::NoNode, Reply::Stat(Some(RawStat::default())), 0)();
		assert_eq!(*seen.borrow(), Some((ErrorCode::NoNode, false)));
	}

	#[test]
	fn acl_reply_is_decoded() {
		let seen = Rc::new(RefCell::new(None));
		let sink = Rc::clone(&seen);
		let pending = PendingCompletion {
			kind: OpKind::GetAcl,
			callback: Completion::Acl(Box::new(move |status, acl, stat| *sink.borrow_mut() = Some((status, acl, stat)))),
			aux: None,
			watch: None,
		};
		let vector = codec::acl::encode(&[Acl::read_unsafe()]).unwrap();
		pending.complete(
			ErrorCode::Ok,
			Reply::Acl {
				acl: Some(vector),
				stat: Some(RawStat::default()),
			},
			0,
		)();

		let (status, acl, stat) = seen.borrow_mut().take().unwrap();
		assert!(status.is_ok());
		assert_eq!(acl.unwrap(), vec![Acl::new("world", "anyone", perms::READ)]);
		assert!(stat.is_some());
	}

	#[test]
	fn mismatched_reply_shape_yields_nulls() {
		let seen = Rc::new(RefCell::new(None));
		let sink = Rc::clone(&seen);
		let pending = PendingCompletion {
			kind: OpKind::Get,
			callback: Completion::Data(Box::new(move |status, stat, data| *sink.borrow_mut() = Some((status.rc, stat, data)))),
			aux: None,
			watch: None,
		};
		pending.complete(ErrorCode::Closing, Reply::Void, 0)();
		assert_eq!(*seen.borrow(), Some((ErrorCode::Closing, None, None)));
	}

	#[test]
	fn watch_installation_follows_result() {
		let mut registry = registry();
		let exists = registry.register(OpKind::Exists, Completion::Stat(Box::new(|_, _| {})));
		let get = registry.register(OpKind::Get, Completion::Data(Box::new(|_, _, _| {})));
		let watch = registry.register_watch(Box::new(|_, _| {}), None);
		registry.bind_watch(get, watch);

		let exists = registry.take(exists).unwrap();
		assert!(exists.installs_watch(ErrorCode::NoNode));
		assert!(!exists.installs_watch(ErrorCode::ConnectionLoss));

		let get = registry.take(get).unwrap();
		assert_eq!(get.watch, Some(watch));
		assert!(get.installs_watch(ErrorCode::Ok));
		assert!(!get.installs_watch(ErrorCode::NoNode));
	}

	#[test]
	fn aux_outlives_callback() {
		let mut registry = registry();
		let token = registry.register(OpKind::SetAcl, Completion::Void(Box::new(|_| {})));
		registry.attach(token, codec::acl::encode(&[Acl::open_unsafe()]).unwrap());
		let pending = registry.take(token).unwrap();
		assert_eq!(pending.aux.as_ref().map(AclVector::len), Some(1));
		pending.complete(ErrorCode::Ok, Reply::Void, 0)();
	}

	#[test]
	fn watch_fires_with_handback() {
		let mut registry = registry();
		let seen = Rc::new(RefCell::new(None));
		let sink = Rc::clone(&seen);
		let token = registry.register_watch(
			Box::new(move |event, handback| *sink.borrow_mut() = Some((event, handback))),
			Some(serde_json::json!({ "tag": 7 })),
		);

		let registration = registry.take_watch(token).unwrap();
		assert!(registry.take_watch(token).is_none());
		registration.fire(WatchedEvent::node(EventType::Changed, "/a"))();

		let (event, handback) = seen.borrow_mut().take().unwrap();
		assert_eq!(event.event_type(), Some(EventType::Changed));
		assert_eq!(handback.unwrap()["tag"], 7);
	}

	#[test]
	fn dispatch_runs_in_order() {
		let order = Rc::new(RefCell::new(Vec::new()));
		let mut dispatch = Dispatch::default();
		for n in 0..3 {
			let order = Rc::clone(&order);
			dispatch.push(Box::new(move || order.borrow_mut().push(n)));
		}
		assert_eq!(dispatch.len(), 3);
		dispatch.run();
		assert_eq!(*order.borrow(), vec![0, 1, 2]);
	}
}
