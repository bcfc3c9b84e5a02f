//! Arena of sessions driven from one host thread.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::client::CoordinationClient;
use crate::error::{Error, Result};
use crate::reactor::Reactor;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
	pub fn new(raw: u64) -> Self {
		SessionId(raw)
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "session#{}", self.0)
	}
}

#[derive(Default)]
struct SessionTable {
	next_id: u64,
	sessions: BTreeMap<SessionId, Session>,
}

/// Shared handle to every session owned by a host thread.
///
/// Sessions are only borrowed for the duration of one step. Callbacks queued
/// during that step run after the borrow is released, so they may call back
/// into any session, including their own.
#[derive(Clone, Default)]
pub struct Sessions {
	table: Rc<RefCell<SessionTable>>,
}

impl Sessions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an uninitialized session.
	pub fn insert(&self, client: Box<dyn CoordinationClient>, reactor: Box<dyn Reactor>) -> SessionId {
		let mut table = self.table.borrow_mut();
		table.next_id += 1;
		let id = SessionId(table.next_id);
		table.sessions.insert(id, Session::new(id, client, reactor));
		debug!(target = "zk.session", session = %id, "session created");
		id
	}

	/// Runs `f` against one session, then runs whatever callbacks it queued.
	pub fn with<R>(&self, id: SessionId, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
		let (result, ready) = {
			let mut table = self.table.borrow_mut();
			let session = table.sessions.get_mut(&id).ok_or(Error::UnknownSession(id))?;
			let result = f(session);
			(result, session.take_ready())
		};
		ready.run();
		Ok(result)
	}

	pub fn contains(&self, id: SessionId) -> bool {
		self.table.borrow().sessions.contains_key(&id)
	}

	pub fn ids(&self) -> Vec<SessionId> {
		self.table.borrow().sessions.keys().copied().collect()
	}

	pub fn len(&self) -> usize {
		self.table.borrow().sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.table.borrow().sessions.is_empty()
	}

	/// Removes closed sessions that hold no references. Returns how many were removed.
	pub fn reap(&self) -> usize {
		let mut table = self.table.borrow_mut();
		let before = table.sessions.len();
		table.sessions.retain(|id, session| {
			let keep = !session.is_reclaimable();
			if !keep {
				debug!(target = "zk.session", session = %id, "session reaped");
			}
			keep
		});
		before - table.sessions.len()
	}
}

impl fmt::Debug for Sessions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.table.try_borrow() {
			Ok(table) => f.debug_struct("Sessions").field("ids", &table.sessions.keys().collect::<Vec<_>>()).finish(),
			Err(_) => f.debug_struct("Sessions").finish_non_exhaustive(),
		}
	}
}
