//! Event-loop bridge: keeps the reactor registration in step with what the
//! client is waiting on.
//!
//! After every step the session re-queries the client's interest and re-arms
//! the descriptor watch and the keep-alive timer. The timer guarantees the
//! client runs at least once per reported time budget even with no I/O.

use std::io;
use std::time::Duration;

use tracing::{debug, error, trace};
use zk_protocol::{ErrorCode, Interest};

use crate::client::Deliveries;
use crate::error::Result;
use crate::reactor::KeepAlive;
use crate::session::Session;
use crate::table::{SessionId, Sessions};

/// Conditions reported by the reactor for the session's descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
	pub readable: bool,
	pub writable: bool,
}

impl Readiness {
	pub const READABLE: Readiness = Readiness {
		readable: true,
		writable: false,
	};
	pub const WRITABLE: Readiness = Readiness {
		readable: false,
		writable: true,
	};
	pub const BOTH: Readiness = Readiness {
		readable: true,
		writable: true,
	};

	pub fn interest(self) -> Interest {
		Interest::from_flags(self.readable, self.writable)
	}
}

impl Session {
	/// Re-queries the client's interest and re-arms the reactor.
	///
	/// No-op once the session is closed. When the client has no descriptor
	/// yet, nothing is registered and no timer is started.
	pub fn yield_interest(&mut self) {
		if self.closed {
			return;
		}
		let Some(connection) = self.connection.as_mut() else {
			return;
		};

		self.last_activity = self.reactor.now();
		let query = connection.interest();

		if let Some(fd) = self.polling.take() {
			self.reactor.unregister_fd(fd);
		}

		let query = match query {
			Ok(query) => query,
			Err(rc) => {
				error!(target = "zk.bridge", session = %self.id, rc = %rc, "interest query failed");
				return;
			}
		};

		self.interest = query.interest;
		self.next_timeout = query.timeout;
		self.fd = query.fd;
		let Some(fd) = query.fd else {
			trace!(target = "zk.bridge", session = %self.id, "no descriptor yet");
			return;
		};

		self.reactor.register_fd(fd, query.interest.readable(), query.interest.writable());
		self.polling = Some(fd);
		self.keep_alive
			.get_or_insert_with(KeepAlive::default)
			.arm(self.reactor.as_mut(), query.timeout);

		trace!(
			target = "zk.bridge",
			session = %self.id,
			fd,
			readable = query.interest.readable(),
			writable = query.interest.writable(),
			timeout_ms = query.timeout.as_millis() as u64,
			"interest armed"
		);
	}

	/// Feeds reactor readiness to the client's processing step.
	///
	/// A reactor error is treated as both readable and writable so the client
	/// discovers the failure itself. Callbacks produced by the step are queued;
	/// the caller runs them and then calls [`Session::yield_interest`].
	pub fn process_ready(&mut self, readiness: io::Result<Readiness>) {
		if self.closed {
			return;
		}
		let events = match readiness {
			Ok(readiness) => readiness.interest(),
			Err(err) => {
				debug!(target = "zk.bridge", session = %self.id, error = %err, "reactor reported an error, processing both directions");
				Interest::BOTH
			}
		};
		let Some(connection) = self.connection.as_mut() else {
			return;
		};

		let mut deliveries = Deliveries::default();
		let rc = connection.process(events, &mut deliveries);
		match rc {
			ErrorCode::Ok => {}
			ErrorCode::Nothing => trace!(target = "zk.bridge", session = %self.id, "nothing to process"),
			rc => error!(target = "zk.bridge", session = %self.id, rc = %rc, "process failed"),
		}
		self.deliver(deliveries);
	}

	/// Runs one step for reactor readiness: process, then re-arm.
	pub fn on_io_ready(&mut self, readiness: io::Result<Readiness>) {
		self.process_ready(readiness);
		self.yield_interest();
	}

	/// Handles a keep-alive timer expiry.
	///
	/// If the time budget from the last interest query has elapsed since the
	/// last re-arm, re-query and re-arm. Otherwise re-arm the timer for the
	/// remainder plus one millisecond.
	pub fn on_timer_fire(&mut self) {
		if self.closed || self.connection.is_none() {
			return;
		}
		let now = self.reactor.now();
		let elapsed = now.saturating_duration_since(self.last_activity).as_millis() as u64;
		let budget = self.next_timeout.as_millis() as u64;

		if elapsed >= budget {
			trace!(target = "zk.bridge", session = %self.id, elapsed_ms = elapsed, "time budget spent");
			self.yield_interest();
			return;
		}

		let delay = Duration::from_millis(budget - elapsed + 1);
		self.keep_alive.get_or_insert_with(KeepAlive::default).arm(self.reactor.as_mut(), delay);
		trace!(target = "zk.bridge", session = %self.id, delay_ms = budget - elapsed + 1, "keep-alive re-armed");
	}
}

impl Sessions {
	/// Host entry point for descriptor readiness.
	///
	/// Callbacks produced by processing run before interest is re-queried, so
	/// requests they issue are reflected in the new registration.
	pub fn on_io_ready(&self, id: SessionId, readiness: io::Result<Readiness>) -> Result<()> {
		self.with(id, |session| session.process_ready(readiness))?;
		self.with(id, Session::yield_interest)
	}

	/// Host entry point for keep-alive timer expiry.
	pub fn on_timer_fire(&self, id: SessionId) -> Result<()> {
		self.with(id, Session::on_timer_fire)
	}

	pub fn yield_interest(&self, id: SessionId) -> Result<()> {
		self.with(id, Session::yield_interest)
	}
}
