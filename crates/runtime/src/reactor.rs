//! Host event-loop surface used by a session.
//!
//! A session owns exactly one reactor registration: at most one watched
//! descriptor and one repeating keep-alive timer. Readiness and timer expiry
//! come back through [`Sessions::on_io_ready`](crate::Sessions::on_io_ready)
//! and [`Sessions::on_timer_fire`](crate::Sessions::on_timer_fire).

use std::os::fd::RawFd;
use std::time::{Duration, Instant};

pub trait Reactor {
	/// Starts (or replaces) the descriptor watch.
	fn register_fd(&mut self, fd: RawFd, readable: bool, writable: bool);

	fn unregister_fd(&mut self, fd: RawFd);

	/// Arms the timer to fire after `delay` and then every `interval`.
	fn start_timer(&mut self, delay: Duration, interval: Duration);

	fn stop_timer(&mut self);

	/// Current time on the reactor's clock.
	fn now(&self) -> Instant;
}

/// Keep-alive timer bookkeeping.
///
/// Created on first init and kept across re-initialization; only its armed
/// state changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepAlive {
	pub armed: bool,
	pub delay: Duration,
}

impl KeepAlive {
	pub fn arm(&mut self, reactor: &mut dyn Reactor, delay: Duration) {
		reactor.start_timer(delay, delay);
		self.armed = true;
		self.delay = delay;
	}

	pub fn disarm(&mut self, reactor: &mut dyn Reactor) {
		if self.armed {
			reactor.stop_timer();
			self.armed = false;
		}
	}
}
