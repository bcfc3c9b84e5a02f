//! Tokio host for a session: descriptor readiness via `AsyncFd`, keep-alive
//! via `sleep_until`.
//!
//! [`TokioReactor`] only records what the session asked for; [`drive`] turns
//! that registration into readiness and timer events and feeds them back
//! through [`Sessions`]. Run it on a current-thread runtime (or inside a
//! `LocalSet`), since sessions are not `Send`.
//!
//! ```ignore
//! let reactor = TokioReactor::new();
//! let id = sessions.insert(Box::new(client), Box::new(reactor.clone()));
//! sessions.with(id, |s| s.init(&config))??;
//! drive(&sessions, id, &reactor).await?;
//! ```

use std::cell::RefCell;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

use tokio::io::Interest as IoInterest;
use tokio::io::unix::AsyncFd;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace, warn};

use crate::bridge::Readiness;
use crate::error::{Error, Result};
use crate::reactor::Reactor;
use crate::table::{SessionId, Sessions};

/// How long the driver waits before re-querying a session that has neither a
/// descriptor nor a timer armed.
const IDLE_REQUERY: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct Registration {
	fd: Option<(RawFd, bool, bool)>,
	timer: Option<Timer>,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
	deadline: Instant,
	interval: Duration,
}

/// Reactor handle backed by the tokio runtime. Clones share registration.
#[derive(Debug, Clone, Default)]
pub struct TokioReactor {
	registration: Rc<RefCell<Registration>>,
}

impl TokioReactor {
	pub fn new() -> Self {
		Self::default()
	}

	fn snapshot(&self) -> (Option<(RawFd, bool, bool)>, Option<Timer>) {
		let registration = self.registration.borrow();
		(registration.fd, registration.timer)
	}

	/// Moves a fired timer to its next period.
	fn reschedule(&self) {
		if let Some(timer) = self.registration.borrow_mut().timer.as_mut() {
			timer.deadline = Instant::now() + timer.interval;
		}
	}
}

impl Reactor for TokioReactor {
	fn register_fd(&mut self, fd: RawFd, readable: bool, writable: bool) {
		self.registration.borrow_mut().fd = Some((fd, readable, writable));
	}

	fn unregister_fd(&mut self, fd: RawFd) {
		let mut registration = self.registration.borrow_mut();
		if registration.fd.is_some_and(|(current, _, _)| current == fd) {
			registration.fd = None;
		}
	}

	fn start_timer(&mut self, delay: Duration, interval: Duration) {
		self.registration.borrow_mut().timer = Some(Timer {
			deadline: Instant::now() + delay,
			interval,
		});
	}

	fn stop_timer(&mut self) {
		self.registration.borrow_mut().timer = None;
	}

	fn now(&self) -> std::time::Instant {
		Instant::now().into_std()
	}
}

/// Descriptor owned by the client; only borrowed for readiness.
struct ClientFd(RawFd);

impl AsRawFd for ClientFd {
	fn as_raw_fd(&self) -> RawFd {
		self.0
	}
}

struct Watched {
	key: (RawFd, bool, bool),
	fd: AsyncFd<ClientFd>,
	interest: IoInterest,
}

impl Watched {
	fn register(key: (RawFd, bool, bool), interest: IoInterest) -> io::Result<Self> {
		// SAFETY: the connection keeps `key.0` open while it is registered with the
		// reactor, and `drive` drops this value as soon as that registration changes
		// or the session closes.
		let fd = unsafe { AsyncFd::register_with_interest(ClientFd(key.0), interest) }.map_err(io::Error::from)?;
		Ok(Self { key, fd, interest })
	}
}

fn io_interest(readable: bool, writable: bool) -> Option<IoInterest> {
	match (readable, writable) {
		(true, true) => Some(IoInterest::READABLE | IoInterest::WRITABLE),
		(true, false) => Some(IoInterest::READABLE),
		(false, true) => Some(IoInterest::WRITABLE),
		(false, false) => None,
	}
}

async fn readiness(watched: Option<&Watched>) -> io::Result<Readiness> {
	let Some(watched) = watched else {
		return std::future::pending().await;
	};
	let mut guard = watched.fd.ready(watched.interest).await?;
	let ready = guard.ready();
	guard.clear_ready();
	Ok(Readiness {
		readable: ready.is_readable() || ready.is_read_closed(),
		writable: ready.is_writable() || ready.is_write_closed(),
	})
}

enum Wake {
	Io(io::Result<Readiness>),
	Timer,
	Idle,
}

/// Drives one session until it is closed (or removed from `sessions`).
pub async fn drive(sessions: &Sessions, id: SessionId, reactor: &TokioReactor) -> Result<()> {
	let mut watched: Option<Watched> = None;

	loop {
		match sessions.with(id, |session| session.is_closed()) {
			Ok(true) | Err(Error::UnknownSession(_)) => break,
			Ok(false) => {}
			Err(err) => return Err(err),
		}

		let (fd, timer) = reactor.snapshot();
		let wanted = fd.and_then(|key| io_interest(key.1, key.2).map(|interest| (key, interest)));
		match wanted {
			Some((key, _)) if watched.as_ref().is_some_and(|w| w.key == key) => {}
			Some((key, interest)) => {
				watched = None;
				match Watched::register(key, interest) {
					Ok(registered) => {
						trace!(target = "zk.host", session = %id, fd = key.0, "descriptor registered");
						watched = Some(registered);
					}
					Err(err) => {
						warn!(target = "zk.host", session = %id, fd = key.0, error = %err, "cannot watch descriptor");
						sessions.on_io_ready(id, Err(err))?;
					}
				}
			}
			None => watched = None,
		}

		let deadline = timer.map_or_else(|| Instant::now() + IDLE_REQUERY, |timer| timer.deadline);
		let wake = tokio::select! {
			ready = readiness(watched.as_ref()) => Wake::Io(ready),
			_ = sleep_until(deadline) => {
				if timer.is_some() { Wake::Timer } else { Wake::Idle }
			}
		};

		match wake {
			Wake::Io(ready) => sessions.on_io_ready(id, ready)?,
			Wake::Timer => {
				reactor.reschedule();
				sessions.on_timer_fire(id)?;
			}
			Wake::Idle => sessions.yield_interest(id)?,
		}
	}

	debug!(target = "zk.host", session = %id, "session closed, driver stopped");
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io::Write;
	use std::os::unix::net::UnixStream;

	use super::*;

	#[test]
	fn registration_tracks_latest_request() {
		let mut reactor = TokioReactor::new();
		reactor.register_fd(7, true, false);
		reactor.unregister_fd(8);
		assert_eq!(reactor.snapshot().0, Some((7, true, false)));
		reactor.unregister_fd(7);
		assert_eq!(reactor.snapshot().0, None);
	}

	#[test]
	fn timer_reschedules_by_interval() {
		let mut reactor = TokioReactor::new();
		let start = Instant::now();
		reactor.start_timer(Duration::from_millis(30), Duration::from_secs(5));
		let first = reactor.snapshot().1.unwrap().deadline;
		assert!(first >= start + Duration::from_millis(30));
		assert!(first < start + Duration::from_secs(5));

		reactor.reschedule();
		assert!(reactor.snapshot().1.unwrap().deadline >= start + Duration::from_secs(5));

		reactor.stop_timer();
		assert!(reactor.snapshot().1.is_none());
	}

	#[tokio::test]
	async fn readiness_reports_readable_socket() {
		let (mut writer, reader) = UnixStream::pair().unwrap();
		reader.set_nonblocking(true).unwrap();
		writer.write_all(b"x").unwrap();

		let watched = Watched::register((reader.as_raw_fd(), true, false), IoInterest::READABLE).unwrap();
		let ready = readiness(Some(&watched)).await.unwrap();
		assert!(ready.readable);
	}
}
