//! Interpretation of default-watcher events into session lifecycle changes.

use tracing::{debug, warn};
use zk_protocol::{EventType, LifecycleEvent, SessionState, WatchedEvent};

/// What the session must do in response to one default-watcher event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
	/// The session reached `Connected`: capture the identity, then emit `connect`.
	Connected { path: Option<String> },
	/// Emit the event to subscribers.
	Emit(LifecycleEvent),
	/// Unrecoverable session failure: close with this code.
	Fatal { code: i32 },
	Ignored,
}

/// Lifecycle of one session, from initialization to close.
#[derive(Debug, Default)]
pub struct SessionStateMachine {
	state: SessionState,
}

impl SessionStateMachine {
	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Enters `Connecting` after a connection handle was opened.
	pub fn begin(&mut self) {
		self.state = SessionState::Connecting;
	}

	/// Records that the session was closed. Expiry and auth failure stay
	/// visible as the final state.
	pub fn finish(&mut self) {
		if !matches!(self.state, SessionState::Expired | SessionState::AuthFailed) {
			self.state = SessionState::Closed;
		}
	}

	pub fn observe(&mut self, event: &WatchedEvent) -> Transition {
		match event.event_type() {
			Some(EventType::Session) => self.observe_session(event),
			Some(kind) => {
				let path = event.path.clone().unwrap_or_default();
				Transition::Emit(match kind {
					EventType::Created => LifecycleEvent::Created { path },
					EventType::Deleted => LifecycleEvent::Deleted { path },
					EventType::Changed => LifecycleEvent::Changed { path },
					EventType::Child => LifecycleEvent::Child { path },
					EventType::NotWatching | EventType::Session => LifecycleEvent::NotWatching { path },
				})
			}
			None => {
				warn!(target = "zk.session", kind = event.kind, state = event.state, "unknown watcher event type");
				Transition::Ignored
			}
		}
	}

	fn observe_session(&mut self, event: &WatchedEvent) -> Transition {
		if self.state.is_terminal() {
			debug!(target = "zk.session", state = %self.state, code = event.state, "session event after terminal state ignored");
			return Transition::Ignored;
		}

		match event.session_state() {
			Some(SessionState::Connected) => {
				self.state = SessionState::Connected;
				Transition::Connected { path: event.path.clone() }
			}
			Some(SessionState::Connecting) => {
				self.state = SessionState::Connecting;
				Transition::Emit(LifecycleEvent::Connecting)
			}
			Some(SessionState::Associating) => {
				self.state = SessionState::Associating;
				Transition::Ignored
			}
			Some(SessionState::AuthFailed) => {
				self.state = SessionState::AuthFailed;
				Transition::Fatal {
					code: SessionState::AuthFailed.code(),
				}
			}
			Some(SessionState::Expired) => {
				self.state = SessionState::Expired;
				Transition::Fatal {
					code: SessionState::Expired.code(),
				}
			}
			Some(SessionState::Init | SessionState::Closed) | None => {
				warn!(target = "zk.session", code = event.state, "unknown session state");
				Transition::Ignored
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn connected() -> SessionStateMachine {
		let mut machine = SessionStateMachine::default();
		machine.begin();
		machine.observe(&WatchedEvent::session(SessionState::Connected));
		machine
	}

	#[test]
	fn connecting_then_connected() {
		let mut machine = SessionStateMachine::default();
		machine.begin();
		assert_eq!(machine.state(), SessionState::Connecting);

		let t = machine.observe(&WatchedEvent::session(SessionState::Connecting));
		assert_eq!(t, Transition::Emit(LifecycleEvent::Connecting));

		let t = machine.observe(&WatchedEvent::session(SessionState::Connected));
		assert_eq!(t, Transition::Connected { path: None });
		assert_eq!(machine.state(), SessionState::Connected);
	}

	#[test]
	fn expiry_and_auth_failure_are_fatal() {
		let mut machine = connected();
		let t = machine.observe(&WatchedEvent::session(SessionState::Expired));
		assert_eq!(t, Transition::Fatal { code: -112 });
		assert_eq!(machine.state(), SessionState::Expired);

		let mut machine = connected();
		let t = machine.observe(&WatchedEvent::session(SessionState::AuthFailed));
		assert_eq!(t, Transition::Fatal { code: -113 });
	}

	#[test]
	fn terminal_state_absorbs_session_events() {
		let mut machine = connected();
		machine.observe(&WatchedEvent::session(SessionState::Expired));
		assert_eq!(machine.observe(&WatchedEvent::session(SessionState::Expired)), Transition::Ignored);
		assert_eq!(machine.observe(&WatchedEvent::session(SessionState::Connected)), Transition::Ignored);

		machine.finish();
		assert_eq!(machine.state(), SessionState::Expired);
	}

	#[test]
	fn node_events_map_to_lifecycle_events() {
		let mut machine = connected();
		for (kind, expected) in [
			(EventType::Created, LifecycleEvent::Created { path: "/a".into() }),
			(EventType::Deleted, LifecycleEvent::Deleted { path: "/a".into() }),
			(EventType::Changed, LifecycleEvent::Changed { path: "/a".into() }),
			(EventType::Child, LifecycleEvent::Child { path: "/a".into() }),
			(EventType::NotWatching, LifecycleEvent::NotWatching { path: "/a".into() }),
		] {
			assert_eq!(machine.observe(&WatchedEvent::node(kind, "/a")), Transition::Emit(expected));
		}
	}

	#[test]
	fn unknown_codes_are_ignored() {
		let mut machine = connected();
		let unknown_type = WatchedEvent {
			kind: 99,
			state: 3,
			path: None,
		};
		assert_eq!(machine.observe(&unknown_type), Transition::Ignored);

		let unknown_state = WatchedEvent {
			kind: -1,
			state: 77,
			path: None,
		};
		assert_eq!(machine.observe(&unknown_state), Transition::Ignored);
		assert_eq!(machine.state(), SessionState::Connected);
	}

	#[test]
	fn close_without_failure_is_closed() {
		let mut machine = connected();
		machine.finish();
		assert_eq!(machine.state(), SessionState::Closed);
	}
}
