//! Watch notifications from the client and lifecycle events emitted by a session.

use serde::{Deserialize, Serialize};

use crate::types::{EventType, SessionState};

/// Raw `(type, state, path)` triple delivered by the client to a watcher.
///
/// Codes are kept raw so that unknown event types can be reported instead of
/// being rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEvent {
	#[serde(rename = "type")]
	pub kind: i32,
	pub state: i32,
	pub path: Option<String>,
}

impl WatchedEvent {
	pub fn new(kind: EventType, state: SessionState, path: Option<String>) -> Self {
		Self {
			kind: kind.code(),
			state: state.code(),
			path,
		}
	}

	/// A session-level notification (no path).
	pub fn session(state: SessionState) -> Self {
		WatchedEvent::new(EventType::Session, state, None)
	}

	/// A node-level notification for `path`, observed while connected.
	pub fn node(kind: EventType, path: impl Into<String>) -> Self {
		WatchedEvent::new(kind, SessionState::Connected, Some(path.into()))
	}

	pub fn event_type(&self) -> Option<EventType> {
		EventType::from_code(self.kind)
	}

	pub fn session_state(&self) -> Option<SessionState> {
		SessionState::from_code(self.state)
	}
}

/// Closed set of events a session emits to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum LifecycleEvent {
	Connecting,
	Connect { path: Option<String> },
	Close { code: i32 },
	Created { path: String },
	Deleted { path: String },
	Changed { path: String },
	Child { path: String },
	NotWatching { path: String },
}

impl LifecycleEvent {
	/// Event name as seen by host listeners.
	pub fn name(&self) -> &'static str {
		match self {
			LifecycleEvent::Connecting => "connecting",
			LifecycleEvent::Connect { .. } => "connect",
			LifecycleEvent::Close { .. } => "close",
			LifecycleEvent::Created { .. } => "created",
			LifecycleEvent::Deleted { .. } => "deleted",
			LifecycleEvent::Changed { .. } => "changed",
			LifecycleEvent::Child { .. } => "child",
			LifecycleEvent::NotWatching { .. } => "notwatching",
		}
	}

	/// Path carried by the event, if any.
	pub fn path(&self) -> Option<&str> {
		match self {
			LifecycleEvent::Connecting | LifecycleEvent::Close { .. } => None,
			LifecycleEvent::Connect { path } => path.as_deref(),
			LifecycleEvent::Created { path }
			| LifecycleEvent::Deleted { path }
			| LifecycleEvent::Changed { path }
			| LifecycleEvent::Child { path }
			| LifecycleEvent::NotWatching { path } => Some(path),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_event_type_is_not_mapped() {
		let event = WatchedEvent {
			kind: 42,
			state: 3,
			path: None,
		};
		assert_eq!(event.event_type(), None);
		assert_eq!(event.session_state(), Some(SessionState::Connected));
	}

	#[test]
	fn lifecycle_event_names() {
		assert_eq!(LifecycleEvent::Connecting.name(), "connecting");
		assert_eq!(LifecycleEvent::Close { code: 0 }.name(), "close");
		assert_eq!(LifecycleEvent::NotWatching { path: "/a".into() }.name(), "notwatching");
		assert_eq!(LifecycleEvent::Child { path: "/a".into() }.path(), Some("/a"));
		assert_eq!(LifecycleEvent::Connect { path: None }.path(), None);
	}

	#[test]
	fn lifecycle_event_serializes_tagged() {
		let value = serde_json::to_value(LifecycleEvent::Close { code: -112 }).unwrap();
		assert_eq!(value["event"], "close");
		assert_eq!(value["code"], -112);
	}
}
