//! One session: a connection handle plus everything needed to drive it.

use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use zk_protocol::{ClientId, ErrorCode, Interest, LifecycleEvent, SessionState, WatchedEvent};

use crate::client::{Connection, CoordinationClient, Deliveries, Delivery, OpenRequest, Reply};
use crate::codec::identity;
use crate::config::{SessionConfig, level_filter};
use crate::error::{Error, Result};
use crate::reactor::{KeepAlive, Reactor};
use crate::registry::{CallbackRegistry, Dispatch};
use crate::state::{SessionStateMachine, Transition};
use crate::table::SessionId;

pub struct Session {
	pub(crate) id: SessionId,
	client: Box<dyn CoordinationClient>,
	pub(crate) reactor: Box<dyn Reactor>,
	pub(crate) connection: Option<Box<dyn Connection>>,
	/// Descriptor reported by the last interest query.
	pub(crate) fd: Option<RawFd>,
	/// Descriptor currently registered with the reactor.
	pub(crate) polling: Option<RawFd>,
	pub(crate) interest: Interest,
	/// Time budget reported by the last interest query.
	pub(crate) next_timeout: Duration,
	pub(crate) last_activity: Instant,
	pub(crate) keep_alive: Option<KeepAlive>,
	pub(crate) closed: bool,
	client_id: ClientId,
	refs: usize,
	pub(crate) machine: SessionStateMachine,
	pub(crate) registry: CallbackRegistry,
	subscribers: Vec<mpsc::UnboundedSender<LifecycleEvent>>,
	pub(crate) ready: Dispatch,
}

impl Session {
	pub fn new(id: SessionId, client: Box<dyn CoordinationClient>, reactor: Box<dyn Reactor>) -> Self {
		let last_activity = reactor.now();
		Self {
			id,
			client,
			reactor,
			connection: None,
			fd: None,
			polling: None,
			interest: Interest::NONE,
			next_timeout: Duration::ZERO,
			last_activity,
			keep_alive: None,
			closed: false,
			client_id: ClientId::default(),
			refs: 0,
			machine: SessionStateMachine::default(),
			registry: CallbackRegistry::new(id),
			subscribers: Vec::new(),
			ready: Dispatch::default(),
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	/// Opens a connection handle and starts driving it.
	///
	/// Calling this on a session that already has a handle re-initializes it:
	/// the old handle is closed, its outstanding requests complete with
	/// `Closing`, and the keep-alive timer is stopped and reused.
	pub fn init(&mut self, config: &SessionConfig) -> Result<()> {
		let request = config.resolve()?;
		self.open(&request)
	}

	pub fn open(&mut self, request: &OpenRequest) -> Result<()> {
		if self.connection.is_some() {
			info!(target = "zk.session", session = %self.id, "re-initializing session");
			self.retire_connection();
		}

		if self.keep_alive.is_none() {
			self.keep_alive = Some(KeepAlive::default());
		}

		let connection = self.client.open(request).map_err(|err| {
			error!(target = "zk.session", session = %self.id, connect = %request.connect, error = %err, "client returned no handle");
			Error::Init(err)
		})?;

		info!(
			target = "zk.session",
			session = %self.id,
			connect = %request.connect,
			timeout_ms = request.timeout_ms,
			resume = !request.client_id.is_zero(),
			client_log = %level_filter(request.debug_level),
			"session handle opened"
		);

		self.connection = Some(connection);
		self.client_id = request.client_id;
		self.closed = false;
		self.machine.begin();
		self.retain();
		self.yield_interest();
		Ok(())
	}

	/// Closes the session with `code` (0 for a caller-requested close).
	///
	/// Idempotent. `close` is emitted only when a live handle was torn down.
	pub fn close(&mut self, code: i32) {
		if self.closed {
			return;
		}
		self.closed = true;
		self.machine.finish();

		if let Some(timer) = self.keep_alive.as_mut() {
			timer.disarm(self.reactor.as_mut());
		}

		if self.connection.is_none() {
			return;
		}

		self.retire_connection();
		info!(target = "zk.session", session = %self.id, code, "session closed");
		self.emit(LifecycleEvent::Close { code });
	}

	/// Tears down the current handle, completing everything it still owes.
	fn retire_connection(&mut self) {
		if let Some(timer) = self.keep_alive.as_mut() {
			timer.disarm(self.reactor.as_mut());
		}
		if let Some(fd) = self.polling.take() {
			self.reactor.unregister_fd(fd);
		}
		self.fd = None;
		self.interest = Interest::NONE;

		let Some(connection) = self.connection.take() else {
			return;
		};
		let mut deliveries = Deliveries::default();
		connection.close(&mut deliveries);
		self.release();
		self.deliver(deliveries);

		let owner = self.client_id.id;
		let pending = self.registry.drain_completions();
		if !pending.is_empty() {
			debug!(target = "zk.registry", session = %self.id, count = pending.len(), "completing outstanding requests with Closing");
		}
		for pending in pending {
			self.ready.push(pending.complete(ErrorCode::Closing, Reply::Void, owner));
		}
		self.registry.clear_watches();
	}

	/// Routes what one processing step produced, in order.
	///
	/// A fatal session event closes the session once the whole batch has been
	/// routed, so completions reported alongside it keep their own codes.
	pub(crate) fn deliver(&mut self, deliveries: Deliveries) {
		let mut fatal = None;
		for delivery in deliveries {
			match delivery {
				Delivery::Completion { token, rc, reply } => match self.registry.take(token) {
					Some(mut pending) => {
						debug!(target = "zk.registry", session = %self.id, seq = token.seq, kind = ?pending.kind, rc = %rc, "completion");
						if let Some(watch) = pending.watch.take().filter(|_| !pending.installs_watch(rc)) {
							self.registry.take_watch(watch);
							trace!(target = "zk.registry", session = %self.id, seq = watch.seq, rc = %rc, "watcher not installed, dropped");
						}
						self.ready.push(pending.complete(rc, reply, self.client_id.id));
					}
					None => warn!(target = "zk.registry", session = %self.id, seq = token.seq, "completion for unknown request"),
				},
				Delivery::Watch { token, event } => {
					let Some(registration) = self.registry.take_watch(token) else {
						warn!(target = "zk.registry", session = %self.id, seq = token.seq, "notification for unknown watcher");
						continue;
					};
					if self.watches_suppressed() {
						debug!(target = "zk.registry", session = %self.id, seq = token.seq, "watcher suppressed after expiry");
						continue;
					}
					self.ready.push(registration.fire(event));
				}
				Delivery::Session(event) => {
					if let Some(code) = self.on_watcher_event(event) {
						fatal.get_or_insert(code);
					}
				}
			}
		}

		if let Some(code) = fatal {
			self.close(code);
		}
	}

	fn watches_suppressed(&self) -> bool {
		self.machine.state() == SessionState::Expired || self.connection.as_ref().is_some_and(|c| c.state() == SessionState::Expired)
	}

	/// Applies one default-watcher event. Returns the close code when the
	/// event leaves the session unusable.
	fn on_watcher_event(&mut self, event: WatchedEvent) -> Option<i32> {
		debug!(target = "zk.session", session = %self.id, kind = event.kind, state = event.state, path = ?event.path, "watcher event");
		match self.machine.observe(&event) {
			Transition::Connected { path } => {
				if let Some(connection) = self.connection.as_ref() {
					self.client_id = connection.client_id();
				}
				info!(
					target = "zk.session",
					session = %self.id,
					client_id = %identity::encode_id(self.client_id.id),
					"session connected"
				);
				self.emit(LifecycleEvent::Connect { path });
				None
			}
			Transition::Emit(event) => {
				self.emit(event);
				None
			}
			Transition::Fatal { code } => {
				error!(target = "zk.session", session = %self.id, code, "unrecoverable session state, shutting down");
				Some(code)
			}
			Transition::Ignored => None,
		}
	}

	/// Registers a lifecycle event listener.
	pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.subscribers.push(tx);
		rx
	}

	fn emit(&mut self, event: LifecycleEvent) {
		debug!(target = "zk.session", session = %self.id, event = event.name(), "emit");
		self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
	}

	/// Takes the callbacks queued since the last call.
	pub fn take_ready(&mut self) -> Dispatch {
		std::mem::take(&mut self.ready)
	}

	fn retain(&mut self) {
		self.refs += 1;
	}

	fn release(&mut self) {
		self.refs = self.refs.saturating_sub(1);
	}

	pub fn refs(&self) -> usize {
		self.refs
	}

	pub(crate) fn is_reclaimable(&self) -> bool {
		self.closed && self.refs == 0 && self.registry.is_empty() && self.ready.is_empty()
	}

	/// Raw client state code; `0` without a live handle.
	pub fn state(&self) -> i32 {
		self.connection.as_ref().map_or(0, |c| c.state().code())
	}

	/// Lifecycle state as tracked by the session itself.
	pub fn session_state(&self) -> SessionState {
		self.machine.state()
	}

	pub fn identity(&self) -> ClientId {
		self.connection.as_ref().map_or(self.client_id, |c| c.client_id())
	}

	/// Session id as lowercase hex.
	pub fn client_id(&self) -> String {
		identity::encode_id(self.identity().id)
	}

	/// Session password as 32 uppercase hex digits.
	pub fn client_password(&self) -> String {
		identity::encode_password(&self.identity().password)
	}

	/// Negotiated timeout in milliseconds; `-1` without a live handle.
	pub fn timeout(&self) -> i32 {
		self.connection.as_ref().map_or(-1, |c| c.recv_timeout())
	}

	/// `false` without a live handle.
	pub fn is_unrecoverable(&self) -> bool {
		self.connection.as_ref().is_some_and(|c| c.is_unrecoverable())
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}

	pub fn is_initialized(&self) -> bool {
		self.connection.is_some()
	}

	/// Descriptor currently registered with the reactor.
	pub fn polling_fd(&self) -> Option<RawFd> {
		self.polling
	}

	pub fn interest(&self) -> Interest {
		self.interest
	}

	pub fn pending_completions(&self) -> usize {
		self.registry.pending_completions()
	}

	pub fn pending_watches(&self) -> usize {
		self.registry.pending_watches()
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("state", &self.machine.state())
			.field("closed", &self.closed)
			.field("fd", &self.fd)
			.field("polling", &self.polling)
			.field("interest", &self.interest)
			.field("refs", &self.refs)
			.field("pending", &self.registry.pending_completions())
			.finish_non_exhaustive()
	}
}
