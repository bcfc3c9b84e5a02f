//! In-memory coordination service and reactor for exercising sessions
//! without a server or an event loop.
//!
//! # Example
//!
//! ```ignore
//! let ensemble = FakeEnsemble::new();
//! let client = ensemble.client();
//! let reactor = RecordingReactor::new();
//!
//! let sessions = Sessions::new();
//! let id = sessions.insert(Box::new(client.clone()), Box::new(reactor.clone()));
//! sessions.with(id, |s| s.init(&SessionConfig::new("fake:2181")))??;
//!
//! // Deliver the scripted `Connected` event.
//! sessions.on_io_ready(id, Ok(Readiness::READABLE))?;
//! ```
//!
//! Every processing step first hands out queued events (scripted session
//! events and watch notifications), then answers every queued request in
//! submission order. Requests are only answered once the connection has
//! reached `Connected`.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use zk_protocol::{Acl, ClientId, ErrorCode, EventType, Interest, PASSWORD_LEN, SessionState, WatchedEvent, create_flags};

use crate::client::{Connection, CoordinationClient, Deliveries, Delivery, OpenRequest, Operation, Reply, Watch};
use crate::codec;
use crate::native::{InterestQuery, RawStat};
use crate::reactor::Reactor;
use crate::registry::RequestToken;

/// Descriptor reported by fake connections unless overridden.
pub const FAKE_FD: RawFd = 1_000;

const FIRST_SESSION_ID: i64 = 0x1_5a2b_0000_0000;

/// Shared in-memory node tree. Clones share state.
#[derive(Clone)]
pub struct FakeEnsemble {
	state: Arc<Mutex<EnsembleState>>,
}

impl FakeEnsemble {
	pub fn new() -> Self {
		let mut nodes = BTreeMap::new();
		nodes.insert("/".to_string(), Node::new(Vec::new(), vec![Acl::open_unsafe()], 0, 0));
		Self {
			state: Arc::new(Mutex::new(EnsembleState {
				nodes,
				zxid: 0,
				next_session: FIRST_SESSION_ID,
				clients: Vec::new(),
				data_watches: HashMap::new(),
				child_watches: HashMap::new(),
				fired: Vec::new(),
			})),
		}
	}

	/// Creates a client that opens connections against this ensemble.
	pub fn client(&self) -> FakeClient {
		let mut state = self.state.lock();
		state.clients.push(ClientSlot::new());
		FakeClient {
			state: Arc::clone(&self.state),
			index: state.clients.len() - 1,
		}
	}

	/// Creates a persistent node (and any missing parents) outside any session.
	pub fn seed(&self, path: &str, data: &[u8]) {
		let mut state = self.state.lock();
		let mut prefix = String::new();
		let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
		for (i, segment) in segments.iter().enumerate() {
			prefix.push('/');
			prefix.push_str(segment);
			if state.nodes.contains_key(&prefix) {
				continue;
			}
			let payload: &[u8] = if i + 1 == segments.len() { data } else { &[] };
			let _ = state.create(&prefix, payload, &[Acl::open_unsafe()], create_flags::PERSISTENT, 0);
		}
		state.fired.clear();
	}

	pub fn exists(&self, path: &str) -> bool {
		self.state.lock().nodes.contains_key(path)
	}

	pub fn data(&self, path: &str) -> Option<Vec<u8>> {
		self.state.lock().nodes.get(path).map(|node| node.data.clone())
	}

	pub fn stat(&self, path: &str) -> Option<RawStat> {
		self.state.lock().nodes.get(path).map(|node| node.stat)
	}

	pub fn acl(&self, path: &str) -> Option<Vec<Acl>> {
		self.state.lock().nodes.get(path).map(|node| node.acl.clone())
	}

	pub fn children(&self, path: &str) -> Option<Vec<String>> {
		self.state.lock().nodes.get(path).map(|node| node.children.iter().cloned().collect())
	}
}

impl Default for FakeEnsemble {
	fn default() -> Self {
		Self::new()
	}
}

/// Client handle and controller for one session's connections.
///
/// The session owns one clone (as its [`CoordinationClient`]); the test keeps
/// another to script events and inspect what happened.
#[derive(Clone)]
pub struct FakeClient {
	state: Arc<Mutex<EnsembleState>>,
	index: usize,
}

impl FakeClient {
	fn update<R>(&self, f: impl FnOnce(&mut ClientSlot) -> R) -> R {
		let mut state = self.state.lock();
		f(&mut state.clients[self.index])
	}

	fn read<R>(&self, f: impl FnOnce(&ClientSlot) -> R) -> R {
		let state = self.state.lock();
		f(&state.clients[self.index])
	}

	/// When enabled (the default), each new connection queues `Connected`.
	pub fn set_auto_connect(&self, enabled: bool) {
		self.update(|slot| slot.auto_connect = enabled);
	}

	/// Makes the next `open` fail with `kind`.
	pub fn fail_next_open(&self, kind: io::ErrorKind) {
		self.update(|slot| slot.open_failure = Some(kind));
	}

	/// Makes every interest query fail with `rc` until cleared.
	pub fn fail_interest(&self, rc: Option<ErrorCode>) {
		self.update(|slot| slot.interest_failure = rc);
	}

	/// Makes the next processing step return `rc` without doing anything.
	pub fn fail_next_process(&self, rc: ErrorCode) {
		self.update(|slot| slot.process_failure = Some(rc));
	}

	/// Makes every submit return `rc` until cleared.
	pub fn reject_submit(&self, rc: Option<ErrorCode>) {
		self.update(|slot| slot.submit_failure = rc);
	}

	/// Descriptor reported by interest queries; `None` simulates a client
	/// that has no socket yet.
	pub fn set_fd(&self, fd: Option<RawFd>) {
		self.update(|slot| slot.fd = fd);
	}

	/// Time budget reported by interest queries (default: a third of the
	/// negotiated timeout).
	pub fn set_interest_timeout(&self, timeout: Duration) {
		self.update(|slot| slot.interest_timeout = Some(timeout));
	}

	/// Timeout the "server" grants instead of the requested one.
	pub fn set_negotiated_timeout(&self, timeout_ms: i32) {
		self.update(|slot| slot.negotiated_timeout = Some(timeout_ms));
	}

	pub fn set_unrecoverable(&self, unrecoverable: bool) {
		self.update(|slot| {
			if let Some(conn) = slot.connection.as_mut() {
				conn.unrecoverable = unrecoverable;
			}
		});
	}

	/// Queues a session event for the current connection.
	pub fn session_event(&self, state: SessionState) {
		self.push(Delivery::Session(WatchedEvent::session(state)));
	}

	/// Queues a raw delivery for the current connection.
	pub fn push(&self, delivery: Delivery) {
		self.update(|slot| {
			if let Some(conn) = slot.connection.as_mut() {
				conn.inbox.push_back(delivery);
			}
		});
	}

	/// Queues `Connected` for the current connection.
	pub fn connect(&self) {
		self.session_event(SessionState::Connected);
	}

	/// Expires the current session: its ephemeral nodes go away and
	/// `Expired` is queued.
	pub fn expire(&self) {
		let mut state = self.state.lock();
		let Some(owner) = state.clients[self.index].connection.as_ref().map(|conn| conn.identity.id) else {
			return;
		};
		state.remove_ephemerals(owner);
		state.route_fired(self.index, None);
		if let Some(conn) = state.clients[self.index].connection.as_mut() {
			conn.inbox.push_back(Delivery::Session(WatchedEvent::session(SessionState::Expired)));
		}
	}

	/// Every open request seen, in order.
	pub fn opens(&self) -> Vec<OpenRequest> {
		self.read(|slot| slot.opens.clone())
	}

	/// Number of connection handles closed.
	pub fn closes(&self) -> usize {
		self.read(|slot| slot.closes)
	}

	/// Conditions passed to each processing step, in order.
	pub fn processed(&self) -> Vec<Interest> {
		self.read(|slot| slot.processed.clone())
	}

	/// Requests submitted but not yet answered.
	pub fn queued_requests(&self) -> usize {
		self.read(|slot| slot.connection.as_ref().map_or(0, |conn| conn.outbox.len()))
	}

	/// Names of every submitted operation, in order.
	pub fn submitted(&self) -> Vec<&'static str> {
		self.read(|slot| slot.submitted.clone())
	}

	/// Credentials added through `add_auth`.
	pub fn auth(&self) -> Vec<(String, Vec<u8>)> {
		self.read(|slot| slot.auth.clone())
	}

	/// Identity of the current connection.
	pub fn identity(&self) -> Option<ClientId> {
		self.read(|slot| slot.connection.as_ref().map(|conn| conn.identity))
	}

	pub fn is_open(&self) -> bool {
		self.read(|slot| slot.connection.is_some())
	}
}

impl CoordinationClient for FakeClient {
	fn open(&mut self, request: &OpenRequest) -> io::Result<Box<dyn Connection>> {
		let mut state = self.state.lock();
		let identity = if request.client_id.is_zero() {
			state.next_session += 1;
			let id = state.next_session;
			ClientId::new(id, password_for(id))
		} else {
			request.client_id
		};

		let slot = &mut state.clients[self.index];
		slot.opens.push(request.clone());
		if let Some(kind) = slot.open_failure.take() {
			return Err(io::Error::new(kind, "fake ensemble refused the handle"));
		}

		slot.generation += 1;
		let mut inbox = VecDeque::new();
		if slot.auto_connect {
			inbox.push_back(Delivery::Session(WatchedEvent::session(SessionState::Connected)));
		}
		slot.connection = Some(ConnSlot {
			identity,
			timeout: slot.negotiated_timeout.unwrap_or(request.timeout_ms),
			state: SessionState::Connecting,
			outbox: VecDeque::new(),
			inbox,
			unrecoverable: false,
		});

		Ok(Box::new(FakeConnection {
			state: Arc::clone(&self.state),
			index: self.index,
			generation: slot.generation,
		}))
	}
}

fn password_for(id: i64) -> [u8; PASSWORD_LEN] {
	let mut password = [0u8; PASSWORD_LEN];
	password[..8].copy_from_slice(&id.to_be_bytes());
	password[8..].copy_from_slice(&(!id).to_be_bytes());
	password
}

struct FakeConnection {
	state: Arc<Mutex<EnsembleState>>,
	index: usize,
	generation: u64,
}

impl FakeConnection {
	fn live<'a>(&self, state: &'a mut EnsembleState) -> Option<&'a mut ClientSlot> {
		let slot = state.clients.get_mut(self.index)?;
		(slot.generation == self.generation && slot.connection.is_some()).then_some(slot)
	}

	fn conn<R>(&self, f: impl FnOnce(&ConnSlot) -> R) -> Option<R> {
		let mut state = self.state.lock();
		self.live(&mut state).and_then(|slot| slot.connection.as_ref().map(f))
	}
}

impl Connection for FakeConnection {
	fn interest(&mut self) -> Result<InterestQuery, ErrorCode> {
		let mut state = self.state.lock();
		let slot = self.live(&mut state).ok_or(ErrorCode::InvalidState)?;
		if let Some(rc) = slot.interest_failure {
			return Err(rc);
		}
		let conn = slot.connection.as_ref().ok_or(ErrorCode::InvalidState)?;
		let interest = if conn.outbox.is_empty() { Interest::READ } else { Interest::BOTH };
		let timeout = slot
			.interest_timeout
			.unwrap_or_else(|| Duration::from_millis((conn.timeout / 3).max(1) as u64));
		Ok(InterestQuery {
			fd: slot.fd,
			interest,
			timeout,
		})
	}

	fn process(&mut self, events: Interest, sink: &mut Deliveries) -> ErrorCode {
		let mut state = self.state.lock();
		let Some(slot) = self.live(&mut state) else {
			return ErrorCode::InvalidState;
		};
		slot.processed.push(events);
		if let Some(rc) = slot.process_failure.take() {
			return rc;
		}
		let Some(mut conn) = slot.connection.take() else {
			return ErrorCode::InvalidState;
		};

		let mut delivered = conn.drain_inbox(sink);
		if conn.state == SessionState::Connected {
			while let Some(request) = conn.outbox.pop_front() {
				let (rc, reply) = state.execute(self.index, self.generation, conn.identity.id, request.op, request.watch);
				state.route_fired(self.index, Some(&mut *sink));
				sink.complete(request.token, rc, reply);
				delivered = true;
			}
		}
		delivered |= conn.drain_inbox(sink);

		state.clients[self.index].connection = Some(conn);
		if delivered { ErrorCode::Ok } else { ErrorCode::Nothing }
	}

	fn submit(&mut self, op: Operation<'_>, token: RequestToken, watch: Watch) -> ErrorCode {
		let mut state = self.state.lock();
		let Some(slot) = self.live(&mut state) else {
			return ErrorCode::InvalidState;
		};
		if let Some(rc) = slot.submit_failure {
			return rc;
		}
		slot.submitted.push(op.name());
		let Some(conn) = slot.connection.as_mut() else {
			return ErrorCode::InvalidState;
		};
		conn.outbox.push_back(Request {
			token,
			op: OwnedOp::from(op),
			watch,
		});
		ErrorCode::Ok
	}

	fn state(&self) -> SessionState {
		self.conn(|conn| conn.state).unwrap_or(SessionState::Closed)
	}

	fn client_id(&self) -> ClientId {
		self.conn(|conn| conn.identity).unwrap_or_default()
	}

	fn recv_timeout(&self) -> i32 {
		self.conn(|conn| conn.timeout).unwrap_or(0)
	}

	fn is_unrecoverable(&self) -> bool {
		self.conn(|conn| conn.unrecoverable || matches!(conn.state, SessionState::Expired | SessionState::AuthFailed))
			.unwrap_or(true)
	}

	fn close(self: Box<Self>, sink: &mut Deliveries) {
		let mut state = self.state.lock();
		let Some(slot) = self.live(&mut state) else {
			return;
		};
		slot.closes += 1;
		let Some(conn) = slot.connection.take() else {
			return;
		};
		for request in conn.outbox {
			sink.complete(request.token, ErrorCode::Closing, Reply::Void);
		}
		if conn.identity.id != 0 {
			state.remove_ephemerals(conn.identity.id);
			state.route_fired(self.index, None);
		}
	}
}

struct EnsembleState {
	nodes: BTreeMap<String, Node>,
	zxid: i64,
	next_session: i64,
	clients: Vec<ClientSlot>,
	data_watches: HashMap<String, Vec<WatchTarget>>,
	child_watches: HashMap<String, Vec<WatchTarget>>,
	/// Notifications triggered by the last mutation, not yet routed.
	fired: Vec<(WatchTarget, WatchedEvent)>,
}

struct Node {
	data: Vec<u8>,
	acl: Vec<Acl>,
	stat: RawStat,
	children: BTreeSet<String>,
}

impl Node {
	fn new(data: Vec<u8>, acl: Vec<Acl>, zxid: i64, owner: i64) -> Self {
		let now = now_millis();
		Self {
			stat: RawStat {
				czxid: zxid,
				mzxid: zxid,
				pzxid: zxid,
				ctime: now,
				mtime: now,
				ephemeral_owner: owner,
				data_length: data.len() as i32,
				..RawStat::default()
			},
			data,
			acl,
			children: BTreeSet::new(),
		}
	}
}

#[derive(Debug, Clone, Copy)]
struct WatchTarget {
	client: usize,
	generation: u64,
	watch: Watch,
}

struct ClientSlot {
	auto_connect: bool,
	fd: Option<RawFd>,
	generation: u64,
	connection: Option<ConnSlot>,
	open_failure: Option<io::ErrorKind>,
	interest_failure: Option<ErrorCode>,
	process_failure: Option<ErrorCode>,
	submit_failure: Option<ErrorCode>,
	interest_timeout: Option<Duration>,
	negotiated_timeout: Option<i32>,
	opens: Vec<OpenRequest>,
	processed: Vec<Interest>,
	submitted: Vec<&'static str>,
	auth: Vec<(String, Vec<u8>)>,
	closes: usize,
}

impl ClientSlot {
	fn new() -> Self {
		Self {
			auto_connect: true,
			fd: Some(FAKE_FD),
			generation: 0,
			connection: None,
			open_failure: None,
			interest_failure: None,
			process_failure: None,
			submit_failure: None,
			interest_timeout: None,
			negotiated_timeout: None,
			opens: Vec::new(),
			processed: Vec::new(),
			submitted: Vec::new(),
			auth: Vec::new(),
			closes: 0,
		}
	}
}

struct ConnSlot {
	identity: ClientId,
	timeout: i32,
	state: SessionState,
	outbox: VecDeque<Request>,
	inbox: VecDeque<Delivery>,
	unrecoverable: bool,
}

impl ConnSlot {
	fn drain_inbox(&mut self, sink: &mut Deliveries) -> bool {
		let delivered = !self.inbox.is_empty();
		while let Some(delivery) = self.inbox.pop_front() {
			if let Delivery::Session(event) = &delivery {
				if let Some(state) = event.session_state().filter(|_| event.event_type() == Some(EventType::Session)) {
					self.state = state;
				}
			}
			sink.push(delivery);
		}
		delivered
	}
}

struct Request {
	token: RequestToken,
	op: OwnedOp,
	watch: Watch,
}

enum OwnedOp {
	Create { path: String, data: Vec<u8>, acl: Vec<Acl>, flags: u32 },
	Delete { path: String, version: i32 },
	Exists { path: String },
	Get { path: String },
	Set { path: String, data: Vec<u8>, version: i32 },
	GetChildren { path: String },
	GetChildren2 { path: String },
	GetAcl { path: String },
	SetAcl { path: String, version: i32, acl: Vec<Acl> },
	AddAuth { scheme: String, cert: Vec<u8> },
	Sync { path: String },
}

impl From<Operation<'_>> for OwnedOp {
	fn from(op: Operation<'_>) -> Self {
		match op {
			Operation::Create { path, data, acl, flags } => OwnedOp::Create {
				path: path.to_string(),
				data: data.to_vec(),
				acl: codec::acl::decode(acl),
				flags,
			},
			Operation::Delete { path, version } => OwnedOp::Delete {
				path: path.to_string(),
				version,
			},
			Operation::Exists { path } => OwnedOp::Exists { path: path.to_string() },
			Operation::Get { path } => OwnedOp::Get { path: path.to_string() },
			Operation::Set { path, data, version } => OwnedOp::Set {
				path: path.to_string(),
				data: data.to_vec(),
				version,
			},
			Operation::GetChildren { path } => OwnedOp::GetChildren { path: path.to_string() },
			Operation::GetChildren2 { path } => OwnedOp::GetChildren2 { path: path.to_string() },
			Operation::GetAcl { path } => OwnedOp::GetAcl { path: path.to_string() },
			Operation::SetAcl { path, version, acl } => OwnedOp::SetAcl {
				path: path.to_string(),
				version,
				acl: codec::acl::decode(acl),
			},
			Operation::AddAuth { scheme, cert } => OwnedOp::AddAuth {
				scheme: scheme.to_string(),
				cert: cert.to_vec(),
			},
			Operation::Sync { path } => OwnedOp::Sync { path: path.to_string() },
		}
	}
}

fn now_millis() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as i64)
}

fn parent_of(path: &str) -> &str {
	match path.rfind('/') {
		Some(0) | None => "/",
		Some(i) => &path[..i],
	}
}

fn name_of(path: &str) -> &str {
	path.rfind('/').map_or(path, |i| &path[i + 1..])
}

impl EnsembleState {
	fn execute(&mut self, client: usize, generation: u64, owner: i64, op: OwnedOp, watch: Watch) -> (ErrorCode, Reply) {
		let target = WatchTarget { client, generation, watch };
		match op {
			OwnedOp::Create { path, data, acl, flags } => match self.create(&path, &data, &acl, flags, owner) {
				Ok(actual) => (ErrorCode::Ok, Reply::Path(Some(actual))),
				Err(rc) => (rc, Reply::Path(None)),
			},
			OwnedOp::Delete { path, version } => (self.delete(&path, version).err().unwrap_or(ErrorCode::Ok), Reply::Void),
			OwnedOp::Exists { path } => {
				self.add_watch(false, &path, target);
				match self.nodes.get(&path) {
					Some(node) => (ErrorCode::Ok, Reply::Stat(Some(node.stat))),
					None => (ErrorCode::NoNode, Reply::Stat(None)),
				}
			}
			OwnedOp::Get { path } => match self.nodes.get(&path) {
				Some(node) => {
					let reply = Reply::Data {
						stat: Some(node.stat),
						data: Some(node.data.clone()),
					};
					self.add_watch(false, &path, target);
					(ErrorCode::Ok, reply)
				}
				None => (ErrorCode::NoNode, Reply::Data { stat: None, data: None }),
			},
			OwnedOp::Set { path, data, version } => match self.set(&path, data, version) {
				Ok(stat) => (ErrorCode::Ok, Reply::Stat(Some(stat))),
				Err(rc) => (rc, Reply::Stat(None)),
			},
			OwnedOp::GetChildren { path } => match self.children_of(&path) {
				Some((children, _)) => {
					self.add_watch(true, &path, target);
					(ErrorCode::Ok, Reply::Children(Some(children)))
				}
				None => (ErrorCode::NoNode, Reply::Children(None)),
			},
			OwnedOp::GetChildren2 { path } => match self.children_of(&path) {
				Some((children, stat)) => {
					self.add_watch(true, &path, target);
					(
						ErrorCode::Ok,
						Reply::Children2 {
							children: Some(children),
							stat: Some(stat),
						},
					)
				}
				None => (
					ErrorCode::NoNode,
					Reply::Children2 {
						children: None,
						stat: None,
					},
				),
			},
			OwnedOp::GetAcl { path } => match self.nodes.get(&path) {
				Some(node) => match codec::acl::encode(&node.acl) {
					Ok(vector) => (
						ErrorCode::Ok,
						Reply::Acl {
							acl: Some(vector),
							stat: Some(node.stat),
						},
					),
					Err(_) => (ErrorCode::MarshallingError, Reply::Acl { acl: None, stat: None }),
				},
				None => (ErrorCode::NoNode, Reply::Acl { acl: None, stat: None }),
			},
			OwnedOp::SetAcl { path, version, acl } => (self.set_acl(&path, version, acl).err().unwrap_or(ErrorCode::Ok), Reply::Void),
			OwnedOp::AddAuth { scheme, cert } => {
				if scheme == "invalid" {
					return (ErrorCode::AuthFailed, Reply::Void);
				}
				self.clients[client].auth.push((scheme, cert));
				(ErrorCode::Ok, Reply::Void)
			}
			OwnedOp::Sync { path } => (ErrorCode::Ok, Reply::Path(Some(path))),
		}
	}

	fn create(&mut self, path: &str, data: &[u8], acl: &[Acl], flags: u32, owner: i64) -> Result<String, ErrorCode> {
		if acl.is_empty() {
			return Err(ErrorCode::InvalidAcl);
		}
		let parent_path = parent_of(path).to_string();
		let parent = self.nodes.get(&parent_path).ok_or(ErrorCode::NoNode)?;
		if parent.stat.ephemeral_owner != 0 {
			return Err(ErrorCode::NoChildrenForEphemerals);
		}
		let actual = if flags & create_flags::SEQUENCE != 0 {
			format!("{path}{:010}", parent.stat.cversion)
		} else {
			path.to_string()
		};
		if self.nodes.contains_key(&actual) {
			return Err(ErrorCode::NodeExists);
		}

		self.zxid += 1;
		let zxid = self.zxid;
		let ephemeral_owner = if flags & create_flags::EPHEMERAL != 0 { owner } else { 0 };
		self.nodes.insert(actual.clone(), Node::new(data.to_vec(), acl.to_vec(), zxid, ephemeral_owner));
		if let Some(parent) = self.nodes.get_mut(&parent_path) {
			parent.children.insert(name_of(&actual).to_string());
			parent.stat.cversion += 1;
			parent.stat.num_children = parent.children.len() as i32;
			parent.stat.pzxid = zxid;
		}

		self.fire(false, &actual, EventType::Created);
		self.fire(true, &parent_path, EventType::Child);
		Ok(actual)
	}

	fn delete(&mut self, path: &str, version: i32) -> Result<(), ErrorCode> {
		if path == "/" {
			return Err(ErrorCode::BadArguments);
		}
		let node = self.nodes.get(path).ok_or(ErrorCode::NoNode)?;
		if version != -1 && version != node.stat.version {
			return Err(ErrorCode::BadVersion);
		}
		if !node.children.is_empty() {
			return Err(ErrorCode::NotEmpty);
		}

		self.nodes.remove(path);
		self.zxid += 1;
		let parent_path = parent_of(path).to_string();
		if let Some(parent) = self.nodes.get_mut(&parent_path) {
			parent.children.remove(name_of(path));
			parent.stat.cversion += 1;
			parent.stat.num_children = parent.children.len() as i32;
			parent.stat.pzxid = self.zxid;
		}

		self.fire(false, path, EventType::Deleted);
		self.fire(true, path, EventType::Deleted);
		self.fire(true, &parent_path, EventType::Child);
		Ok(())
	}

	fn set(&mut self, path: &str, data: Vec<u8>, version: i32) -> Result<RawStat, ErrorCode> {
		let zxid = self.zxid + 1;
		let node = self.nodes.get_mut(path).ok_or(ErrorCode::NoNode)?;
		if version != -1 && version != node.stat.version {
			return Err(ErrorCode::BadVersion);
		}
		node.stat.data_length = data.len() as i32;
		node.data = data;
		node.stat.version += 1;
		node.stat.mzxid = zxid;
		node.stat.mtime = now_millis();
		let stat = node.stat;
		self.zxid = zxid;

		self.fire(false, path, EventType::Changed);
		Ok(stat)
	}

	fn set_acl(&mut self, path: &str, version: i32, acl: Vec<Acl>) -> Result<(), ErrorCode> {
		if acl.is_empty() {
			return Err(ErrorCode::InvalidAcl);
		}
		let node = self.nodes.get_mut(path).ok_or(ErrorCode::NoNode)?;
		if version != -1 && version != node.stat.aversion {
			return Err(ErrorCode::BadVersion);
		}
		node.acl = acl;
		node.stat.aversion += 1;
		Ok(())
	}

	fn children_of(&self, path: &str) -> Option<(Vec<String>, RawStat)> {
		self.nodes.get(path).map(|node| (node.children.iter().cloned().collect(), node.stat))
	}

	fn remove_ephemerals(&mut self, owner: i64) {
		let mut owned: Vec<String> = self
			.nodes
			.iter()
			.filter(|(_, node)| node.stat.ephemeral_owner == owner)
			.map(|(path, _)| path.clone())
			.collect();
		owned.sort_by_key(|path| std::cmp::Reverse(path.len()));
		for path in owned {
			let _ = self.delete(&path, -1);
		}
	}

	fn add_watch(&mut self, child: bool, path: &str, target: WatchTarget) {
		if target.watch == Watch::None {
			return;
		}
		let watches = if child { &mut self.child_watches } else { &mut self.data_watches };
		watches.entry(path.to_string()).or_default().push(target);
	}

	fn fire(&mut self, child: bool, path: &str, kind: EventType) {
		let watches = if child { &mut self.child_watches } else { &mut self.data_watches };
		if let Some(targets) = watches.remove(path) {
			for target in targets {
				self.fired.push((target, WatchedEvent::node(kind, path)));
			}
		}
	}

	/// Hands triggered notifications to their connections. Notifications for
	/// the connection currently processing go straight to `own`; with `None`
	/// they are dropped.
	fn route_fired(&mut self, index: usize, mut own: Option<&mut Deliveries>) {
		for (target, event) in std::mem::take(&mut self.fired) {
			let delivery = match target.watch {
				Watch::None => continue,
				Watch::Session => Delivery::Session(event),
				Watch::Callback(token) => Delivery::Watch { token, event },
			};
			if target.client == index {
				if let Some(sink) = own.as_deref_mut() {
					if self.clients[index].generation == target.generation {
						sink.push(delivery);
					}
				}
				continue;
			}
			let Some(slot) = self.clients.get_mut(target.client) else {
				continue;
			};
			if slot.generation != target.generation {
				continue;
			}
			if let Some(conn) = slot.connection.as_mut() {
				conn.inbox.push_back(delivery);
			}
		}
	}
}

/// One call made by a session to its reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorCall {
	RegisterFd { fd: RawFd, readable: bool, writable: bool },
	UnregisterFd(RawFd),
	StartTimer { delay: Duration, interval: Duration },
	StopTimer,
}

/// Reactor that records calls and runs on a manual clock. Clones share state.
#[derive(Clone)]
pub struct RecordingReactor {
	log: Arc<Mutex<ReactorLog>>,
}

struct ReactorLog {
	calls: Vec<ReactorCall>,
	origin: Instant,
	elapsed: Duration,
	registered: Option<(RawFd, bool, bool)>,
	timer: Option<(Duration, Duration)>,
}

impl RecordingReactor {
	pub fn new() -> Self {
		Self {
			log: Arc::new(Mutex::new(ReactorLog {
				calls: Vec::new(),
				origin: Instant::now(),
				elapsed: Duration::ZERO,
				registered: None,
				timer: None,
			})),
		}
	}

	/// Moves the manual clock forward.
	pub fn advance(&self, by: Duration) {
		self.log.lock().elapsed += by;
	}

	pub fn calls(&self) -> Vec<ReactorCall> {
		self.log.lock().calls.clone()
	}

	/// Returns and clears the recorded calls.
	pub fn take_calls(&self) -> Vec<ReactorCall> {
		std::mem::take(&mut self.log.lock().calls)
	}

	/// Current descriptor registration as `(fd, readable, writable)`.
	pub fn registered(&self) -> Option<(RawFd, bool, bool)> {
		self.log.lock().registered
	}

	/// Current timer as `(delay, interval)`.
	pub fn timer(&self) -> Option<(Duration, Duration)> {
		self.log.lock().timer
	}
}

impl Default for RecordingReactor {
	fn default() -> Self {
		Self::new()
	}
}

impl Reactor for RecordingReactor {
	fn register_fd(&mut self, fd: RawFd, readable: bool, writable: bool) {
		let mut log = self.log.lock();
		log.registered = Some((fd, readable, writable));
		log.calls.push(ReactorCall::RegisterFd { fd, readable, writable });
	}

	fn unregister_fd(&mut self, fd: RawFd) {
		let mut log = self.log.lock();
		if log.registered.is_some_and(|(current, _, _)| current == fd) {
			log.registered = None;
		}
		log.calls.push(ReactorCall::UnregisterFd(fd));
	}

	fn start_timer(&mut self, delay: Duration, interval: Duration) {
		let mut log = self.log.lock();
		log.timer = Some((delay, interval));
		log.calls.push(ReactorCall::StartTimer { delay, interval });
	}

	fn stop_timer(&mut self) {
		let mut log = self.log.lock();
		log.timer = None;
		log.calls.push(ReactorCall::StopTimer);
	}

	fn now(&self) -> Instant {
		let log = self.log.lock();
		log.origin + log.elapsed
	}
}
