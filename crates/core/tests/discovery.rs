//! Service registration and membership tracking against the in-memory ensemble.

use std::sync::Arc;

use parking_lot::Mutex;
use zk::fake::{FakeClient, FakeEnsemble, RecordingReactor};
use zk::{DEFAULT_WEIGHT, ErrorCode, Member, Readiness, ServiceDirectory, SessionConfig, Status, ZooKeeper};

const BASE: &str = "/services/api";

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

struct Node {
	zk: ZooKeeper,
	client: FakeClient,
	directory: ServiceDirectory,
}

impl Node {
	fn join(ensemble: &FakeEnsemble) -> Self {
		init_tracing();
		let client = ensemble.client();
		let zk = ZooKeeper::new(client.clone(), RecordingReactor::new());
		zk.init(&SessionConfig::new("fake:2181")).expect("init should succeed");
		let directory = ServiceDirectory::new(zk.clone(), BASE).expect("base path should be valid");
		let node = Self { zk, client, directory };
		node.step();
		node
	}

	fn step(&self) {
		self.zk.on_io_ready(Ok(Readiness::READABLE)).expect("session should exist");
	}

	fn settle(&self, mut done: impl FnMut() -> bool) {
		for _ in 0..10 {
			if done() {
				return;
			}
			self.step();
		}
		assert!(done(), "directory did not settle");
	}

	fn register(&self, host: &str, port: u16, weight: f64) -> Status {
		let slot = Arc::new(Mutex::new(None));
		let sink = Arc::clone(&slot);
		self.directory
			.register(host, port, weight, move |status| *sink.lock() = Some(status))
			.expect("register should be issued");
		self.settle(|| slot.lock().is_some());
		let status = slot.lock().take();
		status.expect("register should complete")
	}

	fn hosts(&self) -> Vec<String> {
		self.directory.members().into_iter().map(|member| format!("{}:{}", member.host, member.port)).collect()
	}
}

#[test]
fn register_creates_ephemeral_member() {
	let ensemble = FakeEnsemble::new();
	let node = Node::join(&ensemble);

	assert!(node.register("10.0.0.1", 8080, DEFAULT_WEIGHT).is_ok());

	let path = format!("{BASE}/{}", Member::node_name("10.0.0.1", 8080));
	assert_eq!(ensemble.data(&path).as_deref(), Some(&b"10.0.0.1|8080|1"[..]));
	let stat = ensemble.stat(&path).expect("member node should exist");
	assert_ne!(stat.ephemeral_owner, 0);
}

#[test]
fn register_twice_reports_node_exists() {
	let ensemble = FakeEnsemble::new();
	let node = Node::join(&ensemble);

	assert!(node.register("10.0.0.1", 8080, DEFAULT_WEIGHT).is_ok());
	assert_eq!(node.register("10.0.0.1", 8080, DEFAULT_WEIGHT).rc, ErrorCode::NodeExists);
}

#[test]
fn refresh_round_robins_across_members() {
	let ensemble = FakeEnsemble::new();
	let node = Node::join(&ensemble);
	node.register("b.local", 80, 1.0);
	node.register("a.local", 80, 2.0);

	let mut updates = node.directory.subscribe();
	node.directory.refresh().expect("refresh should be issued");
	node.settle(|| node.directory.members().len() == 2);

	let first = node.directory.next().expect("a member should be known");
	let second = node.directory.next().expect("a member should be known");
	let third = node.directory.next().expect("a member should be known");
	assert_ne!(first.name, second.name);
	assert_eq!(first, third);
	assert_eq!(updates.try_recv().map(|members| members.len()), Ok(2));
}

#[test]
fn membership_change_triggers_refresh() {
	let ensemble = FakeEnsemble::new();
	let node = Node::join(&ensemble);
	node.register("a.local", 80, 1.0);
	node.directory.refresh().expect("refresh should be issued");
	node.settle(|| node.directory.members().len() == 1);

	node.register("b.local", 81, 1.0);
	node.settle(|| node.directory.members().len() == 2);
	assert_eq!(node.hosts().len(), 2);

	let done = Arc::new(Mutex::new(None));
	let slot = Arc::clone(&done);
	node.directory
		.unregister("a.local", 80, move |status| *slot.lock() = Some(status.rc))
		.expect("unregister should be issued");
	node.settle(|| node.directory.members().len() == 1);
	assert_eq!(*done.lock(), Some(ErrorCode::Ok));
	assert_eq!(node.hosts(), ["b.local:81"]);
}

#[test]
fn malformed_members_are_skipped() {
	let ensemble = FakeEnsemble::new();
	ensemble.seed(&format!("{BASE}/bogus"), b"not a member");
	ensemble.seed(&format!("{BASE}/{}", Member::node_name("ok.local", 9000)), b"ok.local|9000|0.5");
	let node = Node::join(&ensemble);

	let mut updates = node.directory.subscribe();
	node.directory.refresh().expect("refresh should be issued");
	node.settle(|| updates.try_recv().is_ok());

	let members = node.directory.members();
	assert_eq!(members.len(), 1);
	assert_eq!((members[0].host.as_str(), members[0].port, members[0].weight), ("ok.local", 9000, 0.5));
}

#[test]
fn refresh_creates_missing_directory() {
	let ensemble = FakeEnsemble::new();
	let node = Node::join(&ensemble);

	let mut updates = node.directory.subscribe();
	node.directory.refresh().expect("refresh should be issued");
	let mut published = None;
	node.settle(|| {
		published = published.take().or_else(|| updates.try_recv().ok());
		published.is_some()
	});

	assert_eq!(published, Some(Vec::new()));
	assert!(ensemble.exists(BASE));
	assert!(node.directory.next().is_none());
}

#[test]
fn refresh_before_first_registration_sees_later_members() {
	let ensemble = FakeEnsemble::new();
	let observer = Node::join(&ensemble);
	let mut updates = observer.directory.subscribe();
	observer.directory.refresh().expect("refresh should be issued");
	observer.settle(|| updates.try_recv().is_ok());
	assert!(observer.hosts().is_empty());

	let server = Node::join(&ensemble);
	assert!(server.register("late.local", 8000, DEFAULT_WEIGHT).is_ok());

	observer.settle(|| observer.directory.members().len() == 1);
	assert_eq!(observer.hosts(), ["late.local:8000"]);
}

#[test]
fn expired_peer_drops_out() {
	let ensemble = FakeEnsemble::new();
	let server = Node::join(&ensemble);
	let observer = Node::join(&ensemble);
	server.register("s.local", 7000, 1.0);
	observer.register("o.local", 7001, 1.0);

	observer.directory.refresh().expect("refresh should be issued");
	observer.settle(|| observer.directory.members().len() == 2);

	server.client.expire();
	observer.settle(|| observer.directory.members().len() == 1);
	assert_eq!(observer.hosts(), ["o.local:7001"]);
}

#[test]
fn rejects_relative_base() {
	let ensemble = FakeEnsemble::new();
	let zk = ZooKeeper::new(ensemble.client(), RecordingReactor::new());
	let err = ServiceDirectory::new(zk, "services").expect_err("relative base should be rejected");
	assert_eq!(err.code(), Some(ErrorCode::BadArguments));
}
