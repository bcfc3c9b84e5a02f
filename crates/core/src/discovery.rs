//! Service registration and round-robin lookup on top of a session.
//!
//! Every instance is an ephemeral child of the directory node. The child is
//! named by the hex encoding of `host:port` and holds `host|port|weight`.
//! [`ServiceDirectory::refresh`] lists the children with a watch that lists
//! them again whenever membership changes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zk_protocol::{ErrorCode, EventType, Status, create_flags};
use zk_runtime::Result;
use zk_runtime::ops::validate_path;

use crate::zookeeper::{Chained, ZooKeeper};

pub const DEFAULT_WEIGHT: f64 = 1.0;

/// One registered instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
	pub host: String,
	pub port: u16,
	pub weight: f64,
	/// Name of the child node holding this member.
	pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemberError {
	#[error("member data is not valid UTF-8")]
	Utf8,

	#[error("expected host|port|weight, got {0} field(s)")]
	Fields(usize),

	#[error("member host is empty")]
	EmptyHost,

	#[error("invalid member port {0:?}")]
	Port(String),

	#[error("invalid member weight {0:?}")]
	Weight(String),
}

impl Member {
	pub fn new(host: impl Into<String>, port: u16, weight: f64) -> Self {
		let host = host.into();
		let name = Member::node_name(&host, port);
		Self { host, port, weight, name }
	}

	/// Child node name for an instance.
	pub fn node_name(host: &str, port: u16) -> String {
		hex::encode(format!("{host}:{port}"))
	}

	/// Node payload: `host|port|weight`.
	pub fn encode(&self) -> String {
		format!("{}|{}|{}", self.host, self.port, self.weight)
	}

	/// Parses a node payload. Fields past the third are ignored.
	pub fn parse(name: &str, data: &[u8]) -> std::result::Result<Self, MemberError> {
		let text = std::str::from_utf8(data).map_err(|_| MemberError::Utf8)?;
		let fields: Vec<&str> = text.split('|').collect();
		let [host, port, weight, ..] = fields.as_slice() else {
			return Err(MemberError::Fields(fields.len()));
		};
		if host.is_empty() {
			return Err(MemberError::EmptyHost);
		}
		let port = port.trim().parse().map_err(|_| MemberError::Port(port.to_string()))?;
		let weight = weight
			.trim()
			.parse::<f64>()
			.ok()
			.filter(|weight| weight.is_finite() && *weight >= 0.0)
			.ok_or_else(|| MemberError::Weight(weight.to_string()))?;
		Ok(Self {
			host: host.to_string(),
			port,
			weight,
			name: name.to_string(),
		})
	}
}

#[derive(Debug, Default)]
struct Directory {
	members: Vec<Member>,
	cursor: usize,
	generation: u64,
	subscribers: Vec<mpsc::UnboundedSender<Vec<Member>>>,
}

/// Members fetched so far by one refresh.
struct Gather {
	remaining: usize,
	found: Vec<Member>,
}

/// Service membership kept under one directory node.
#[derive(Debug, Clone)]
pub struct ServiceDirectory {
	zk: ZooKeeper,
	base: String,
	state: Rc<RefCell<Directory>>,
}

impl ServiceDirectory {
	pub fn new(zk: ZooKeeper, base: impl Into<String>) -> Result<Self> {
		let base = base.into();
		validate_path(&base, false)?;
		Ok(Self {
			zk,
			base,
			state: Rc::default(),
		})
	}

	pub fn base(&self) -> &str {
		&self.base
	}

	fn member_path(&self, name: &str) -> String {
		if self.base == "/" {
			format!("/{name}")
		} else {
			format!("{}/{name}", self.base)
		}
	}

	/// Registers an instance, creating the directory node first if needed.
	pub fn register(&self, host: &str, port: u16, weight: f64, callback: impl FnOnce(Status) + 'static) -> Result<()> {
		let member = Member::new(host, port, weight);
		let path = self.member_path(&member.name);
		let done = Chained::new(callback);
		let zk = self.zk.clone();
		self.zk.mkdirp(&self.base, move |status| {
			if !status.is_ok() {
				warn!(target = "zk.discovery", path = %path, rc = %status.rc, "cannot create service directory");
				return done.finish(status);
			}
			let created = done.clone();
			let registered = path.clone();
			let issued = zk.create(&path, member.encode(), create_flags::EPHEMERAL, move |status, _| {
				if status.is_ok() {
					info!(target = "zk.discovery", path = %registered, "member registered");
				}
				created.finish(status);
			});
			if let Err(err) = issued {
				done.fail(&err);
			}
		})
	}

	pub fn unregister(&self, host: &str, port: u16, callback: impl FnOnce(Status) + 'static) -> Result<()> {
		let path = self.member_path(&Member::node_name(host, port));
		self.zk.delete(&path, -1, callback)
	}

	/// Creates the directory node if needed, then lists it and fetches members
	/// not seen before.
	///
	/// The listing carries a child watch, so membership changes trigger another
	/// refresh. Results of an older refresh that finish after a newer one are
	/// discarded.
	pub fn refresh(&self) -> Result<()> {
		let generation = {
			let mut state = self.state.borrow_mut();
			state.generation += 1;
			state.generation
		};
		let directory = self.clone();
		self.zk.mkdirp(&self.base, move |status| {
			if !status.is_ok() {
				warn!(target = "zk.discovery", base = %directory.base, rc = %status.rc, "cannot create service directory");
				return;
			}
			if let Err(err) = directory.list(generation) {
				warn!(target = "zk.discovery", base = %directory.base, error = %err, "cannot list service directory");
			}
		})
	}

	fn list(&self, generation: u64) -> Result<()> {
		let watcher = self.clone();
		let directory = self.clone();
		self.zk.w_get_children(
			&self.base,
			move |event, _| {
				if event.event_type() != Some(EventType::Child) {
					return;
				}
				if let Err(err) = watcher.refresh() {
					warn!(target = "zk.discovery", base = %watcher.base, error = %err, "cannot refresh after membership change");
				}
			},
			None,
			move |status, children| directory.on_children(generation, status, children),
		)
	}

	fn on_children(&self, generation: u64, status: Status, children: Option<Vec<String>>) {
		match status.rc {
			ErrorCode::Ok => {}
			ErrorCode::NoNode => {
				debug!(target = "zk.discovery", base = %self.base, "service directory removed, recreating");
				self.publish(generation, Vec::new());
				if let Err(err) = self.refresh() {
					warn!(target = "zk.discovery", base = %self.base, error = %err, "cannot refresh service directory");
				}
				return;
			}
			rc => {
				warn!(target = "zk.discovery", base = %self.base, rc = %rc, "cannot list service directory");
				return;
			}
		}

		let known: HashMap<String, Member> = self.state.borrow().members.iter().map(|member| (member.name.clone(), member.clone())).collect();
		let mut found = Vec::new();
		let mut fetch = Vec::new();
		for name in children.unwrap_or_default() {
			match known.get(&name) {
				Some(member) => found.push(member.clone()),
				None => fetch.push(name),
			}
		}
		if fetch.is_empty() {
			return self.publish(generation, found);
		}

		let gather = Rc::new(RefCell::new(Gather {
			remaining: fetch.len(),
			found,
		}));
		for name in fetch {
			let path = self.member_path(&name);
			let directory = self.clone();
			let pending = Rc::clone(&gather);
			let issued = self.zk.get(&path, false, move |status, _, data| {
				let member = match (status.rc, data) {
					(ErrorCode::Ok, Some(data)) => Member::parse(&name, &data)
						.inspect_err(|err| warn!(target = "zk.discovery", node = %name, error = %err, "skipping malformed member"))
						.ok(),
					(rc, _) => {
						debug!(target = "zk.discovery", node = %name, rc = %rc, "member vanished before fetch");
						None
					}
				};
				directory.gathered(generation, &pending, member);
			});
			if let Err(err) = issued {
				warn!(target = "zk.discovery", path = %path, error = %err, "cannot fetch member");
				self.gathered(generation, &gather, None);
			}
		}
	}

	fn gathered(&self, generation: u64, gather: &RefCell<Gather>, member: Option<Member>) {
		let members = {
			let mut gather = gather.borrow_mut();
			gather.found.extend(member);
			gather.remaining = gather.remaining.saturating_sub(1);
			if gather.remaining > 0 {
				return;
			}
			std::mem::take(&mut gather.found)
		};
		self.publish(generation, members);
	}

	fn publish(&self, generation: u64, mut members: Vec<Member>) {
		let mut state = self.state.borrow_mut();
		if state.generation != generation {
			debug!(target = "zk.discovery", base = %self.base, generation, "discarding stale listing");
			return;
		}
		members.sort_by(|a, b| a.name.cmp(&b.name));
		info!(target = "zk.discovery", base = %self.base, members = members.len(), "membership updated");
		state.subscribers.retain(|tx| tx.send(members.clone()).is_ok());
		state.members = members;
	}

	/// Receives the full member list after every completed refresh.
	pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<Member>> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.state.borrow_mut().subscribers.push(tx);
		rx
	}

	pub fn members(&self) -> Vec<Member> {
		self.state.borrow().members.clone()
	}

	/// Next member in round-robin order, or `None` while none are known.
	pub fn next(&self) -> Option<Member> {
		let mut state = self.state.borrow_mut();
		if state.members.is_empty() {
			return None;
		}
		let index = state.cursor % state.members.len();
		state.cursor = index + 1;
		Some(state.members[index].clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn member_payload_round_trips() {
		let member = Member::new("10.0.0.5", 8080, 2.5);
		assert_eq!(member.encode(), "10.0.0.5|8080|2.5");
		assert_eq!(Member::parse(&member.name, member.encode().as_bytes()), Ok(member));
	}

	#[test]
	fn node_name_is_hex_of_address() {
		assert_eq!(Member::node_name("a", 1), "613a31");
	}

	#[test]
	fn integral_weight_has_no_fraction() {
		assert_eq!(Member::new("h", 1, DEFAULT_WEIGHT).encode(), "h|1|1");
	}

	#[test]
	fn rejects_malformed_payloads() {
		assert_eq!(Member::parse("n", b"host|80"), Err(MemberError::Fields(2)));
		assert_eq!(Member::parse("n", b"|80|1"), Err(MemberError::EmptyHost));
		assert_eq!(Member::parse("n", b"h|http|1"), Err(MemberError::Port("http".into())));
		assert_eq!(Member::parse("n", b"h|80|-1"), Err(MemberError::Weight("-1".into())));
		assert_eq!(Member::parse("n", &[0xff, b'|', b'1', b'|', b'1']), Err(MemberError::Utf8));
	}

	#[test]
	fn extra_fields_are_ignored() {
		let member = Member::parse("n", b"h|80|3|extra").expect("payload should parse");
		assert_eq!((member.host.as_str(), member.port, member.weight), ("h", 80, 3.0));
	}
}
