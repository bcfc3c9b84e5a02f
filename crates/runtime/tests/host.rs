//! The tokio driver against a real descriptor.
#![cfg(unix)]

use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use zk_protocol::LifecycleEvent;
use zk_runtime::fake::FakeEnsemble;
use zk_runtime::host::{TokioReactor, drive};
use zk_runtime::{SessionConfig, Sessions};

#[tokio::test]
async fn driver_runs_session_until_closed() -> anyhow::Result<()> {
	let (mut writer, reader) = UnixStream::pair()?;
	reader.set_nonblocking(true)?;

	let ensemble = FakeEnsemble::new();
	let client = ensemble.client();
	client.set_fd(Some(reader.as_raw_fd()));
	client.set_interest_timeout(Duration::from_millis(20));

	let reactor = TokioReactor::new();
	let sessions = Sessions::new();
	let id = sessions.insert(Box::new(client.clone()), Box::new(reactor.clone()));
	let mut events = sessions.with(id, |s| s.subscribe())?;
	sessions.with(id, |s| s.init(&SessionConfig::new("fake:2181")))??;

	let closer = sessions.clone();
	sessions.with(id, |s| {
		s.sync(
			"/",
			Box::new(move |status| {
				assert!(status.is_ok());
				closer.with(id, |s| s.close(0)).expect("session should exist");
			}),
		)
	})??;

	writer.write_all(b"x")?;
	tokio::time::timeout(Duration::from_secs(5), drive(&sessions, id, &reactor)).await??;

	assert_eq!(events.try_recv()?, LifecycleEvent::Connect { path: None });
	assert_eq!(events.try_recv()?, LifecycleEvent::Close { code: 0 });
	assert_eq!(client.closes(), 1);
	Ok(())
}

#[tokio::test]
async fn driver_keeps_session_alive_without_io() -> anyhow::Result<()> {
	let (_writer, reader) = UnixStream::pair()?;
	reader.set_nonblocking(true)?;

	let ensemble = FakeEnsemble::new();
	let client = ensemble.client();
	client.set_fd(Some(reader.as_raw_fd()));
	client.set_auto_connect(false);
	client.set_interest_timeout(Duration::from_millis(10));

	let reactor = TokioReactor::new();
	let sessions = Sessions::new();
	let id = sessions.insert(Box::new(client.clone()), Box::new(reactor.clone()));
	sessions.with(id, |s| s.init(&SessionConfig::new("fake:2181")))??;

	// Nothing is readable; only the keep-alive timer can wake the driver.
	let outcome = tokio::time::timeout(Duration::from_millis(100), drive(&sessions, id, &reactor)).await;
	assert!(outcome.is_err(), "driver should still be running");
	assert!(client.processed().is_empty());
	assert!(!sessions.with(id, |s| s.is_closed())?);
	Ok(())
}
