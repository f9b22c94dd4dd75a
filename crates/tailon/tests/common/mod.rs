//! Shared helpers for tailon integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use log_follower::{
    Command, ExitStatus, Launcher, LocalLauncher, LocalLineStream, LocalProcessHandle, ProcessHandle,
};
use log_registry::{FileSpec, LogEntry, Registry};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tailon::{FollowerLimit, ServerFrame, Session, SessionSettings};

/// Live and peak child counts of a [`CountingLauncher`]
#[derive(Debug, Default)]
pub struct ProcessCounter {
    live: AtomicUsize,
    peak: AtomicUsize,
    launched: AtomicUsize,
}

impl ProcessCounter {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn reset_peak(&self) {
        self.peak.store(self.live(), Ordering::SeqCst);
    }

    fn started(&self) {
        self.launched.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn ended(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Local launcher that tracks how many of its children are unreaped
#[derive(Debug, Default)]
pub struct CountingLauncher {
    pub counter: Arc<ProcessCounter>,
    fail_next: AtomicBool,
}

impl CountingLauncher {
    /// Make the next launch fail as if the program did not exist
    pub fn fail_next_launch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

/// A local process handle that reports its reaping to a counter
pub struct CountedHandle {
    inner: LocalProcessHandle,
    counter: Arc<ProcessCounter>,
    counted: bool,
}

impl CountedHandle {
    fn reaped(&mut self) {
        if self.counted {
            self.counted = false;
            self.counter.ended();
        }
    }
}

#[async_trait]
impl Launcher for CountingLauncher {
    type EventStream = LocalLineStream;
    type Handle = CountedHandle;

    async fn launch(&self, command: Command) -> log_follower::Result<(Self::EventStream, Self::Handle)> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(log_follower::Error::spawn_failed(
                command.get_program().to_string_lossy(),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        let (events, inner) = LocalLauncher.launch(command).await?;
        self.counter.started();
        Ok((
            events,
            CountedHandle {
                inner,
                counter: self.counter.clone(),
                counted: true,
            },
        ))
    }
}

#[async_trait]
impl ProcessHandle for CountedHandle {
    fn pid(&self) -> Option<u32> {
        self.inner.pid()
    }

    fn try_wait(&mut self) -> log_follower::Result<Option<ExitStatus>> {
        let status = self.inner.try_wait()?;
        if status.is_some() {
            self.reaped();
        }
        Ok(status)
    }

    async fn wait(&mut self) -> log_follower::Result<ExitStatus> {
        let status = self.inner.wait().await?;
        self.reaped();
        Ok(status)
    }

    async fn terminate(&mut self) -> log_follower::Result<()> {
        self.inner.terminate().await
    }

    async fn kill(&mut self) -> log_follower::Result<()> {
        self.inner.kill().await
    }
}

impl Drop for CountedHandle {
    fn drop(&mut self) {
        // The inner handle kills the child on drop.
        self.reaped();
    }
}

/// Settings with a short grace period
pub fn test_settings() -> SessionSettings {
    SessionSettings {
        handover_grace: Duration::from_millis(200),
        stop_timeout: Duration::from_secs(2),
        ..SessionSettings::default()
    }
}

/// A session over `registry` whose frames land in the returned receiver
pub fn session_with(
    registry: Registry,
    launcher: Arc<CountingLauncher>,
    limit: FollowerLimit,
) -> (Session<CountingLauncher>, async_channel::Receiver<ServerFrame>) {
    session_with_settings(registry, launcher, limit, test_settings())
}

/// Like [`session_with`] with explicit settings
pub fn session_with_settings(
    registry: Registry,
    launcher: Arc<CountingLauncher>,
    limit: FollowerLimit,
    settings: SessionSettings,
) -> (Session<CountingLauncher>, async_channel::Receiver<ServerFrame>) {
    let (tx, rx) = async_channel::bounded(1024);
    let session = Session::new(Arc::new(registry), launcher, Arc::new(settings), limit, tx);
    (session, rx)
}

/// Registry over the given files
pub fn registry_of(paths: &[&Path]) -> Registry {
    Registry::new(
        paths
            .iter()
            .map(|path| FileSpec::new(path.to_str().unwrap()))
            .collect(),
    )
}

/// A client-side entry reference
pub fn entry(path: &Path) -> LogEntry {
    LogEntry::stat(path.to_str().unwrap(), "")
}

/// Next frame, or `None` after `wait`
pub async fn next_frame(rx: &async_channel::Receiver<ServerFrame>, wait: Duration) -> Option<ServerFrame> {
    smol::future::or(async { rx.recv().await.ok() }, async {
        smol::Timer::after(wait).await;
        None
    })
    .await
}

/// Skip frames until one satisfies `pred`
pub async fn expect_frame<F>(rx: &async_channel::Receiver<ServerFrame>, mut pred: F) -> ServerFrame
where
    F: FnMut(&ServerFrame) -> bool,
{
    loop {
        match next_frame(rx, Duration::from_secs(5)).await {
            Some(frame) if pred(&frame) => return frame,
            Some(_) => continue,
            None => panic!("expected frame did not arrive"),
        }
    }
}

/// Whether `pid` still exists (zombies included)
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Bind a server on an ephemeral port and run it in the background
pub async fn start_server(root: &str, allow_download: bool, files: Vec<String>) -> String {
    let config = tailon::Config {
        relative_root: tailon::config::normalize_root(root),
        listen_addr: vec!["127.0.0.1:0".to_string()],
        allow_download,
        handover_grace_ms: 100,
        files: files.into_iter().map(tailon::FileSpecConfig::Spec).collect(),
        ..tailon::Config::default()
    };

    let server = tailon::Server::bind(config).await.unwrap();
    let addr = server.local_addrs()[0].clone();
    smol::spawn(server.run()).detach();
    addr
}
