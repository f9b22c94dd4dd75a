//! Per-connection session state and the follower handover
//!
//! A [`Session`] owns at most one settled follower. Switching to a new
//! view is make-before-break: the new follower is started and confirmed
//! before the old one is stopped, so the client never sees a gap. For one
//! session that means one child when settled and two during a switch,
//! never more.
//!
//! Every rejected command leaves the current follower running.

use async_channel::{Receiver, Sender};
use futures::StreamExt;
use log_follower::{
    CommandTemplate, Expansion, FollowMode, Follower, FollowerId, FollowerLines, Launcher, LineEvent,
    Pattern, ProcessHandle,
};
use log_registry::{Listing, LogEntry, Registry};
use serde_json::Value;
use smol::lock::{Semaphore, SemaphoreGuardArc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::{self, Command};
use crate::error::SessionError;
use crate::protocol::ServerFrame;

/// Knobs shared by every session of a server
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Follow command template
    pub template: CommandTemplate,
    /// Upper bound on how long a handover waits for the new follower's
    /// first line before stopping the old one
    pub handover_grace: Duration,
    /// SIGTERM to SIGKILL delay when stopping a follower
    pub stop_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            template: CommandTemplate::tail(),
            handover_grace: Duration::from_millis(250),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Server-wide cap on running followers, shared by all sessions
#[derive(Debug, Clone)]
pub struct FollowerLimit {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl FollowerLimit {
    /// A limit of `max` concurrent followers
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// The configured cap
    pub fn max(&self) -> usize {
        self.max
    }

    fn try_acquire(&self) -> Option<SemaphoreGuardArc> {
        self.semaphore.try_acquire_arc()
    }
}

/// What the connection should do after a frame was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading frames
    Continue,
    /// Close the connection
    Close,
}

/// The session's side of a running follower.
///
/// The follower itself and its limit slot live in the forwarder task, which
/// reaps the child when it exits on its own.
struct ActiveFollower {
    id: FollowerId,
    pid: Option<u32>,
    path: String,
    stop: Sender<()>,
    ended: Arc<AtomicBool>,
    forwarder: smol::Task<()>,
}

impl ActiveFollower {
    fn is_live(&self) -> bool {
        !self.ended.load(Ordering::SeqCst)
    }
}

/// One client's view onto the registry
pub struct Session<L: Launcher> {
    id: Uuid,
    registry: Arc<Registry>,
    launcher: Arc<L>,
    settings: Arc<SessionSettings>,
    limit: FollowerLimit,
    outbound: Sender<ServerFrame>,
    current: Option<ActiveFollower>,
    followers_started: u64,
}

impl<L: Launcher> Session<L> {
    /// Create a session that writes its frames to `outbound`
    pub fn new(
        registry: Arc<Registry>,
        launcher: Arc<L>,
        settings: Arc<SessionSettings>,
        limit: FollowerLimit,
        outbound: Sender<ServerFrame>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry,
            launcher,
            settings,
            limit,
            outbound,
            current: None,
            followers_started: 0,
        }
    }

    /// Session identifier used in log output
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Path of the entry being followed, if its follower is still running
    pub fn current_path(&self) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|active| active.is_live())
            .map(|active| active.path.as_str())
    }

    /// Pids of the running children this session owns
    pub fn live_pids(&self) -> Vec<u32> {
        self.current
            .iter()
            .filter(|active| active.is_live())
            .filter_map(|active| active.pid)
            .collect()
    }

    /// The registry listing, freshly stat-ed
    pub async fn handle_list(&self) -> Listing {
        list_entries(self.registry.clone()).await
    }

    /// Follow `entry` verbatim, replaying `nlines` of history first
    pub async fn handle_tail(&mut self, entry: &LogEntry, nlines: usize) -> Result<(), SessionError> {
        let entry = resolve(self.registry.clone(), &entry.path).await?;
        self.follow(entry, FollowMode::Tail, nlines, "").await
    }

    /// Follow the lines of `entry` matching `script`
    pub async fn handle_grep(
        &mut self,
        entry: &LogEntry,
        script: &str,
        nlines: usize,
    ) -> Result<(), SessionError> {
        let entry = resolve(self.registry.clone(), &entry.path).await?;
        let pattern = Pattern::compile(script).map_err(SessionError::InvalidScript)?;
        self.follow(entry, FollowMode::Grep(pattern), nlines, script).await
    }

    /// Run one decoded command
    pub async fn execute(&mut self, command: Command) -> Result<(), SessionError> {
        debug!(session = %self.id, command = command.name(), "Handling command");

        match command {
            Command::List => {
                let listing = list_entries(self.registry.clone()).await;
                send(&self.outbound, ServerFrame::Listing(listing)).await;
                Ok(())
            }
            Command::Tail { entry, nlines, .. } => self.handle_tail(&entry, nlines).await,
            Command::Grep { entry, script, nlines } => self.handle_grep(&entry, &script, nlines).await,
        }
    }

    /// Decode and run one raw text frame, reporting failures to the client
    pub async fn handle_text(&mut self, raw: &str) -> Flow {
        let result = match dispatch::dispatch(raw) {
            Ok(command) => self.execute(command).await,
            Err(e) => Err(e.into()),
        };
        self.report(result).await
    }

    /// Decode and run one parsed frame, reporting failures to the client
    pub async fn handle_value(&mut self, frame: Value) -> Flow {
        let result = match dispatch::decode(frame) {
            Ok(command) => self.execute(command).await,
            Err(e) => Err(e.into()),
        };
        self.report(result).await
    }

    /// Send the error frame for a failed command, if it failed
    pub async fn report(&mut self, result: Result<(), SessionError>) -> Flow {
        let Err(err) = result else {
            return Flow::Continue;
        };

        warn!(session = %self.id, kind = %err.kind(), error = %err, "Command rejected");
        send(&self.outbound, ServerFrame::error(&err)).await;

        if err.is_fatal() {
            warn!(session = %self.id, "Process creation refused by the OS, closing session");
            Flow::Close
        } else {
            Flow::Continue
        }
    }

    /// Stop the current follower. The session can still be used afterwards.
    pub async fn close(&mut self) {
        if let Some(active) = self.current.take() {
            retire(active).await;
        }
        debug!(session = %self.id, "Session closed");
    }

    async fn follow(
        &mut self,
        entry: LogEntry,
        mode: FollowMode,
        nlines: usize,
        script: &str,
    ) -> Result<(), SessionError> {
        let slot = self
            .limit
            .try_acquire()
            .ok_or(SessionError::ResourceExhausted { limit: self.limit.max() })?;

        let command = self.settings.template.expand(Expansion {
            lines: nlines,
            path: &entry.path,
            script,
        });
        self.followers_started += 1;
        let id = FollowerId(self.followers_started);
        let mode_name = mode.name();

        let mut follower = Follower::start(self.launcher.as_ref(), id, command, mode)
            .await
            .map_err(SessionError::Spawn)?;

        let Some(lines) = follower.lines() else {
            return Err(SessionError::Spawn(log_follower::Error::Io(std::io::Error::other(
                "follower line sequence already taken",
            ))));
        };

        send(
            &self.outbound,
            ServerFrame::Ack {
                mode: mode_name,
                path: entry.path.clone(),
            },
        )
        .await;

        let grace = self.settings.handover_grace;
        let (first_tx, first_rx) = async_channel::bounded(1);
        let (stop_tx, stop_rx) = async_channel::bounded(1);
        let ended = Arc::new(AtomicBool::new(false));
        let pid = follower.pid();

        info!(
            session = %self.id,
            %id,
            pid,
            mode = follower.mode(),
            path = %entry.path,
            "Following"
        );

        let forwarder = smol::spawn(forward(
            Forwarder {
                follower,
                path: entry.path.clone(),
                outbound: self.outbound.clone(),
                stop: stop_rx,
                ended: ended.clone(),
                stop_timeout: self.settings.stop_timeout,
                slot,
            },
            lines,
            first_tx,
        ));

        // Confirmed once the first line arrives, the child ends its output,
        // or the grace period runs out.
        smol::future::or(
            async {
                let _ = first_rx.recv().await;
            },
            async {
                smol::Timer::after(grace).await;
            },
        )
        .await;

        let next = ActiveFollower {
            id,
            pid,
            path: entry.path,
            stop: stop_tx,
            ended,
            forwarder,
        };

        if let Some(previous) = self.current.take() {
            retire(previous).await;
        }
        self.current = Some(next);

        Ok(())
    }
}

async fn list_entries(registry: Arc<Registry>) -> Listing {
    smol::unblock(move || registry.list()).await
}

async fn resolve(registry: Arc<Registry>, path: &str) -> Result<LogEntry, SessionError> {
    let wanted = path.to_string();
    smol::unblock(move || registry.lookup(&wanted))
        .await
        .ok_or_else(|| SessionError::UnknownEntry(path.to_string()))
}

async fn send(outbound: &Sender<ServerFrame>, frame: ServerFrame) {
    let name = frame.name();
    if outbound.send(frame).await.is_err() {
        debug!(frame = name, "Outbound queue closed, dropping frame");
    }
}

/// Stop forwarding, then wait until the child is reaped and its slot freed.
async fn retire(active: ActiveFollower) {
    debug!(id = %active.id, path = %active.path, "Retiring follower");
    let _ = active.stop.try_send(());
    active.forwarder.await;
}

/// Everything the forwarder task owns for one follower
struct Forwarder<H: ProcessHandle> {
    follower: Follower<H>,
    path: String,
    outbound: Sender<ServerFrame>,
    stop: Receiver<()>,
    ended: Arc<AtomicBool>,
    stop_timeout: Duration,
    slot: SemaphoreGuardArc,
}

enum Step {
    Line(Option<LineEvent>),
    Sent(bool),
    Stop,
}

async fn stop_requested(stop: &Receiver<()>) -> Step {
    // A dropped session counts as a stop request.
    let _ = stop.recv().await;
    Step::Stop
}

/// Forward follower lines until the session stops it or the child exits.
///
/// Either way the child is stopped and reaped here, and the limit slot is
/// released when the task finishes.
async fn forward<H: ProcessHandle + 'static>(
    task: Forwarder<H>,
    mut lines: FollowerLines,
    first_output: Sender<()>,
) {
    let Forwarder {
        mut follower,
        path,
        outbound,
        stop,
        ended,
        stop_timeout,
        slot,
    } = task;
    let mut first_output = Some(first_output);

    let exited = loop {
        let step = smol::future::or(async { Step::Line(lines.next().await) }, stop_requested(&stop)).await;
        let event = match step {
            Step::Line(Some(event)) => event,
            Step::Line(None) => break !lines.was_stopped(),
            Step::Sent(_) | Step::Stop => break false,
        };

        if let Some(signal) = first_output.take() {
            let _ = signal.try_send(());
        }

        let sent = smol::future::or(
            async { Step::Sent(outbound.send(ServerFrame::Line(event)).await.is_ok()) },
            stop_requested(&stop),
        )
        .await;
        if !matches!(sent, Step::Sent(true)) {
            break false;
        }
    };

    if let Err(e) = follower.stop(stop_timeout).await {
        warn!(id = %follower.id(), %path, error = %e, "Failed to stop follower");
    }
    ended.store(true, Ordering::SeqCst);
    drop(slot);

    if exited {
        debug!(%path, "Follower output ended");
        let _ = outbound.send(ServerFrame::End { path }).await;
    }
}
