//! A single child process bound to one log file, exposed as a line stream

use futures::stream::Stream;
use futures_lite::future;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::Result;
use crate::event::{LineEvent, LineFilter, NoOpFilter, Pattern};
use crate::launcher::Launcher;
use crate::process::ProcessHandle;

/// What a follower emits
#[derive(Debug, Clone)]
pub enum FollowMode {
    /// Every line
    Tail,
    /// Only stdout lines matching the pattern
    Grep(Pattern),
}

impl FollowMode {
    /// Protocol name of the mode
    pub fn name(&self) -> &'static str {
        match self {
            FollowMode::Tail => "tail",
            FollowMode::Grep(_) => "grep",
        }
    }

    fn into_filter(self) -> Box<dyn LineFilter> {
        match self {
            FollowMode::Tail => Box::new(NoOpFilter),
            FollowMode::Grep(pattern) => Box::new(pattern),
        }
    }
}

/// Identifies a follower within its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FollowerId(pub u64);

impl fmt::Display for FollowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "follower-{}", self.0)
    }
}

/// One running child process and the lines it produces.
///
/// The process is started by [`Follower::start`] and lives until
/// [`Follower::stop`] or until the follower is dropped.
pub struct Follower<H: ProcessHandle> {
    id: FollowerId,
    mode: &'static str,
    pid: Option<u32>,
    handle: Option<H>,
    lines: Option<FollowerLines>,
    stopped: Arc<AtomicBool>,
}

/// The line sequence of a follower.
///
/// Yields whole lines only. Ends when the follower is stopped or when the
/// child closes its output.
pub struct FollowerLines {
    inner: Pin<Box<dyn Stream<Item = LineEvent> + Send>>,
    filter: Box<dyn LineFilter>,
    stopped: Arc<AtomicBool>,
}

impl<H: ProcessHandle + 'static> Follower<H> {
    /// Spawn the child for `command` and bind it to `mode`
    pub async fn start<L>(launcher: &L, id: FollowerId, command: Command, mode: FollowMode) -> Result<Self>
    where
        L: Launcher<Handle = H>,
    {
        let (events, handle) = launcher.launch(command.clone()).await?;
        let pid = handle.pid();
        let mode_name = mode.name();

        info!(%id, pid, mode = mode_name, command = %command.display(), "Follower started");

        let stopped = Arc::new(AtomicBool::new(false));
        let lines = FollowerLines {
            inner: Box::pin(events),
            filter: mode.into_filter(),
            stopped: stopped.clone(),
        };

        Ok(Self {
            id,
            mode: mode_name,
            pid,
            handle: Some(handle),
            lines: Some(lines),
            stopped,
        })
    }
}

impl<H: ProcessHandle> Follower<H> {
    /// Follower identifier
    pub fn id(&self) -> FollowerId {
        self.id
    }

    /// Process ID of the child, if the platform reports one
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `tail` or `grep`
    pub fn mode(&self) -> &'static str {
        self.mode
    }

    /// Whether [`Follower::stop`] has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Take the line sequence. It can be taken once; later calls get `None`.
    pub fn lines(&mut self) -> Option<FollowerLines> {
        self.lines.take()
    }

    /// Stop the child and reap it.
    ///
    /// The line sequence yields nothing after this returns. SIGTERM is sent
    /// first; if the child is still around after `timeout` it is killed.
    /// Calling this again is a no-op.
    pub async fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.lines = None;

        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        if let Some(status) = handle.try_wait()? {
            debug!(id = %self.id, pid = self.pid, ?status, "Follower already exited");
            return Ok(());
        }

        handle.terminate().await?;

        let graceful = future::or(async { Some(handle.wait().await) }, async {
            async_io::Timer::after(timeout).await;
            None
        })
        .await;

        let status = match graceful {
            Some(status) => status?,
            None => {
                warn!(id = %self.id, pid = self.pid, "Follower ignored SIGTERM, killing");
                handle.kill().await?;
                handle.wait().await?
            }
        };

        info!(id = %self.id, pid = self.pid, ?status, "Follower stopped");
        Ok(())
    }
}

impl<H: ProcessHandle> Drop for Follower<H> {
    fn drop(&mut self) {
        // The handle kills the child when it goes away.
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl FollowerLines {
    /// True if the sequence ended because the follower was stopped rather
    /// than because the child exited
    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Stream for FollowerLines {
    type Item = LineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Poll::Ready(None);
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(event)) => {
                    if self.stopped.load(Ordering::SeqCst) {
                        return Poll::Ready(None);
                    }
                    if self.filter.accept(&event.line, event.source) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
