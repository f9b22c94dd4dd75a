//! Control over a follower's child process

use crate::error::Result;
use async_trait::async_trait;

/// Signals and reaping for one spawned follower child.
///
/// Dropping a handle must not leave the child running.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// OS process id, `None` once reaped
    fn pid(&self) -> Option<u32>;

    /// Reap the child if it already exited
    fn try_wait(&mut self) -> Result<Option<ExitStatus>>;

    /// Reap the child, waiting for it to exit
    async fn wait(&mut self) -> Result<ExitStatus>;

    /// Ask the child to stop (SIGTERM)
    async fn terminate(&mut self) -> Result<()>;

    /// Stop the child unconditionally (SIGKILL)
    async fn kill(&mut self) -> Result<()>;
}

/// How a follower child ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code, absent when a signal ended the child
    pub code: Option<i32>,
    /// Terminating signal
    #[cfg(unix)]
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// The follow command gave up on its own with exit code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The child was stopped by a signal, usually ours
    pub fn signalled(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        use std::os::unix::process::ExitStatusExt;

        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: status.signal(),
        }
    }
}
