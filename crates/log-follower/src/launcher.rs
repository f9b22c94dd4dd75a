//! Launcher trait for starting line-producing processes

use crate::command::Command;
use crate::error::Result;
use crate::event::LineEvent;
use crate::process::ProcessHandle;
use async_trait::async_trait;
use futures::stream::Stream;

/// Starts the child process behind a follower
///
/// Spawn failures must be reported from `launch` itself. A process that
/// started but has not written anything yet is a success with a pending
/// stream.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// The line stream this launcher produces
    type EventStream: Stream<Item = LineEvent> + Send + Unpin + 'static;

    /// The process handle type this launcher produces
    type Handle: ProcessHandle + 'static;

    /// Launch a command, returning its line stream and control handle
    async fn launch(&self, command: Command) -> Result<(Self::EventStream, Self::Handle)>;
}
