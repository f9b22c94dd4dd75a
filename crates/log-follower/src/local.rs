//! Local process launcher

use async_process::Child;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::event::LineEvent;
use crate::launcher::Launcher;
use crate::process::{ExitStatus, ProcessHandle};

/// Launcher for executing processes locally
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

/// A handle to control a local process
pub struct LocalProcessHandle {
    /// The underlying child process
    child: Child,
    /// Set once the exit status has been collected
    reaped: bool,
}

/// Interleaved stdout/stderr lines of a local process
pub struct LocalLineStream {
    stdout: Option<BoxStream<'static, String>>,
    stderr: Option<BoxStream<'static, String>>,
    /// Which pipe gets polled first next time, so a chatty stdout cannot
    /// starve stderr
    stderr_first: bool,
}

#[async_trait]
impl Launcher for LocalLauncher {
    type EventStream = LocalLineStream;
    type Handle = LocalProcessHandle;

    async fn launch(&self, command: Command) -> Result<(Self::EventStream, Self::Handle)> {
        let mut child = command.prepare().spawn().map_err(|e| {
            Error::spawn_failed(command.get_program().to_string_lossy(), e)
        })?;

        debug!(pid = child.id(), command = %command.display(), "Spawned child process");

        let stdout = child.stdout.take().map(pipe_lines);
        let stderr = child.stderr.take().map(pipe_lines);

        let events = LocalLineStream {
            stdout,
            stderr,
            stderr_first: false,
        };

        let handle = LocalProcessHandle {
            child,
            reaped: false,
        };

        Ok((events, handle))
    }
}

impl LocalProcessHandle {
    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal;
        use nix::unistd::Pid;

        if self.reaped {
            return Ok(());
        }

        let pid = Pid::from_raw(self.child.id() as i32);
        match signal::kill(pid, signal) {
            // Already gone; nothing left to signal.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::signal_failed(signal as i32, e.to_string())),
        }
    }
}

#[async_trait]
impl ProcessHandle for LocalProcessHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        let status = self.child.try_status()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status.map(ExitStatus::from))
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.status().await?;
        self.reaped = true;
        Ok(ExitStatus::from(status))
    }

    async fn terminate(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal(nix::sys::signal::Signal::SIGTERM)
        }

        #[cfg(not(unix))]
        {
            self.kill().await
        }
    }

    async fn kill(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal(nix::sys::signal::Signal::SIGKILL)
        }

        #[cfg(not(unix))]
        {
            if self.reaped {
                return Ok(());
            }
            self.child
                .kill()
                .map_err(|e| Error::signal_failed(-1, e.to_string()))
        }
    }
}

impl Stream for LocalLineStream {
    type Item = LineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let stderr_first = self.stderr_first;
        self.stderr_first = !stderr_first;

        for use_stderr in [stderr_first, !stderr_first] {
            let polled = if use_stderr {
                poll_pipe(&mut self.stderr, cx).map(|line| line.map(LineEvent::stderr))
            } else {
                poll_pipe(&mut self.stdout, cx).map(|line| line.map(LineEvent::stdout))
            };

            if let Poll::Ready(Some(event)) = polled {
                return Poll::Ready(Some(event));
            }
        }

        // If both pipes are closed, the stream is exhausted
        if self.stdout.is_none() && self.stderr.is_none() {
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}

/// Lines of one child pipe.
///
/// Log files are not guaranteed to be UTF-8, so bytes are split on `\n`
/// and decoded lossily. The pipe ends on EOF or a read error.
fn pipe_lines<R>(pipe: R) -> BoxStream<'static, String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(BufReader::new(pipe), |mut reader| async move {
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some((decode_line(buf), reader)),
        }
    })
    .boxed()
}

fn decode_line(mut buf: Vec<u8>) -> String {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    match String::from_utf8(buf) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Poll one pipe, dropping it once it ends
fn poll_pipe(pipe: &mut Option<BoxStream<'static, String>>, cx: &mut Context<'_>) -> Poll<Option<String>> {
    let Some(lines) = pipe else {
        return Poll::Ready(None);
    };

    match lines.poll_next_unpin(cx) {
        Poll::Ready(Some(line)) => Poll::Ready(Some(line)),
        Poll::Ready(None) => {
            *pipe = None;
            Poll::Ready(None)
        }
        Poll::Pending => Poll::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"plain\n".to_vec()), "plain");
        assert_eq!(decode_line(b"dos\r\n".to_vec()), "dos");
        assert_eq!(decode_line(b"partial".to_vec()), "partial");
    }

    #[test]
    fn test_decode_line_replaces_invalid_bytes() {
        assert_eq!(decode_line(b"caf\xe9\n".to_vec()), "caf\u{fffd}");
    }

    #[test]
    fn test_pipe_lines_keeps_going_past_invalid_bytes() {
        let input: &[u8] = b"before\nlatin1 caf\xe9\nafter\n";
        let lines: Vec<String> = smol::block_on(pipe_lines(futures_lite::io::Cursor::new(input)).collect());
        assert_eq!(lines, vec!["before", "latin1 caf\u{fffd}", "after"]);
    }
}
