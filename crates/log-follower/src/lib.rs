//! Runtime-agnostic line followers backed by child processes
//!
//! A [`Follower`] binds one child process (by default `tail -F`) to one log
//! file and exposes its output as a stream of whole lines, optionally
//! filtered by a grep [`Pattern`]. Processes are started through the
//! [`Launcher`] trait so callers can substitute their own process source.
//!
//! The crate does not spawn tasks itself; the caller decides how the line
//! stream is driven (e.g. `smol::spawn`).

#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod event;
pub mod follower;
pub mod launcher;
pub mod local;
pub mod process;

pub use command::{Command, CommandTemplate, Expansion};
pub use error::{Error, Result};
pub use event::{LineEvent, LineFilter, LineSource, NoOpFilter, Pattern};
pub use follower::{FollowMode, Follower, FollowerId, FollowerLines};
pub use launcher::Launcher;
pub use local::{LocalLauncher, LocalLineStream, LocalProcessHandle};
pub use process::{ExitStatus, ProcessHandle};
