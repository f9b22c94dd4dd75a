//! # Tailon
//!
//! A web server for following log files in real time. Each browser
//! connection gets a [`Session`] that runs at most one follower process
//! and switches between `tail` and `grep` views without dropping lines.

#![warn(missing_docs)]

pub mod assets;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, FileSpecConfig};
pub use dispatch::{Command, decode, dispatch};
pub use error::{ErrorKind, ProtocolError, SessionError};
pub use protocol::ServerFrame;
pub use server::{Server, ServerState};
pub use session::{FollowerLimit, Flow, Session, SessionSettings};
