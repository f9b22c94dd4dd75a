//! Error types for the command protocol and sessions

use std::fmt;
use thiserror::Error;

/// A command frame that could not be decoded
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame is not valid JSON
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame is JSON but neither a command name nor a command object
    #[error("unexpected frame shape")]
    UnexpectedShape,

    /// A command object without a `command` field
    #[error("frame has no command field")]
    MissingCommand,

    /// A command name nobody handles
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A bare command name that needs arguments
    #[error("'{0}' needs an entry and nlines")]
    Incomplete(String),

    /// A known command with missing or mistyped fields
    #[error("invalid '{command}' command: {source}")]
    InvalidFields {
        /// Command name
        command: String,
        /// Decoder error
        source: serde_json::Error,
    },
}

/// Wire category of an error frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Undecodable frame
    Protocol,
    /// Unknown entry or bad script
    Validation,
    /// Child process could not be started
    Spawn,
    /// Follower cap reached or the OS refused a new process
    Resource,
}

impl ErrorKind {
    /// Name used on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::Validation => "validation",
            ErrorKind::Spawn => "spawn",
            ErrorKind::Resource => "resource",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected session command.
///
/// None of these change which follower is active.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The frame could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The entry is not known to the registry
    #[error("unknown log entry '{0}'")]
    UnknownEntry(String),

    /// The grep script does not compile
    #[error("{0}")]
    InvalidScript(#[source] log_follower::Error),

    /// The new follower's process did not start
    #[error("failed to start follower: {0}")]
    Spawn(#[source] log_follower::Error),

    /// The server-wide follower cap is reached
    #[error("too many followers (limit {limit})")]
    ResourceExhausted {
        /// Configured cap
        limit: usize,
    },
}

impl SessionError {
    /// Wire category
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Protocol(_) => ErrorKind::Protocol,
            SessionError::UnknownEntry(_) | SessionError::InvalidScript(_) => ErrorKind::Validation,
            SessionError::Spawn(e) if e.is_resource_exhaustion() => ErrorKind::Resource,
            SessionError::Spawn(_) => ErrorKind::Spawn,
            SessionError::ResourceExhausted { .. } => ErrorKind::Resource,
        }
    }

    /// Whether the session must end after reporting this error.
    ///
    /// Only an OS refusal to create processes qualifies; hitting the
    /// configured cap does not.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Spawn(e) if e.is_resource_exhaustion())
    }
}
