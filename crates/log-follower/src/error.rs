//! Error types for followers

use thiserror::Error;

/// Unified error type for follower operations
#[derive(Error, Debug)]
pub enum Error {
    /// The child process could not be started
    #[error("failed to spawn `{program}`: {source}")]
    SpawnFailed {
        /// Program that was being started
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The command template expanded to nothing
    #[error("command template is empty")]
    EmptyCommand,

    /// A grep script did not compile
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The rejected script
        pattern: String,
        /// Compiler diagnostic
        #[source]
        source: regex::Error,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            source,
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Whether the OS refused to create more processes.
    ///
    /// A session cannot make progress after this, unlike an ordinary spawn
    /// failure such as a missing binary.
    pub fn is_resource_exhaustion(&self) -> bool {
        #[cfg(unix)]
        {
            use nix::errno::Errno;

            if let Error::SpawnFailed { source, .. } = self {
                return matches!(
                    source.raw_os_error(),
                    Some(code) if code == Errno::EAGAIN as i32 || code == Errno::ENOMEM as i32
                );
            }
        }
        false
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
