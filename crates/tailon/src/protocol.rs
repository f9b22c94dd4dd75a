//! Outbound frames of the command protocol

use log_follower::LineEvent;
use log_registry::Listing;
use serde::{Serialize, Serializer};

use crate::error::{ErrorKind, SessionError};

/// One JSON text frame sent to a client
#[derive(Debug, Clone)]
pub enum ServerFrame {
    /// `{group: [entry, ...]}`
    Listing(Listing),
    /// `["o", line]` or `["e", line]`
    Line(LineEvent),
    /// `["ok", mode, path]` once a follower is running
    Ack {
        /// `tail` or `grep`
        mode: &'static str,
        /// Followed path
        path: String,
    },
    /// `["error", kind, message]`
    Error {
        /// Error category
        kind: ErrorKind,
        /// Human readable message
        message: String,
    },
    /// `["end", path]` when a child exits on its own
    End {
        /// Path whose follower ended
        path: String,
    },
}

impl ServerFrame {
    /// Error frame for a rejected command
    pub fn error(err: &SessionError) -> Self {
        ServerFrame::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Short name for log output
    pub fn name(&self) -> &'static str {
        match self {
            ServerFrame::Listing(_) => "list",
            ServerFrame::Line(_) => "line",
            ServerFrame::Ack { .. } => "ok",
            ServerFrame::Error { .. } => "error",
            ServerFrame::End { .. } => "end",
        }
    }

    /// Encode as a JSON text frame
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for ServerFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ServerFrame::Listing(listing) => listing.serialize(serializer),
            ServerFrame::Line(event) => (event.source.tag(), &event.line).serialize(serializer),
            ServerFrame::Ack { mode, path } => ("ok", mode, path).serialize(serializer),
            ServerFrame::Error { kind, message } => {
                ("error", kind.as_str(), message).serialize(serializer)
            }
            ServerFrame::End { path } => ("end", path).serialize(serializer),
        }
    }
}
