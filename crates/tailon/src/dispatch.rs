//! Command dispatcher: decodes inbound frames into [`Command`]s
//!
//! Accepted shapes are a bare command name (`"list"`), a one element
//! array (`["list"]`) and a command object tagged by its `command` field.
//! Decoding is stateless; whatever comes out is handed to the session
//! unchanged.

use log_registry::LogEntry;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// A decoded client command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    /// Enumerate the registry
    List,
    /// Follow an entry verbatim
    Tail {
        /// Entry to follow, only `path` is used
        entry: LogEntry,
        /// History lines to replay first
        nlines: usize,
        /// Ignored for tail, accepted for symmetry with grep
        #[serde(default)]
        script: Option<String>,
    },
    /// Follow the lines of an entry that match `script`
    Grep {
        /// Entry to follow, only `path` is used
        entry: LogEntry,
        /// Regular expression
        script: String,
        /// History lines to scan first
        nlines: usize,
    },
}

impl Command {
    /// Command name as sent by the client
    pub fn name(&self) -> &'static str {
        match self {
            Command::List => "list",
            Command::Tail { .. } => "tail",
            Command::Grep { .. } => "grep",
        }
    }
}

const COMMANDS: &[&str] = &["list", "tail", "grep"];

/// Decode one raw text frame
pub fn dispatch(raw: &str) -> Result<Command, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    decode(value)
}

/// Decode one already parsed frame
pub fn decode(value: Value) -> Result<Command, ProtocolError> {
    match value {
        Value::String(name) => by_name(&name),
        Value::Array(items) => match items.as_slice() {
            [Value::String(name)] => by_name(name),
            _ => Err(ProtocolError::UnexpectedShape),
        },
        Value::Object(map) => {
            let name = map
                .get("command")
                .and_then(Value::as_str)
                .ok_or(ProtocolError::MissingCommand)?
                .to_string();

            if !COMMANDS.contains(&name.as_str()) {
                return Err(ProtocolError::UnknownCommand(name));
            }

            serde_json::from_value(Value::Object(map))
                .map_err(|source| ProtocolError::InvalidFields { command: name, source })
        }
        _ => Err(ProtocolError::UnexpectedShape),
    }
}

fn by_name(name: &str) -> Result<Command, ProtocolError> {
    match name {
        "list" => Ok(Command::List),
        "tail" | "grep" => Err(ProtocolError::Incomplete(name.to_string())),
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}
