//! Data models for log sources

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Group used when a filespec does not name one
pub const DEFAULT_GROUP: &str = "__default__";

/// Ordered mapping of group name to the entries in that group
pub type Listing = IndexMap<String, Vec<LogEntry>>;

/// One watchable file and its state at the time it was stat-ed.
///
/// `exists == false` is a normal state (rotated away, not created yet).
/// Only `path` is required when an entry is sent back by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Path as configured or matched
    pub path: String,
    /// Display name
    #[serde(default)]
    pub alias: String,
    /// Size in bytes, 0 when the file is missing
    #[serde(default)]
    pub size: u64,
    /// Last modification time, the Unix epoch when the file is missing
    #[serde(default)]
    pub mtime: DateTime<Utc>,
    /// Whether the file could be stat-ed
    #[serde(default)]
    pub exists: bool,
}

impl LogEntry {
    /// Stat `path` now. Any failure yields a non-existent entry.
    pub fn stat(path: impl Into<String>, alias: impl Into<String>) -> Self {
        let path = path.into();
        let metadata = std::fs::metadata(Path::new(&path)).ok();

        let (exists, size, mtime) = match metadata {
            Some(meta) => (
                true,
                meta.len(),
                meta.modified().map(DateTime::<Utc>::from).unwrap_or_default(),
            ),
            None => (false, 0, DateTime::<Utc>::default()),
        };

        Self {
            path,
            alias: alias.into(),
            size,
            mtime,
            exists,
        }
    }
}

/// How a filespec source is expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSpecKind {
    /// A single, possibly missing, file
    File,
    /// A shell pattern, re-evaluated on every listing
    Glob,
    /// Every file below a directory
    Dir,
}
