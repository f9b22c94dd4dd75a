//! Core log source registry implementation

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::filespec::FileSpec;
use crate::models::{DEFAULT_GROUP, FileSpecKind, Listing, LogEntry};

/// The set of log files a server exposes.
///
/// The configured specs are immutable after construction. Globs and
/// directories are re-expanded and every entry is re-stat-ed on each
/// [`Registry::list`] or [`Registry::lookup`], so files that appear later
/// become visible without a restart.
#[derive(Debug, Clone)]
pub struct Registry {
    specs: Vec<FileSpec>,
}

impl Registry {
    /// Create a registry over the given specs
    pub fn new(specs: Vec<FileSpec>) -> Self {
        Self { specs }
    }

    /// Current listing, grouped in the order groups are first referenced
    pub fn list(&self) -> Listing {
        let mut listing = Listing::new();

        for spec in &self.specs {
            let group = spec.group.as_deref().unwrap_or(DEFAULT_GROUP);
            let entries = listing.entry(group.to_string()).or_default();
            entries.extend(expand(spec));
        }

        debug!(
            groups = listing.len(),
            entries = listing.values().map(Vec::len).sum::<usize>(),
            "Listed log sources"
        );
        listing
    }

    /// Freshly stat-ed entry whose path is exactly `path`
    pub fn lookup(&self, path: &str) -> Option<LogEntry> {
        self.specs
            .iter()
            .flat_map(expand)
            .find(|entry| entry.path == path)
    }

    /// Whether `path` is currently part of the registry
    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }
}

fn expand(spec: &FileSpec) -> Vec<LogEntry> {
    match spec.kind {
        FileSpecKind::File => {
            let alias = spec.alias.clone().unwrap_or_else(|| spec.path.clone());
            vec![LogEntry::stat(spec.path.clone(), alias)]
        }
        FileSpecKind::Glob => expand_glob(spec),
        FileSpecKind::Dir => expand_dir(spec),
    }
}

fn expand_glob(spec: &FileSpec) -> Vec<LogEntry> {
    let paths = match glob::glob(&spec.path) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(pattern = %spec.path, error = %e, "Invalid glob pattern");
            return Vec::new();
        }
    };

    paths
        .filter_map(|result| match result {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(pattern = %spec.path, error = %e, "Unreadable glob match");
                None
            }
        })
        .filter(|path| !path.is_dir())
        .map(|path| {
            let alias = match (&spec.alias, path.file_name()) {
                (Some(prefix), Some(name)) => format!("{prefix}/{}", name.to_string_lossy()),
                _ => relative_to_cwd(&path),
            };
            LogEntry::stat(path.to_string_lossy(), alias)
        })
        .collect()
}

fn expand_dir(spec: &FileSpec) -> Vec<LogEntry> {
    let root = Path::new(&spec.path);
    let mut entries = Vec::new();

    for result in WalkDir::new(root).sort_by_file_name() {
        let dir_entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %spec.path, error = %e, "Failed to walk log directory");
                continue;
            }
        };
        if !dir_entry.file_type().is_file() {
            continue;
        }

        let path = dir_entry.path();
        let alias = match &spec.alias {
            Some(prefix) => {
                let rel = path.strip_prefix(root).unwrap_or(path);
                format!("{prefix}/{}", rel.to_string_lossy())
            }
            None => relative_to_cwd(path),
        };
        entries.push(LogEntry::stat(path.to_string_lossy(), alias));
    }

    entries
}

fn relative_to_cwd(path: &Path) -> String {
    let cwd: Option<PathBuf> = std::env::current_dir().ok();
    cwd.as_deref()
        .and_then(|cwd| path.strip_prefix(cwd).ok())
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_alias_defaults_to_path() {
        let registry = Registry::new(vec![FileSpec::new("/nonexistent/a.log")]);
        let listing = registry.list();

        let entries = &listing[DEFAULT_GROUP];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].alias, "/nonexistent/a.log");
        assert!(!entries[0].exists);
    }

    #[test]
    fn test_invalid_glob_yields_nothing() {
        let registry = Registry::new(vec![FileSpec::new("/tmp/[unclosed")]);
        let listing = registry.list();
        assert!(listing[DEFAULT_GROUP].is_empty());
    }

    #[test]
    fn test_relative_to_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(relative_to_cwd(&cwd.join("logs/a.log")), "logs/a.log");
        assert_eq!(relative_to_cwd(Path::new("/elsewhere/a.log")), "/elsewhere/a.log");
    }
}
