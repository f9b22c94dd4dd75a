//! File specifiers: the configured sources of log entries

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::FileSpecKind;

const GLOB_CHARS: &[char] = &['*', '?', '[', ']'];

/// A configured source of log entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// File, pattern or directory
    pub path: String,
    /// How `path` is expanded
    pub kind: FileSpecKind,
    /// Display name, or display prefix for globs and directories
    pub alias: Option<String>,
    /// Listing group, `__default__` when absent
    pub group: Option<String>,
}

impl FileSpec {
    /// Build a spec for `path`, detecting its kind from the filesystem
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let kind = detect_kind(&path);
        Self {
            path,
            kind,
            alias: None,
            group: None,
        }
    }

    /// Set the alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Set the group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(clean_group(&group.into()));
        self
    }

    /// Parse `[alias=<name>,][group=<name>,]<source>`
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts: Vec<&str> = text.split(',').collect();
        let source = parts.pop().unwrap_or_default().trim();
        if source.is_empty() {
            return Err(Error::invalid_spec(text, "missing source path"));
        }

        let mut spec = Self::new(source);
        for option in parts {
            let Some((key, value)) = option.split_once('=') else {
                return Err(Error::invalid_spec(text, format!("expected key=value, got '{option}'")));
            };
            match key.trim() {
                "alias" => spec.alias = Some(value.trim().to_string()),
                "group" => spec.group = Some(clean_group(value)),
                other => {
                    return Err(Error::invalid_spec(text, format!("unknown option '{other}'")));
                }
            }
        }

        Ok(spec)
    }
}

fn detect_kind(path: &str) -> FileSpecKind {
    if path.contains(GLOB_CHARS) {
        FileSpecKind::Glob
    } else if Path::new(path).is_dir() {
        FileSpecKind::Dir
    } else {
        FileSpecKind::File
    }
}

fn clean_group(value: &str) -> String {
    value.trim_matches(|c: char| c == '\'' || c == '"' || c.is_whitespace()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_file() {
        let spec = FileSpec::parse("/var/log/messages").unwrap();
        assert_eq!(spec.path, "/var/log/messages");
        assert_eq!(spec.kind, FileSpecKind::File);
        assert_eq!(spec.alias, None);
        assert_eq!(spec.group, None);
    }

    #[test]
    fn test_parse_options() {
        let spec = FileSpec::parse("alias=nginx,group=' web ',/var/log/nginx/*.log").unwrap();
        assert_eq!(spec.path, "/var/log/nginx/*.log");
        assert_eq!(spec.kind, FileSpecKind::Glob);
        assert_eq!(spec.alias.as_deref(), Some("nginx"));
        assert_eq!(spec.group.as_deref(), Some("web"));
    }

    #[test]
    fn test_parse_directory() {
        let dir = tempfile::tempdir().unwrap();
        let spec = FileSpec::parse(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(spec.kind, FileSpecKind::Dir);
    }

    #[test]
    fn test_glob_characters() {
        for source in ["a/*.log", "a/?.log", "a/[ab].log"] {
            assert_eq!(FileSpec::new(source).kind, FileSpecKind::Glob, "{source}");
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(FileSpec::parse("").is_err());
        assert!(FileSpec::parse("alias=x,").is_err());
        assert!(FileSpec::parse("colour=red,/tmp/a.log").is_err());
        assert!(FileSpec::parse("noequals,/tmp/a.log").is_err());
    }
}
