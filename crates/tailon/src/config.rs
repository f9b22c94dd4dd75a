//! Server configuration
//!
//! Loaded from a YAML file with kebab-case keys. Every key is optional;
//! command line flags are applied on top by the binary.

use log_follower::CommandTemplate;
use log_registry::FileSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A file entry is not a valid filespec
    #[error(transparent)]
    FileSpec(#[from] log_registry::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Page title
    pub title: String,
    /// Path prefix every route lives under
    pub relative_root: String,
    /// TCP `host:port` addresses or Unix socket paths
    pub listen_addr: Vec<String>,
    /// Serve `files/?path=` downloads
    pub allow_download: bool,
    /// History lines the client requests by default
    pub tail_lines_initial: usize,
    /// Server-wide cap on concurrently running followers, at least 2
    pub max_followers: usize,
    /// How long a handover waits for the new follower's first line
    pub handover_grace_ms: u64,
    /// How long a follower gets between SIGTERM and SIGKILL
    pub stop_timeout_ms: u64,
    /// Per-connection outbound frame queue length
    pub output_queue: usize,
    /// Child program templates
    pub commands: Commands,
    /// Log sources
    pub files: Vec<FileSpecConfig>,
}

/// Child program templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    /// Follow command, see [`CommandTemplate`]
    pub tail: Vec<String>,
}

/// A log source as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileSpecConfig {
    /// `[alias=..,][group=..,]<path>`
    Spec(String),
    /// Explicit fields
    Detailed {
        /// File, glob or directory
        path: String,
        /// Display name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        /// Listing group
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group: Option<String>,
    },
}

impl FileSpecConfig {
    /// Resolve into a registry spec
    pub fn to_filespec(&self) -> Result<FileSpec> {
        match self {
            FileSpecConfig::Spec(text) => Ok(FileSpec::parse(text)?),
            FileSpecConfig::Detailed { path, alias, group } => {
                let mut spec = FileSpec::new(path.clone());
                if let Some(alias) = alias {
                    spec = spec.with_alias(alias.clone());
                }
                if let Some(group) = group {
                    spec = spec.with_group(group.clone());
                }
                Ok(spec)
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Tailon file viewer".to_string(),
            relative_root: "/".to_string(),
            listen_addr: vec!["127.0.0.1:8080".to_string()],
            allow_download: true,
            tail_lines_initial: 10,
            max_followers: 256,
            handover_grace_ms: 250,
            stop_timeout_ms: 2000,
            output_queue: 1024,
            commands: Commands::default(),
            files: Vec::new(),
        }
    }
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            tail: CommandTemplate::tail().action().to_vec(),
        }
    }
}

impl Config {
    /// Parse YAML text, normalizing the relative root
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(text)?;
        config.relative_root = normalize_root(&config.relative_root);
        Ok(config)
    }

    /// Read and parse a config file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = async_fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml(&text)
    }

    /// The defaults as YAML, for `--help-config`
    pub fn default_yaml() -> Result<String> {
        Ok(serde_yaml::to_string(&Config::default())?)
    }

    /// Check the values that cannot be checked by the type system
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(ConfigError::ValidationError("no log files configured".into()));
        }
        if self.listen_addr.is_empty() {
            return Err(ConfigError::ValidationError("no listen address configured".into()));
        }
        // A view switch holds the old and the new follower at once.
        if self.max_followers < 2 {
            return Err(ConfigError::ValidationError("max-followers must be at least 2".into()));
        }
        if self.output_queue == 0 {
            return Err(ConfigError::ValidationError("output-queue must be at least 1".into()));
        }
        self.tail_template()?;
        Ok(())
    }

    /// Registry specs for every configured file entry
    pub fn file_specs(&self) -> Result<Vec<FileSpec>> {
        self.files.iter().map(FileSpecConfig::to_filespec).collect()
    }

    /// The follow command template
    pub fn tail_template(&self) -> Result<CommandTemplate> {
        CommandTemplate::new(self.commands.tail.iter().cloned())
            .map_err(|e| ConfigError::ValidationError(format!("commands.tail: {e}")))
    }

    /// Handover grace period
    pub fn handover_grace(&self) -> Duration {
        Duration::from_millis(self.handover_grace_ms)
    }

    /// SIGTERM to SIGKILL delay
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Ensure a leading `/` and exactly one trailing `/`
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log_registry::FileSpecKind;

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_root(""), "/");
        assert_eq!(normalize_root("/"), "/");
        assert_eq!(normalize_root("tailon"), "/tailon/");
        assert_eq!(normalize_root("/tailon"), "/tailon/");
        assert_eq!(normalize_root("tailon/tailon//"), "/tailon/tailon/");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.handover_grace(), Duration::from_millis(250));
        assert_eq!(config.commands.tail, vec!["tail", "-n", "$lines", "-F", "$path"]);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
title: "Logs"
relative-root: "logs"
listen-addr:
  - "0.0.0.0:9000"
  - "/run/tailon.sock"
allow-download: false
max-followers: 8
files:
  - "alias=app,/var/log/app.log"
  - path: /var/log/nginx/*.log
    group: web
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.title, "Logs");
        assert_eq!(config.relative_root, "/logs/");
        assert_eq!(config.listen_addr.len(), 2);
        assert!(!config.allow_download);
        assert_eq!(config.max_followers, 8);
        assert_eq!(config.tail_lines_initial, 10);

        let specs = config.file_specs().unwrap();
        assert_eq!(specs[0].alias.as_deref(), Some("app"));
        assert_eq!(specs[1].kind, FileSpecKind::Glob);
        assert_eq!(specs[1].group.as_deref(), Some("web"));
        config.validate().unwrap();
    }

    #[test]
    fn test_validation() {
        assert!(Config::default().validate().is_err());

        let mut config = Config::default();
        config.files.push(FileSpecConfig::Spec("/var/log/syslog".into()));
        config.validate().unwrap();

        config.commands.tail.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_followers_leaves_room_for_a_switch() {
        let mut config = Config::default();
        config.files.push(FileSpecConfig::Spec("/var/log/syslog".into()));

        config.max_followers = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least 2"));

        config.max_followers = 2;
        config.validate().unwrap();
    }

    #[test]
    fn test_mistyped_value_rejected() {
        assert!(Config::from_yaml("max-followers: many").is_err());
    }

    #[test]
    fn test_default_yaml_round_trips() {
        let yaml = Config::default_yaml().unwrap();
        assert!(yaml.contains("max-followers: 256"));
        assert_eq!(Config::from_yaml(&yaml).unwrap(), Config::default());
    }
}
