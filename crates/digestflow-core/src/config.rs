//! Digest run configuration.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default buffer size of result and merge channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Default chunk size used when streaming a file through the digester.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// What a run does when a single file cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Cancel everything and fail on the first unreadable file.
    #[default]
    FailFast,
    /// Keep going, collecting every failure next to the partial table.
    CollectAll,
}

/// Configuration for a digest run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct DigestConfig {
    /// Root path to digest.
    pub root: PathBuf,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Glob patterns matched against entry names; matches are skipped.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Maximum concurrent digest workers (0 = one task per file).
    #[builder(default = "0")]
    #[serde(default)]
    pub max_workers: usize,

    /// Buffer size of the result stream.
    #[builder(default = "DEFAULT_CHANNEL_CAPACITY")]
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Chunk size for streaming file content into the digester.
    #[builder(default = "DEFAULT_READ_BUFFER_SIZE")]
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Handling of per-file read failures.
    #[builder(default)]
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Cancel the whole run after this long.
    #[builder(default)]
    #[serde(default)]
    pub timeout: Option<Duration>,
}

fn default_true() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

impl DigestConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if self.channel_capacity == Some(0) {
            return Err("Channel capacity must be at least 1".to_string());
        }
        if self.read_buffer_size == Some(0) {
            return Err("Read buffer size must be at least 1".to_string());
        }
        Ok(())
    }
}

impl DigestConfig {
    /// Create a new config builder.
    pub fn builder() -> DigestConfigBuilder {
        DigestConfigBuilder::default()
    }

    /// Create a simple config for digesting a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_symlinks: false,
            include_hidden: true,
            max_depth: None,
            ignore_patterns: Vec::new(),
            max_workers: 0,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            error_policy: ErrorPolicy::FailFast,
            timeout: None,
        }
    }

    /// Same settings, different root.
    pub fn with_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..self.clone()
        }
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }

    /// Whether workers are capped.
    pub fn is_bounded(&self) -> bool {
        self.max_workers > 0
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = DigestConfig::builder()
            .root("/home/user")
            .max_workers(4usize)
            .error_policy(ErrorPolicy::CollectAll)
            .timeout(Some(Duration::from_secs(5)))
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/home/user"));
        assert_eq!(config.max_workers, 4);
        assert!(config.is_bounded());
        assert_eq!(config.error_policy, ErrorPolicy::CollectAll);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_config_simple() {
        let config = DigestConfig::new("/home/user");
        assert!(!config.follow_symlinks);
        assert!(config.include_hidden);
        assert!(!config.is_bounded());
        assert_eq!(config.error_policy, ErrorPolicy::FailFast);
    }

    #[test]
    fn test_should_skip_hidden() {
        let mut config = DigestConfig::new("/test");
        assert!(!config.should_skip_hidden(".git"));

        config.include_hidden = false;
        assert!(config.should_skip_hidden(".git"));
        assert!(!config.should_skip_hidden("src"));
    }

    #[test]
    fn test_builder_rejects_zero_capacity() {
        let result = DigestConfig::builder()
            .root("/test")
            .channel_capacity(0usize)
            .build();
        assert!(result.is_err());

        assert!(DigestConfig::builder().build().is_err());
    }
}
