//! Scan configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for scanning operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    pub root: PathBuf,

    /// Glob patterns to prune. Each is tested against an entry's bare name
    /// and its root-relative path.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Number of threads for scanning (0 = serial traversal).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns: Vec::new(),
            threads: 0,
        }
    }

    /// Replace the ignore patterns.
    pub fn with_ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .root("/home/user/repo")
            .threads(4usize)
            .ignore_patterns(vec!["target".to_string()])
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/home/user/repo"));
        assert_eq!(config.threads, 4);
        assert_eq!(config.ignore_patterns, vec!["target"]);
    }

    #[test]
    fn test_config_builder_requires_root() {
        assert!(ScanConfig::builder().build().is_err());
        assert!(ScanConfig::builder().root("").build().is_err());
    }

    #[test]
    fn test_config_simple() {
        let config = ScanConfig::new("/repo").with_ignore_patterns(["*.log", ".git"]);
        assert_eq!(config.threads, 0);
        assert_eq!(config.ignore_patterns.len(), 2);
    }
}
