//! Application configuration loaded from TOML.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{ConfigError, PatternError};
use crate::pattern::GlobList;

/// Named snippets of one category, in definition order.
pub type SnippetCategory = IndexMap<String, String>;

/// All snippet categories, in definition order.
pub type SnippetCatalog = IndexMap<String, SnippetCategory>;

const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".idea",
    ".vscode",
    "*.sublime-project",
    "*.sublime-workspace",
    ".project",
    ".settings",
    "__pycache__",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    "*.egg-info",
    ".pytest_cache",
    ".mypy_cache",
    "venv",
    ".venv",
    "env",
    ".env",
    "ENV",
    "VENV",
    "build",
    "dist",
    "node_modules",
    "target",
    "*.o",
    "*.so",
    "*.a",
    "*.lib",
    "*.dll",
    "*.exe",
    ".DS_Store",
    "Thumbs.db",
    "*.log",
];

const DEFAULT_SECRET_PATTERNS: &[&str] = &[
    r"\b(AKIA[0-9A-Z]{16})\b",
    r#"(aws_secret_access_key|secret_access_key|SecretAccessKey|AWS_SECRET_ACCESS_KEY)[\s:=]+['"]?([a-zA-Z0-9/+=]{40})['"]?"#,
    r#"api[_-]?key[\s:=]+['"]?([a-zA-Z0-9_\-]{20,})['"]?"#,
    r#"secret[\s:=]+['"]?([a-zA-Z0-9_\-]{16,})['"]?"#,
    r"-----BEGIN (RSA|OPENSSH|EC|PGP) PRIVATE KEY-----",
];

const DEFAULT_QUESTIONS: &[&str] = &[
    "What is one thing you would change/improve if you could and why?",
    "Is this solution lacking? What is missing?",
    "Do you see opportunities to improve the structure?",
];

const DEFAULT_SNIPPETS: &[(&str, &[(&str, &str)])] = &[
    (
        "Objective",
        &[
            ("Concept", "Your task is to develop a concept."),
            ("Review", "Review the provided context carefully and thoroughly."),
            ("Debug", "Try to debug any errors."),
            ("Develop", "Implement a new feature or system."),
            ("Custom", ""),
        ],
    ),
    (
        "Scope",
        &[
            ("Everything", "Scope includes everything."),
            ("High-level", "Scope: High-level."),
            ("Low-level", "Scope: Low-level or details."),
            ("Custom", ""),
        ],
    ),
    (
        "Requirements",
        &[
            ("In-depth", "Your solution should be prepared in-depth."),
            ("Superficial", "A superficial solution will suffice."),
            ("High Quality", "Provide a solution of extraordinary quality."),
            (
                "Creative",
                "Provide a creative, unexpected solution, not a super predictable one.",
            ),
            ("Custom", ""),
        ],
    ),
    (
        "Constraints",
        &[
            ("2 sentences", "Explain in exactly 2 sentences."),
            ("2 paragraphs", "Explain in exactly 2 paragraphs."),
            ("500 lines of code", "Limit to 500 lines of code."),
            (
                "No placeholders",
                "Don't use placeholders, always provide the full solution.",
            ),
            ("Custom", ""),
        ],
    ),
    (
        "Process",
        &[
            ("CoT", "Chain-of-thought reasoning recommended."),
            (
                "3 iterations",
                "Iterate on this solution 3 times by reviewing it, finding improvements, and refining further.",
            ),
            ("Custom", ""),
        ],
    ),
    (
        "Output",
        &[
            ("XML", "Use an XML-styled output format."),
            ("Summary", "At the end, provide a verbose summary."),
            ("Prod-ready", "Must be production-ready."),
            (
                "Full and final",
                "Give me the full and final scripts you added or modified.",
            ),
            ("Custom", ""),
        ],
    ),
];

/// User-facing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Token budget for the assembled document.
    pub max_context_tokens: usize,

    /// Globs pruned during scanning.
    pub ignore_patterns: Vec<String>,

    /// Regular expressions whose matches are redacted.
    pub secret_patterns: Vec<String>,

    /// Tokenizer encoding name.
    pub encoding: String,

    /// Canonical follow-up questions.
    pub common_questions: Vec<String>,

    /// Instruction snippets by category.
    pub prompt_snippets: SnippetCatalog,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 8192,
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            secret_patterns: DEFAULT_SECRET_PATTERNS.iter().map(|s| s.to_string()).collect(),
            encoding: "cl100k_base".to_string(),
            common_questions: DEFAULT_QUESTIONS.iter().map(|s| s.to_string()).collect(),
            prompt_snippets: default_snippets(),
        }
    }
}

fn default_snippets() -> SnippetCatalog {
    DEFAULT_SNIPPETS
        .iter()
        .map(|(category, items)| {
            let items = items
                .iter()
                .map(|(name, text)| (name.to_string(), text.to_string()))
                .collect();
            (category.to_string(), items)
        })
        .collect()
}

impl AppConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Check that every pattern compiles and the budget is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_context_tokens == 0 {
            return Err(ConfigError::Validation {
                message: "max_context_tokens must be greater than zero".to_string(),
            });
        }
        GlobList::new(&self.ignore_patterns)?;
        for pattern in &self.secret_patterns {
            regex::Regex::new(pattern).map_err(|source| PatternError::Regex {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Default config location: `<config_dir>/promptpack/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("promptpack").join("config.toml"))
}

/// Load the application config.
///
/// An explicit path must exist and be valid. Without one, the default
/// location is used if present; a corrupt default file is moved aside to
/// `config.toml.corrupted` and defaults are returned.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    if let Some(path) = explicit {
        return AppConfig::load_from(path);
    }

    let Some(path) = default_config_path() else {
        debug!("No config directory available, using defaults");
        return Ok(AppConfig::default());
    };
    load_or_recover(&path)
}

fn load_or_recover(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(AppConfig::default());
    }

    match AppConfig::load_from(path) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded config");
            Ok(config)
        }
        Err(ConfigError::Io { path, source }) => Err(ConfigError::Io { path, source }),
        Err(err) => {
            let backup = path.with_extension("toml.corrupted");
            error!(
                path = %path.display(),
                backup = %backup.display(),
                error = %err,
                "Config is invalid, moving it aside and using defaults"
            );
            std::fs::rename(path, &backup).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(AppConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_context_tokens, 8192);
        assert!(config.ignore_patterns.iter().any(|p| p == "node_modules"));
        assert_eq!(config.secret_patterns.len(), 5);
        assert_eq!(config.common_questions.len(), 3);
    }

    #[test]
    fn test_snippet_order_is_preserved() {
        let config = AppConfig::default();
        let categories: Vec<_> = config.prompt_snippets.keys().map(String::as_str).collect();
        assert_eq!(
            categories,
            ["Objective", "Scope", "Requirements", "Constraints", "Process", "Output"]
        );
        let objective = &config.prompt_snippets["Objective"];
        assert_eq!(objective.get_index(0).map(|(k, _)| k.as_str()), Some("Concept"));
        assert_eq!(objective.get("Custom").map(String::as_str), Some(""));
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config =
            AppConfig::from_toml_str("max_context_tokens = 1000\n", Path::new("inline")).unwrap();
        assert_eq!(config.max_context_tokens, 1000);
        assert_eq!(config.encoding, "cl100k_base");
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = AppConfig::from_toml_str("secret_patterns = ['(unclosed']\n", Path::new("inline"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Pattern(PatternError::Regex { .. })));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let err = AppConfig::from_toml_str("max_context_tokens = 0\n", Path::new("inline"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let temp = TempDir::new().unwrap();
        let err = load_config(Some(&temp.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "max_context_tokens = [not toml").unwrap();

        let config = load_or_recover(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(!path.exists());
        assert!(temp.path().join("config.toml.corrupted").exists());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let mut config = AppConfig::default();
        config.max_context_tokens = 4096;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(load_or_recover(&path).unwrap(), config);
    }
}
