//! Compiled glob pattern lists.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::PatternError;

/// An ordered list of shell-style globs compiled into a single matcher.
///
/// Patterns are case-sensitive and `*` may cross `/`, so `*.py` matches both
/// `a.py` and `pkg/a.py`.
#[derive(Debug, Clone)]
pub struct GlobList {
    patterns: Vec<String>,
    set: GlobSet,
}

impl GlobList {
    /// Compile a list of glob patterns.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .literal_separator(false)
                .build()
                .map_err(|source| PatternError::Glob {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }
        let set = builder.build().map_err(|source| PatternError::Glob {
            pattern: kept.join(", "),
            source,
        })?;
        Ok(Self {
            patterns: kept,
            set,
        })
    }

    /// An empty list that matches nothing.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    /// Source patterns in configuration order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Check whether there are no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern (in configuration order) matching either the bare name
    /// or the forward-slash relative path.
    pub fn first_match(&self, name: &str, rel_path: &str) -> Option<&str> {
        if self.is_empty() {
            return None;
        }
        let mut hits = self.set.matches(name);
        if !rel_path.is_empty() && rel_path != name {
            hits.extend(self.set.matches(rel_path));
        }
        hits.into_iter()
            .min()
            .map(|i| self.patterns[i].as_str())
    }

    /// Whether either the bare name or the relative path matches.
    pub fn is_match(&self, name: &str, rel_path: &str) -> bool {
        !self.is_empty()
            && (self.set.is_match(name) || (!rel_path.is_empty() && self.set.is_match(rel_path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_name_or_relative_path() {
        let globs = GlobList::new(["node_modules", "*.log", "docs/*.md"]).unwrap();
        assert!(globs.is_match("node_modules", "web/node_modules"));
        assert!(globs.is_match("out.log", "build/out.log"));
        assert!(globs.is_match("intro.md", "docs/intro.md"));
        assert!(!globs.is_match("intro.md", "guide/intro.md"));
        assert!(!globs.is_match("src", "src"));
    }

    #[test]
    fn test_star_crosses_separator() {
        let globs = GlobList::new(["*.py"]).unwrap();
        assert!(globs.is_match("x", "pkg/sub/a.py"));
    }

    #[test]
    fn test_case_sensitive() {
        let globs = GlobList::new(["README.md"]).unwrap();
        assert!(!globs.is_match("readme.md", "readme.md"));
    }

    #[test]
    fn test_first_match_is_in_config_order() {
        let globs = GlobList::new(["*.txt", "notes.*"]).unwrap();
        assert_eq!(globs.first_match("notes.txt", "notes.txt"), Some("*.txt"));
        assert_eq!(globs.first_match("notes.md", "notes.md"), Some("notes.*"));
        assert_eq!(globs.first_match("a.rs", "a.rs"), None);
    }

    #[test]
    fn test_invalid_glob() {
        let err = GlobList::new(["a[b"]).unwrap_err();
        assert!(matches!(err, PatternError::Glob { .. }));
    }

    #[test]
    fn test_empty_matches_nothing() {
        assert!(!GlobList::empty().is_match("anything", "anything"));
    }
}
