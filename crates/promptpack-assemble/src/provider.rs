//! Context providers and the host-built provider set.
//!
//! A [`ContextProvider`] turns a request ([`ProviderOptions`]) into a
//! [`ContextResult`]. The host builds a [`ProviderSet`] at startup from the
//! providers it wants to offer; there is no global registry.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use promptpack_core::{AppConfig, ContextResult, PatternError, ScanConfig, ScanError};
use promptpack_scan::{PathFilter, RepoScanner};

use crate::assembler::ContextAssembler;
use crate::tokenizer::EncoderCache;

/// Errors from a context provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A provider with this name is already registered.
    #[error("Provider already registered: {name}")]
    DuplicateName { name: String },

    /// No provider with this name is registered.
    #[error("Unknown provider: {name}")]
    UnknownProvider { name: String },

    /// Scanning the repository failed.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// A glob or regex did not compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A git operation failed.
    #[cfg(feature = "git")]
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Options for one context request.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Repository root.
    pub repo: PathBuf,
    /// Include globs. Empty means everything.
    pub include: Vec<String>,
    /// Exclude globs.
    pub exclude: Vec<String>,
    /// Globs pruned while scanning.
    pub ignore_patterns: Vec<String>,
    /// Token budget.
    pub max_tokens: usize,
    /// Use staged changes instead of unstaged ones (git diff only).
    pub staged: bool,
    /// Scanner threads (0 = serial).
    pub threads: usize,
}

impl ProviderOptions {
    /// Options for `repo` with no patterns and the default budget.
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self::from_config(repo, &AppConfig::default())
    }

    /// Options for `repo` seeded from the application config.
    pub fn from_config(repo: impl Into<PathBuf>, config: &AppConfig) -> Self {
        Self {
            repo: repo.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            ignore_patterns: config.ignore_patterns.clone(),
            max_tokens: config.max_context_tokens,
            staged: false,
            threads: 0,
        }
    }
}

/// Something that can produce a context document.
pub trait ContextProvider: Send + Sync {
    /// Unique provider name (e.g. "files", "git_diff").
    fn name(&self) -> &str;

    /// Build a context result for the request.
    fn get_context(
        &self,
        options: &ProviderOptions,
        cancel: &CancellationToken,
    ) -> ProviderResult<ContextResult>;
}

/// Ordered set of providers with unique names.
#[derive(Default)]
pub struct ProviderSet {
    providers: Vec<Box<dyn ContextProvider>>,
}

impl ProviderSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Fails if the name is taken.
    pub fn register(&mut self, provider: Box<dyn ContextProvider>) -> ProviderResult<()> {
        let name = provider.name();
        if self.get(name).is_some() {
            return Err(ProviderError::DuplicateName {
                name: name.to_string(),
            });
        }
        debug!(provider = name, "Registered provider");
        self.providers.push(provider);
        Ok(())
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<&dyn ContextProvider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// Get a provider by name or fail with [`ProviderError::UnknownProvider`].
    pub fn require(&self, name: &str) -> ProviderResult<&dyn ContextProvider> {
        self.get(name).ok_or_else(|| ProviderError::UnknownProvider {
            name: name.to_string(),
        })
    }

    /// Provider names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Iterate over providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn ContextProvider> {
        self.providers.iter().map(|p| p.as_ref())
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("providers", &self.names())
            .finish()
    }
}

/// Provides the contents of repository files: scan, filter, assemble.
pub struct FileContextProvider {
    config: AppConfig,
    cache: Arc<EncoderCache>,
}

impl FileContextProvider {
    /// Provider name.
    pub const NAME: &'static str = "files";

    /// Create a provider using `config` for encoding and secret patterns.
    pub fn new(config: AppConfig, cache: Arc<EncoderCache>) -> Self {
        Self { config, cache }
    }

    /// Collect the files a request selects, sorted.
    pub fn select_paths(
        &self,
        options: &ProviderOptions,
        cancel: &CancellationToken,
    ) -> ProviderResult<Option<Vec<PathBuf>>> {
        let scan_config = ScanConfig {
            root: options.repo.clone(),
            ignore_patterns: options.ignore_patterns.clone(),
            threads: options.threads,
        };
        let tree = RepoScanner::new().scan(&scan_config, cancel)?;
        if tree.cancelled {
            return Ok(None);
        }

        let filter = PathFilter::new(&options.include, &options.exclude)?;
        let selected = filter.filter(&tree, &tree.root().children);
        let paths = selected.file_paths(&tree);
        debug!(
            scanned = tree.total_files(),
            selected = paths.len(),
            "Selected files"
        );
        Ok(Some(paths))
    }
}

impl ContextProvider for FileContextProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn get_context(
        &self,
        options: &ProviderOptions,
        cancel: &CancellationToken,
    ) -> ProviderResult<ContextResult> {
        info!(repo = %options.repo.display(), "Collecting file context");
        let Some(paths) = self.select_paths(options, cancel)? else {
            return Ok(ContextResult::cancelled("Scan cancelled", Vec::new()));
        };
        let assembler = ContextAssembler::from_config(&self.config, &self.cache)?;
        Ok(assembler.assemble(&paths, options.max_tokens, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl ContextProvider for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn get_context(
            &self,
            _options: &ProviderOptions,
            _cancel: &CancellationToken,
        ) -> ProviderResult<ContextResult> {
            Ok(ContextResult::default())
        }
    }

    #[test]
    fn test_register_keeps_order() {
        let mut set = ProviderSet::new();
        set.register(Box::new(Fixed("b"))).unwrap();
        set.register(Box::new(Fixed("a"))).unwrap();
        assert_eq!(set.names(), vec!["b", "a"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut set = ProviderSet::new();
        set.register(Box::new(Fixed("files"))).unwrap();
        let err = set.register(Box::new(Fixed("files"))).unwrap_err();
        assert!(matches!(err, ProviderError::DuplicateName { name } if name == "files"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_require_unknown() {
        let set = ProviderSet::new();
        assert!(matches!(
            set.require("nope"),
            Err(ProviderError::UnknownProvider { .. })
        ));
    }

    #[test]
    fn test_options_from_config() {
        let config = AppConfig::default();
        let options = ProviderOptions::from_config("/repo", &config);
        assert_eq!(options.max_tokens, 8192);
        assert!(options.ignore_patterns.iter().any(|p| p == "node_modules"));
        assert!(!options.staged);
    }
}
