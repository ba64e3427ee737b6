//! Context from the working tree's pending git changes.

use std::path::Path;
use std::sync::Arc;

use git2::{DiffFormat, DiffOptions, Repository};
use tokio_util::sync::CancellationToken;
use tracing::info;

use promptpack_core::{AppConfig, ContextFile, ContextResult, FileStatus, Outcome};

use crate::budget::pack;
use crate::provider::{ContextProvider, ProviderOptions, ProviderResult};
use crate::redact::SecretScrubber;
use crate::render::render_document;
use crate::tokenizer::{EncoderCache, Encoding, TokenCounter};

/// Content used when the diff is empty.
pub const NO_CHANGES: &str = "<no changes detected>";

/// Renders `git diff` (or `git diff --staged`) as a single generated file.
pub struct GitDiffProvider {
    config: AppConfig,
    cache: Arc<EncoderCache>,
}

impl GitDiffProvider {
    /// Provider name.
    pub const NAME: &'static str = "git_diff";

    /// Create a provider using `config` for encoding and secret patterns.
    pub fn new(config: AppConfig, cache: Arc<EncoderCache>) -> Self {
        Self { config, cache }
    }

    fn counter(&self) -> TokenCounter {
        let encoding = self.config.encoding.parse::<Encoding>().unwrap_or_default();
        TokenCounter::load(&self.cache, encoding)
    }
}

/// Unified patch text of staged (HEAD to index) or unstaged (index to
/// working tree) changes.
pub fn diff_text(repo: &Repository, staged: bool) -> Result<String, git2::Error> {
    let mut opts = DiffOptions::new();
    let diff = if staged {
        // An unborn HEAD diffs against the empty tree.
        let head = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
        repo.diff_tree_to_index(head.as_ref(), None, Some(&mut opts))?
    } else {
        repo.diff_index_to_workdir(None, Some(&mut opts))?
    };

    let mut out = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            out.push(line.origin());
        }
        out.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;
    Ok(out)
}

fn diff_file_name(staged: bool) -> &'static str {
    if staged {
        "git_diff_staged.diff"
    } else {
        "git_diff_unstaged.diff"
    }
}

impl ContextProvider for GitDiffProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn get_context(
        &self,
        options: &ProviderOptions,
        cancel: &CancellationToken,
    ) -> ProviderResult<ContextResult> {
        if cancel.is_cancelled() {
            return Ok(ContextResult::cancelled("Assembly cancelled", Vec::new()));
        }

        let repo = Repository::discover(&options.repo)?;
        let workdir = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();
        info!(repo = %workdir.display(), staged = options.staged, "Generating git diff context");

        let mut text = diff_text(&repo, options.staged)?;
        if text.trim().is_empty() {
            info!("No changes detected");
            text = NO_CHANGES.to_string();
        }

        let scrubber = SecretScrubber::new(&self.config.secret_patterns)?;
        let text = scrubber.scrub(&text).text;
        let counter = self.counter();
        let path = workdir.join(diff_file_name(options.staged));
        let tokens = counter.count(&text);
        let file = ContextFile::new(path.as_path(), text, tokens, FileStatus::Generated);

        let packing = pack(vec![file], options.max_tokens, &counter, cancel);
        if let Some(skipped) = packing.cancelled {
            return Ok(ContextResult::cancelled("Assembly cancelled during budget", skipped));
        }

        let budget_note = if packing.notes.is_empty() {
            "Git diff generated".to_string()
        } else {
            packing.note()
        };
        Ok(ContextResult {
            document: render_document(&packing.included),
            included_files: packing.included,
            skipped_files: packing.skipped,
            total_tokens: packing.total_tokens,
            budget_note,
            outcome: Outcome::Complete,
            estimated: !counter.is_exact(),
        })
    }
}

/// Whether `path` is inside a git repository.
pub fn is_repository(path: &Path) -> bool {
    Repository::discover(path).is_ok()
}
