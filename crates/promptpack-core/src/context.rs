//! Assembled context records.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Document emitted for a cancelled assembly.
pub const CANCELLED_DOCUMENT: &str = "<context><cancelled/></context>";

/// Processing status of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Read and included unchanged.
    Ok,
    /// At least one secret was redacted.
    Scrubbed,
    /// No encoding decoded cleanly; content was decoded lossily.
    DecodeError,
    /// Cut down to fit the remaining budget.
    Truncated,
    /// Dropped because the budget was exhausted.
    SkippedBudget,
    /// Could not be read.
    SkippedError,
    /// Not processed because the request was cancelled.
    SkippedCancelled,
    /// Synthesized by a provider rather than read from disk.
    Generated,
}

impl FileStatus {
    /// Whether a file with this status belongs in the output document.
    pub fn is_included(&self) -> bool {
        !matches!(
            self,
            FileStatus::SkippedBudget | FileStatus::SkippedError | FileStatus::SkippedCancelled
        )
    }
}

/// One file after reading, decoding, redaction and token counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    /// Source path.
    pub path: PathBuf,
    /// Text as it will be emitted.
    pub content: String,
    /// Token count of `content`.
    pub token_count: usize,
    /// Processing status.
    pub status: FileStatus,
}

impl ContextFile {
    /// Create a new context file.
    pub fn new(
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        token_count: usize,
        status: FileStatus,
    ) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            token_count,
            status,
        }
    }

    /// A placeholder for a file that could not be processed.
    pub fn skipped(path: impl Into<PathBuf>, content: impl Into<String>, status: FileStatus) -> Self {
        Self::new(path, content, 0, status)
    }

    /// Bare file name, or the full path if it has none.
    pub fn name(&self) -> String {
        file_name(&self.path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Terminal outcome of an assembly request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Ran to completion.
    #[default]
    Complete,
    /// Stopped early on cancellation. The document is a cancellation marker.
    Cancelled,
}

/// Result of a single assembly request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextResult {
    /// Serialized markup document.
    pub document: String,
    /// Included files, sorted by path.
    pub included_files: Vec<ContextFile>,
    /// Skipped files, in the order they were skipped.
    pub skipped_files: Vec<ContextFile>,
    /// Sum of the included files' token counts, except that once a file is
    /// truncated it is pinned to the budget.
    pub total_tokens: usize,
    /// Human-readable summary of truncations and skips.
    pub budget_note: String,
    /// How the request ended.
    pub outcome: Outcome,
    /// Token counts are character estimates rather than exact.
    pub estimated: bool,
}

impl ContextResult {
    /// A result signalling cancellation.
    pub fn cancelled(note: impl Into<String>, skipped_files: Vec<ContextFile>) -> Self {
        Self {
            document: CANCELLED_DOCUMENT.to_string(),
            included_files: Vec::new(),
            skipped_files,
            total_tokens: 0,
            budget_note: note.into(),
            outcome: Outcome::Cancelled,
            estimated: false,
        }
    }

    /// Check whether the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.outcome == Outcome::Cancelled
    }

    /// Number of included files.
    pub fn file_count(&self) -> usize {
        self.included_files.len()
    }
}
