//! Greedy token budgeting over path-sorted files.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use promptpack_core::{ContextFile, FileStatus};

use crate::tokenizer::TokenCounter;

/// Appended to the visible text of a truncated file.
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// A truncated fragment must get more than this many tokens.
pub const MIN_FRAGMENT_TOKENS: usize = 50;

/// Result of packing files into a budget.
#[derive(Debug, Clone, Default)]
pub struct Packing {
    /// Files kept, in input order.
    pub included: Vec<ContextFile>,
    /// Files dropped for budget.
    pub skipped: Vec<ContextFile>,
    /// Tokens used. Pinned to the budget once a file is truncated.
    pub total_tokens: usize,
    /// One clause per truncation or skip.
    pub notes: Vec<String>,
    /// Files not reached because of cancellation.
    pub cancelled: Option<Vec<ContextFile>>,
}

impl Packing {
    /// Notes joined into one line.
    pub fn note(&self) -> String {
        self.notes.join(" ")
    }
}

/// Pack `files` into `max_tokens`.
///
/// Files are taken in order. Each one that fits is included whole. The
/// first that does not fit is truncated (if more than
/// [`MIN_FRAGMENT_TOKENS`] remain and the counter is exact) or skipped,
/// and every later file is skipped. Smaller later files are never
/// backfilled into leftover budget.
pub fn pack(
    files: Vec<ContextFile>,
    max_tokens: usize,
    counter: &TokenCounter,
    cancel: &CancellationToken,
) -> Packing {
    let mut packing = Packing::default();
    let mut running = 0usize;
    let mut queue = files.into_iter();

    while let Some(mut file) = queue.next() {
        if cancel.is_cancelled() {
            packing.cancelled = Some(cancel_rest(file, queue));
            return packing;
        }

        if running + file.token_count <= max_tokens {
            running += file.token_count;
            packing.included.push(file);
            continue;
        }

        let remaining = max_tokens - running;
        let name = file.name();
        let fragment = if remaining > MIN_FRAGMENT_TOKENS && counter.is_exact() {
            counter.truncate_with_suffix(&file.content, remaining, TRUNCATION_MARKER, cancel)
        } else {
            None
        };

        if cancel.is_cancelled() {
            packing.cancelled = Some(cancel_rest(file, queue));
            return packing;
        }

        match fragment {
            Some(text) => {
                debug!(file = %name, remaining, "Truncating to fit budget");
                file.token_count = counter.count(&text);
                file.content = text;
                file.status = FileStatus::Truncated;
                packing.notes.push(format!("Truncated {name}."));
                packing.included.push(file);
                running = max_tokens;
            }
            None => {
                let reason = if counter.is_exact() {
                    "budget"
                } else {
                    "budget, no tokenizer"
                };
                debug!(file = %name, remaining, reason, "Skipping file");
                file.status = FileStatus::SkippedBudget;
                packing.notes.push(format!("Skipped {name} ({reason})."));
                packing.skipped.push(file);
            }
        }

        let rest: Vec<ContextFile> = queue
            .by_ref()
            .map(|mut f| {
                f.status = FileStatus::SkippedBudget;
                f
            })
            .collect();
        if !rest.is_empty() {
            packing
                .notes
                .push(format!("Skipped {} more files (budget).", rest.len()));
            packing.skipped.extend(rest);
        }
        break;
    }

    packing.total_tokens = running;
    packing
}

fn cancel_rest(
    current: ContextFile,
    rest: impl Iterator<Item = ContextFile>,
) -> Vec<ContextFile> {
    std::iter::once(current)
        .chain(rest)
        .map(|f| ContextFile::skipped(f.path, "", FileStatus::SkippedCancelled))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, tokens: usize) -> ContextFile {
        ContextFile::new(format!("/r/{name}"), "x".repeat(tokens * 4), tokens, FileStatus::Ok)
    }

    #[test]
    fn test_everything_fits() {
        let packing = pack(
            vec![file("a", 10), file("b", 20)],
            30,
            &TokenCounter::estimating(),
            &CancellationToken::new(),
        );
        assert_eq!(packing.included.len(), 2);
        assert_eq!(packing.total_tokens, 30);
        assert!(packing.notes.is_empty());
    }

    #[test]
    fn test_stop_at_first_shortfall() {
        let packing = pack(
            vec![file("a", 40), file("b", 40), file("c", 1), file("d", 1)],
            50,
            &TokenCounter::estimating(),
            &CancellationToken::new(),
        );
        assert_eq!(packing.included.len(), 1);
        assert_eq!(packing.total_tokens, 40);
        assert_eq!(packing.skipped.len(), 3);
        assert!(packing.skipped.iter().all(|f| f.status == FileStatus::SkippedBudget));
        assert_eq!(
            packing.note(),
            "Skipped b (budget, no tokenizer). Skipped 2 more files (budget)."
        );
    }

    #[test]
    fn test_cancelled_before_packing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let packing = pack(
            vec![file("a", 1), file("b", 1)],
            50,
            &TokenCounter::estimating(),
            &cancel,
        );
        let cancelled = packing.cancelled.unwrap();
        assert_eq!(cancelled.len(), 2);
        assert!(cancelled.iter().all(|f| f.status == FileStatus::SkippedCancelled));
    }
}
