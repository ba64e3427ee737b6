//! Token counting and truncation.
//!
//! Wraps tiktoken byte-pair encoders. When no encoder can be loaded every
//! operation falls back to a character heuristic of four characters per
//! token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tiktoken_rs::CoreBPE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Characters per token assumed by the estimate.
const CHARS_PER_TOKEN: usize = 4;

/// Default number of encoders kept by an [`EncoderCache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 4;

/// Byte-pair encodings that can be loaded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// GPT-3.5/GPT-4 encoding.
    #[default]
    #[strum(to_string = "cl100k_base")]
    Cl100kBase,
    /// GPT-4o encoding.
    #[strum(to_string = "o200k_base")]
    O200kBase,
    /// Codex encoding.
    #[strum(to_string = "p50k_base")]
    P50kBase,
    /// GPT-2/GPT-3 encoding, the fallback.
    #[strum(to_string = "r50k_base", serialize = "gpt2")]
    R50kBase,
}

impl Encoding {
    /// Encoding tried when the requested one fails to load.
    pub const FALLBACK: Encoding = Encoding::R50kBase;

    fn load(self) -> Result<CoreBPE, String> {
        let loaded = match self {
            Encoding::Cl100kBase => tiktoken_rs::cl100k_base(),
            Encoding::O200kBase => tiktoken_rs::o200k_base(),
            Encoding::P50kBase => tiktoken_rs::p50k_base(),
            Encoding::R50kBase => tiktoken_rs::r50k_base(),
        };
        loaded.map_err(|e| e.to_string())
    }
}

/// Shared, bounded cache of loaded encoders.
///
/// Lookups are safe from any thread. A failed load is remembered so it is
/// not retried on every request.
pub struct EncoderCache {
    entries: DashMap<Encoding, Option<Arc<CoreBPE>>>,
    capacity: usize,
}

impl EncoderCache {
    /// Create a cache holding at most [`DEFAULT_CACHE_CAPACITY`] encoders.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache with a custom capacity (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Get an encoder, loading it on first use.
    pub fn get(&self, encoding: Encoding) -> Option<Arc<CoreBPE>> {
        if let Some(entry) = self.entries.get(&encoding) {
            return entry.clone();
        }

        if self.entries.len() >= self.capacity {
            let victim = self.entries.iter().next().map(|e| *e.key());
            if let Some(victim) = victim {
                debug!(%victim, "Evicting encoder from cache");
                self.entries.remove(&victim);
            }
        }

        self.entries
            .entry(encoding)
            .or_insert_with(|| match encoding.load() {
                Ok(bpe) => {
                    debug!(%encoding, "Loaded encoder");
                    Some(Arc::new(bpe))
                }
                Err(err) => {
                    warn!(%encoding, error = %err, "Failed to load encoder");
                    None
                }
            })
            .clone()
    }

    /// Number of cached entries, including remembered failures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether nothing has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for EncoderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for EncoderCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts and truncates text in tokens.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Option<Arc<CoreBPE>>,
    encoding: Option<Encoding>,
    degraded_logged: Arc<AtomicBool>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding", &self.encoding)
            .field("exact", &self.is_exact())
            .finish()
    }
}

impl TokenCounter {
    /// Load `encoding` from the cache, falling back to [`Encoding::FALLBACK`]
    /// and then to estimation.
    pub fn load(cache: &EncoderCache, encoding: Encoding) -> Self {
        for candidate in [encoding, Encoding::FALLBACK] {
            if let Some(bpe) = cache.get(candidate) {
                if candidate != encoding {
                    warn!(requested = %encoding, using = %candidate, "Using fallback encoding");
                }
                return Self {
                    bpe: Some(bpe),
                    encoding: Some(candidate),
                    degraded_logged: Arc::new(AtomicBool::new(false)),
                };
            }
        }
        let counter = Self::estimating();
        counter.note_degraded();
        counter
    }

    /// A counter with no encoder that always estimates.
    pub fn estimating() -> Self {
        Self {
            bpe: None,
            encoding: None,
            degraded_logged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether counts are exact rather than estimated.
    pub fn is_exact(&self) -> bool {
        self.bpe.is_some()
    }

    /// Encoding in use, if any.
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Count tokens in `text`.
    ///
    /// Special-token text such as `<|endoftext|>` is counted as ordinary
    /// text.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match &self.bpe {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => {
                self.note_degraded();
                estimate_tokens(text)
            }
        }
    }

    /// Cut `text` to at most `max_tokens` tokens.
    pub fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        let Some(bpe) = &self.bpe else {
            self.note_degraded();
            return char_prefix(text, max_tokens * CHARS_PER_TOKEN);
        };

        let ids = bpe.encode_ordinary(text);
        if ids.len() <= max_tokens {
            return text.to_string();
        }
        match bpe.decode(ids[..max_tokens].to_vec()) {
            Ok(prefix) => prefix,
            Err(err) => {
                warn!(error = %err, "Token decode failed, truncating by characters");
                char_prefix(text, max_tokens * CHARS_PER_TOKEN)
            }
        }
    }

    /// Longest token prefix of `text` that, followed by `suffix`, still fits
    /// in `budget` tokens.
    ///
    /// Returns `None` without an encoder, when even `suffix` alone does not
    /// fit, or when `cancel` fires.
    pub fn truncate_with_suffix(
        &self,
        text: &str,
        budget: usize,
        suffix: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let bpe = self.bpe.as_ref()?;
        let suffix_cost = self.count(suffix);
        if suffix_cost > budget {
            return None;
        }

        let ids = bpe.encode_ordinary(text);
        let mut keep = (budget - suffix_cost).min(ids.len());
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            let prefix = match bpe.decode(ids[..keep].to_vec()) {
                Ok(prefix) => prefix,
                Err(err) => {
                    warn!(error = %err, "Token decode failed, truncating by characters");
                    char_prefix(text, keep * CHARS_PER_TOKEN)
                }
            };
            let candidate = format!("{prefix}{suffix}");
            let cost = self.count(&candidate);
            if cost <= budget {
                return Some(candidate);
            }
            if keep == 0 {
                return None;
            }
            keep = keep.saturating_sub((cost - budget).max(1));
        }
    }

    fn note_degraded(&self) {
        if !self.degraded_logged.swap(true, Ordering::Relaxed) {
            warn!("No tokenizer available, token counts are estimated");
        }
    }
}

/// Character-based token estimate: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn char_prefix(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact() -> TokenCounter {
        TokenCounter::load(&EncoderCache::new(), Encoding::Cl100kBase)
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(Encoding::Cl100kBase.to_string(), "cl100k_base");
        assert_eq!("gpt2".parse::<Encoding>().unwrap(), Encoding::R50kBase);
        assert_eq!("o200k_base".parse::<Encoding>().unwrap(), Encoding::O200kBase);
        assert!("nope".parse::<Encoding>().is_err());
    }

    #[test]
    fn test_estimate_rounds_up() {
        let counter = TokenCounter::estimating();
        assert!(!counter.is_exact());
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abc"), 1);
        assert_eq!(counter.count("abcde"), 2);
        assert_eq!(counter.count(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_estimate_truncates_by_chars() {
        let counter = TokenCounter::estimating();
        assert_eq!(counter.truncate_to_tokens("abcdefghij", 2), "abcdefgh");
        assert_eq!(counter.truncate_to_tokens("héllo wörld", 1), "héll");
        assert!(
            counter
                .truncate_with_suffix("abc", 10, "!", &CancellationToken::new())
                .is_none()
        );
    }

    #[test]
    fn test_exact_count_and_truncate() {
        let counter = exact();
        assert!(counter.is_exact());
        assert_eq!(counter.encoding(), Some(Encoding::Cl100kBase));
        assert_eq!(counter.count("hello world"), 2);

        let text = "one two three four five six seven eight";
        let cut = counter.truncate_to_tokens(text, 3);
        assert_eq!(cut, "one two three");
        assert_eq!(counter.truncate_to_tokens(text, 1000), text);
        assert_eq!(counter.truncate_to_tokens(text, 0), "");
    }

    #[test]
    fn test_special_tokens_are_plain_text() {
        let counter = exact();
        assert!(counter.count("<|endoftext|>") > 1);
    }

    #[test]
    fn test_truncate_with_suffix_fits_budget() {
        let counter = exact();
        let text = "word ".repeat(200);
        let cancel = CancellationToken::new();
        let cut = counter
            .truncate_with_suffix(&text, 30, "\n... [truncated]", &cancel)
            .unwrap();
        assert!(cut.ends_with("\n... [truncated]"));
        assert!(counter.count(&cut) <= 30);
        assert!(counter.count(&cut) >= 25);
    }

    #[test]
    fn test_truncate_with_suffix_cancelled() {
        let counter = exact();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(
            counter
                .truncate_with_suffix(&"word ".repeat(100), 30, "!", &cancel)
                .is_none()
        );
    }

    #[test]
    fn test_cache_reuses_encoders() {
        let cache = EncoderCache::with_capacity(2);
        let a = cache.get(Encoding::Cl100kBase).unwrap();
        let b = cache.get(Encoding::Cl100kBase).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        cache.get(Encoding::R50kBase);
        cache.get(Encoding::P50kBase);
        assert!(cache.len() <= 2);
    }
}
