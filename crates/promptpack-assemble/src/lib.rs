//! Context assembly for promptpack.
//!
//! This crate turns a set of files into a token-bounded markup document:
//!
//! - **Token counting** - tiktoken encoders with a character-estimate fallback
//! - **Decoding** - an ordered encoding list (UTF-8, then Latin-1), lossy as a last resort
//! - **Secret redaction** - regex patterns replaced line by line
//! - **Budgeting** - greedy packing with one truncated fragment
//! - **Instructions** - snippet and question rendering
//! - **Providers** - file and git diff context sources
//!
//! # Assembling Files
//!
//! Files are packed in ascending path order. The first file that does not
//! fit is truncated (when enough budget remains) or skipped, and packing
//! stops there.
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use promptpack_assemble::{ContextAssembler, EncoderCache};
//! use promptpack_core::AppConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = AppConfig::default();
//! let cache = EncoderCache::new();
//! let assembler = ContextAssembler::from_config(&config, &cache).unwrap();
//!
//! let paths = vec![PathBuf::from("/repo/src/main.rs")];
//! let result = assembler.assemble(&paths, 8192, &CancellationToken::new());
//! println!("{} ({} tokens)", result.budget_note, result.total_tokens);
//! ```
//!
//! # Providers
//!
//! The host builds an explicit [`ProviderSet`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use promptpack_assemble::{EncoderCache, FileContextProvider, ProviderOptions, ProviderSet};
//! use promptpack_core::AppConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = AppConfig::default();
//! let cache = Arc::new(EncoderCache::new());
//!
//! let mut providers = ProviderSet::new();
//! providers
//!     .register(Box::new(FileContextProvider::new(config.clone(), cache)))
//!     .unwrap();
//!
//! let options = ProviderOptions::from_config("/path/to/repo", &config);
//! let result = providers
//!     .require("files")
//!     .unwrap()
//!     .get_context(&options, &CancellationToken::new())
//!     .unwrap();
//! println!("{}", result.document);
//! ```

mod assembler;
mod budget;
mod decode;
#[cfg(feature = "git")]
mod git_diff;
mod instructions;
mod provider;
mod redact;
mod render;
mod tokenizer;

pub use assembler::{AssembleProgress, ContextAssembler, HUGE_FILE_THRESHOLD};
pub use budget::{MIN_FRAGMENT_TOKENS, Packing, TRUNCATION_MARKER, pack};
pub use decode::{DEFAULT_ENCODINGS, Decoded, TextEncoding, decode_bytes, decode_with};
#[cfg(feature = "git")]
pub use git_diff::{GitDiffProvider, NO_CHANGES, diff_text, is_repository};
pub use instructions::{
    CUSTOM_SNIPPET, CategorySelection, InstructionEngine, SnippetSelection, category_tag,
    compose_prompt,
};
pub use provider::{
    ContextProvider, FileContextProvider, ProviderError, ProviderOptions, ProviderResult,
    ProviderSet,
};
pub use redact::{REDACTION_MARKER, Scrubbed, SecretScrubber};
pub use render::render_document;
pub use tokenizer::{DEFAULT_CACHE_CAPACITY, EncoderCache, Encoding, TokenCounter, estimate_tokens};

// Re-export core types
pub use promptpack_core::{ContextFile, ContextResult, FileStatus, Outcome};
