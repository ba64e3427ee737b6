//! Core types and configuration for promptpack.
//!
//! This crate provides the data model shared by the scanner and the context
//! assembler: the scanned file tree (an arena of [`FileNode`]s), the
//! per-file [`ContextFile`] records and the [`ContextResult`] handed back to
//! callers, plus error types and configuration.

mod config;
mod context;
mod error;
mod node;
mod pattern;
mod settings;
mod tree;

pub use config::{ScanConfig, ScanConfigBuilder};
pub use context::{CANCELLED_DOCUMENT, ContextFile, ContextResult, FileStatus, Outcome};
pub use error::{ConfigError, PatternError, ScanError, ScanWarning, WarningKind};
pub use node::{FileNode, NodeId, NodeKind};
pub use pattern::GlobList;
pub use settings::{AppConfig, SnippetCatalog, SnippetCategory, default_config_path, load_config};
pub use tree::{FileTree, SelectionState, TreeStats, relative_posix};
