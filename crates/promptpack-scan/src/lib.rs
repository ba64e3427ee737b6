//! Repository scanning and path filtering for promptpack.
//!
//! # Overview
//!
//! `promptpack-scan` turns a repository directory into a [`FileTree`] and
//! narrows that tree down to the files a prompt should contain:
//!
//! - **Traversal** via jwalk, serial or on a rayon pool
//! - **Symlink exclusion** for every entry, before any other check
//! - **Pruning** of ignored names and relative paths before descent
//! - **Progress and warnings** via broadcast channels
//! - **Include/exclude filtering** with ancestor marking and sticky exclusion
//!
//! # Example
//!
//! ```rust,no_run
//! use promptpack_scan::{PathFilter, RepoScanner, ScanConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ScanConfig::new("/path/to/repo").with_ignore_patterns(["target", ".git"]);
//! let tree = RepoScanner::new().scan(&config, &CancellationToken::new()).unwrap();
//!
//! let filter = PathFilter::new(["*.rs"], ["tests"]).unwrap();
//! let result = filter.filter(&tree, &tree.root().children);
//! for path in result.file_paths(&tree) {
//!     println!("{}", path.display());
//! }
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use promptpack_scan::{RepoScanner, ScanEvent};
//!
//! let scanner = RepoScanner::new();
//! let mut events = scanner.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let ScanEvent::Progress(progress) = event {
//!             println!("Scanned {} files", progress.files_scanned);
//!         }
//!     }
//! });
//! ```

mod filter;
mod probe;
mod progress;
mod scanner;

pub use filter::{FilterResult, PathFilter};
pub use probe::{EntryMeta, MetadataProbe, StdProbe};
pub use progress::{ScanEvent, ScanProgress};
pub use scanner::{RepoScanner, scan_repo};

// Re-export core types for convenience
pub use promptpack_core::{
    FileNode, FileTree, NodeId, NodeKind, ScanConfig, ScanError, ScanWarning, TreeStats,
    WarningKind,
};
