//! Metadata lookup used by the scanner.

use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Size and modification time of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

/// Source of file metadata.
///
/// The scanner calls this once for every entry that survives symlink and
/// ignore filtering, so a counting implementation shows exactly which
/// paths were stat'ed.
pub trait MetadataProbe: Send + Sync {
    /// Stat a single path without following symlinks.
    fn stat(&self, path: &Path) -> io::Result<EntryMeta>;
}

/// Probe backed by `std::fs::symlink_metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdProbe;

impl MetadataProbe for StdProbe {
    fn stat(&self, path: &Path) -> io::Result<EntryMeta> {
        let metadata = std::fs::symlink_metadata(path)?;
        Ok(EntryMeta {
            size: if metadata.is_file() { metadata.len() } else { 0 },
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        })
    }
}
