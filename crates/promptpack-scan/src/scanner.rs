//! JWalk-based repository scanner.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use compact_str::CompactString;
use jwalk::{Parallelism, WalkDir};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use promptpack_core::{
    FileNode, FileTree, GlobList, NodeId, ScanConfig, ScanError, ScanWarning, TreeStats,
    WarningKind, relative_posix,
};

use crate::probe::{EntryMeta, MetadataProbe, StdProbe};
use crate::progress::{ProgressTracker, ScanEvent};

/// Files between progress events.
const PROGRESS_INTERVAL: u64 = 500;

/// Repository scanner built on jwalk.
///
/// Symlinks are dropped before anything else is looked at, and ignored
/// entries are removed from each directory listing before jwalk descends,
/// so a pruned directory's contents are never read or stat'ed.
pub struct RepoScanner {
    events_tx: broadcast::Sender<ScanEvent>,
    probe: Arc<dyn MetadataProbe>,
}

impl RepoScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        Self::with_probe(Arc::new(StdProbe))
    }

    /// Create a scanner that stats entries through `probe`.
    pub fn with_probe(probe: Arc<dyn MetadataProbe>) -> Self {
        let (events_tx, _) = broadcast::channel(100);
        Self { events_tx, probe }
    }

    /// Subscribe to progress and warning events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events_tx.subscribe()
    }

    /// Scan `config.root`.
    ///
    /// Fails only when the root itself is unusable. If `cancel` fires
    /// mid-scan the partial tree is returned with `cancelled` set.
    pub fn scan(&self, config: &ScanConfig, cancel: &CancellationToken) -> Result<FileTree, ScanError> {
        let tracker = ProgressTracker::new();
        let root_path = resolve_root(&config.root)?;
        let ignore = Arc::new(GlobList::new(&config.ignore_patterns)?);
        let root_meta = self
            .probe
            .stat(&root_path)
            .map_err(|e| ScanError::io(&root_path, e))?;

        info!(root = %root_path.display(), patterns = ignore.patterns().len(), "Scanning repository");

        let mut walk = WalkState {
            tracker,
            stats: TreeStats::new(),
            warnings: Vec::new(),
            entries_by_parent: HashMap::new(),
        };
        let cancelled = self.collect_entries(config, &root_path, ignore, cancel, &mut walk);

        let nodes = build_arena(&root_path, root_meta, walk.entries_by_parent);
        let scan_duration = walk.tracker.elapsed();
        let _ = self.events_tx.send(ScanEvent::Progress(walk.tracker.snapshot()));

        info!(
            files = walk.stats.total_files,
            dirs = walk.stats.total_dirs,
            ignored = walk.stats.ignored_entries,
            symlinks = walk.stats.skipped_symlinks,
            warnings = walk.warnings.len(),
            cancelled,
            "Scan finished in {:?}",
            scan_duration
        );

        let mut tree = FileTree::new(
            nodes,
            root_path,
            config.clone(),
            walk.stats,
            scan_duration,
            walk.warnings,
        );
        tree.cancelled = cancelled;
        Ok(tree)
    }

    /// Walk the tree, grouping surviving entries by parent directory.
    ///
    /// Returns `true` if the walk stopped because of cancellation.
    fn collect_entries(
        &self,
        config: &ScanConfig,
        root_path: &Path,
        ignore: Arc<GlobList>,
        cancel: &CancellationToken,
        walk: &mut WalkState,
    ) -> bool {
        let parallelism = match config.threads {
            0 => Parallelism::Serial,
            n => Parallelism::RayonNewPool(n),
        };

        let symlinks = Arc::new(AtomicU64::new(0));
        let ignored = Arc::new(AtomicU64::new(0));

        let prune = {
            let root = root_path.to_path_buf();
            let symlinks = Arc::clone(&symlinks);
            let ignored = Arc::clone(&ignored);
            let cancel = cancel.clone();
            move |_depth: Option<usize>,
                  _dir: &Path,
                  _state: &mut (),
                  children: &mut Vec<Result<jwalk::DirEntry<((), ())>, jwalk::Error>>| {
                if cancel.is_cancelled() {
                    children.clear();
                    return;
                }
                children.retain(|child| {
                    let Ok(entry) = child else {
                        return true;
                    };
                    if entry.file_type().is_symlink() {
                        symlinks.fetch_add(1, Ordering::Relaxed);
                        trace!(path = %entry.path().display(), "Skipping symlink");
                        return false;
                    }
                    let name = entry.file_name().to_string_lossy();
                    let path = entry.path();
                    let rel = relative_posix(&path, &root);
                    if let Some(pattern) = ignore.first_match(&name, &rel) {
                        ignored.fetch_add(1, Ordering::Relaxed);
                        trace!(path = %rel, pattern, "Ignoring entry");
                        return false;
                    }
                    true
                });
            }
        };

        let walker = WalkDir::new(root_path)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(1)
            .process_read_dir(prune);

        // Directories that could not be stat'ed; their subtrees stay out of
        // the tree and the stats.
        let mut detached: HashSet<PathBuf> = HashSet::new();
        let mut cancelled = false;
        for entry_result in walker {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let warning = match err.io_error() {
                        Some(io) => ScanWarning::read_error(path, io),
                        None => ScanWarning::new(path, err.to_string(), WarningKind::ReadError),
                    };
                    self.warn(walk, warning);
                    continue;
                }
            };

            let file_type = entry.file_type();
            if !file_type.is_dir() && !file_type.is_file() {
                debug!(path = %entry.path().display(), "Skipping special file");
                continue;
            }

            let path = entry.path();
            let is_dir = file_type.is_dir();
            if path.parent().is_some_and(|p| detached.contains(p)) {
                trace!(path = %path.display(), "Parent not attached, skipping");
                if is_dir {
                    detached.insert(path);
                }
                continue;
            }

            let meta = match self.probe.stat(&path) {
                Ok(m) => m,
                Err(err) => {
                    self.warn(walk, ScanWarning::metadata_error(&path, &err));
                    if is_dir {
                        detached.insert(path);
                    }
                    continue;
                }
            };

            let depth = entry.depth() as u32;
            if is_dir {
                walk.stats.record_dir(depth);
                walk.tracker.record_dir();
            } else {
                walk.stats.record_file(meta.size, depth);
                let count = walk.tracker.record_file(meta.size);
                if count % PROGRESS_INTERVAL == 0 {
                    walk.tracker.set_current_path(path.clone());
                    let _ = self.events_tx.send(ScanEvent::Progress(walk.tracker.snapshot()));
                }
            }

            let Some(parent) = path.parent().map(Path::to_path_buf) else {
                continue;
            };
            walk.entries_by_parent.entry(parent).or_default().push(EntryInfo {
                name: entry.file_name().to_string_lossy().as_ref().into(),
                path,
                is_dir,
                meta,
            });
        }

        walk.stats.skipped_symlinks = symlinks.load(Ordering::Relaxed);
        walk.stats.ignored_entries = ignored.load(Ordering::Relaxed);

        // Pruned directories yield no entries, so the loop may never see the token.
        let cancelled = cancelled || cancel.is_cancelled();
        if cancelled {
            info!("Scan cancelled, returning partial tree");
        }
        cancelled
    }

    fn warn(&self, walk: &mut WalkState, warning: ScanWarning) {
        warn!(path = %warning.path.display(), "{}", warning.message);
        walk.tracker.record_error();
        let _ = self.events_tx.send(ScanEvent::Warning(warning.clone()));
        walk.warnings.push(warning);
    }
}

impl Default for RepoScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan `root` with the given ignore patterns and no cancellation.
pub fn scan_repo<I, S>(root: impl Into<PathBuf>, ignore_patterns: I) -> Result<FileTree, ScanError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let config = ScanConfig::new(root).with_ignore_patterns(ignore_patterns);
    RepoScanner::new().scan(&config, &CancellationToken::new())
}

/// Mutable state threaded through a walk.
struct WalkState {
    tracker: ProgressTracker,
    stats: TreeStats,
    warnings: Vec<ScanWarning>,
    entries_by_parent: HashMap<PathBuf, Vec<EntryInfo>>,
}

/// Temporary struct for collecting entry information.
struct EntryInfo {
    name: CompactString,
    path: PathBuf,
    is_dir: bool,
    meta: EntryMeta,
}

impl EntryInfo {
    fn into_node(self, parent: NodeId) -> FileNode {
        let mut node = if self.is_dir {
            FileNode::new_directory(NodeId(0), self.path, self.name, self.meta.modified)
        } else {
            FileNode::new_file(NodeId(0), self.path, self.name, self.meta.size, self.meta.modified)
        };
        node.parent = Some(parent);
        node
    }
}

/// Validate the root: it must exist, must not be a symlink, and must be a
/// directory. Returns the canonical path.
fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let link_meta = std::fs::symlink_metadata(root).map_err(|e| ScanError::io(root, e))?;
    if link_meta.file_type().is_symlink() {
        return Err(ScanError::SymlinkRoot {
            path: root.to_path_buf(),
        });
    }
    let root_path = root.canonicalize().map_err(|e| ScanError::io(root, e))?;
    if !root_path.is_dir() {
        return Err(ScanError::NotADirectory { path: root_path });
    }
    Ok(root_path)
}

/// Build the node arena from collected entries, root first.
fn build_arena(
    root_path: &Path,
    root_meta: EntryMeta,
    mut entries_by_parent: HashMap<PathBuf, Vec<EntryInfo>>,
) -> Vec<FileNode> {
    let name = root_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root_path.to_string_lossy().to_string());
    let mut nodes = vec![FileNode::new_directory(
        NodeId(0),
        root_path,
        name,
        root_meta.modified,
    )];
    attach_children(NodeId(0), &mut nodes, &mut entries_by_parent);
    nodes
}

/// Recursively attach a directory's children in sibling order.
fn attach_children(
    parent: NodeId,
    nodes: &mut Vec<FileNode>,
    entries_by_parent: &mut HashMap<PathBuf, Vec<EntryInfo>>,
) {
    let children_entries = entries_by_parent
        .remove(&nodes[parent.0].path)
        .unwrap_or_default();

    let mut children: Vec<FileNode> = children_entries
        .into_iter()
        .map(|entry| entry.into_node(parent))
        .collect();
    children.sort_by(|a, b| a.sibling_key().cmp(&b.sibling_key()));

    let mut ids = Vec::with_capacity(children.len());
    for mut child in children {
        let id = NodeId(nodes.len());
        child.id = id;
        let is_dir = child.is_dir();
        nodes.push(child);
        ids.push(id);
        if is_dir {
            attach_children(id, nodes, entries_by_parent);
        }
    }
    nodes[parent.0].children = ids;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("Dir2")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("Alpha.md"), "# alpha").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();
        fs::write(root.join("Dir2/file4.txt"), "another file here").unwrap();

        temp
    }

    fn scan(config: &ScanConfig) -> FileTree {
        RepoScanner::new().scan(config, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_basic_scan() {
        let temp = create_test_tree();
        let tree = scan(&ScanConfig::new(temp.path()));

        assert_eq!(tree.stats.total_files, 5);
        assert_eq!(tree.stats.total_dirs, 3);
        assert_eq!(tree.stats.max_depth, 3);
        assert_eq!(tree.len(), 9);
        assert!(!tree.cancelled);
    }

    #[test]
    fn test_children_sorted_dirs_first_case_insensitive() {
        let temp = create_test_tree();
        let tree = scan(&ScanConfig::new(temp.path()));

        let names: Vec<_> = tree.children(tree.root_id()).map(|c| c.name.to_string()).collect();
        assert_eq!(names, ["dir1", "Dir2", "Alpha.md", "file1.txt"]);
    }

    #[test]
    fn test_parent_links() {
        let temp = create_test_tree();
        let tree = scan(&ScanConfig::new(temp.path()));

        let file3 = tree
            .find(&tree.root_path.join("dir1/subdir/file3.txt"))
            .unwrap();
        let ancestors: Vec<_> = tree
            .ancestors(file3)
            .into_iter()
            .map(|id| tree[id].name.to_string())
            .collect();
        assert_eq!(ancestors[..2], ["subdir", "dir1"]);
        assert_eq!(tree[file3].size, 4);
    }

    #[test]
    fn test_ignore_patterns() {
        let temp = create_test_tree();
        let config = ScanConfig::builder()
            .root(temp.path())
            .ignore_patterns(vec!["Dir2".to_string(), "*.md".to_string()])
            .build()
            .unwrap();
        let tree = scan(&config);

        assert!(!tree.children(tree.root_id()).any(|c| c.name == "Dir2"));
        assert!(!tree.files().any(|f| f.name == "Alpha.md"));
        assert_eq!(tree.stats.ignored_entries, 2);
        assert_eq!(tree.stats.total_files, 3);
    }

    #[test]
    fn test_ignore_by_relative_path() {
        let temp = create_test_tree();
        let config = ScanConfig::new(temp.path()).with_ignore_patterns(["dir1/subdir"]);
        let tree = scan(&config);

        assert!(tree.find(&tree.root_path.join("dir1/subdir")).is_none());
        assert!(tree.find(&tree.root_path.join("dir1/file2.txt")).is_some());
    }

    #[test]
    fn test_parallel_scan_matches_serial() {
        let temp = create_test_tree();
        let serial = scan(&ScanConfig::new(temp.path()));
        let parallel = scan(&ScanConfig::builder().root(temp.path()).threads(2usize).build().unwrap());

        let paths = |t: &FileTree| t.nodes.iter().map(|n| n.path.clone()).collect::<Vec<_>>();
        assert_eq!(paths(&serial), paths(&parallel));
    }

    #[test]
    fn test_root_must_be_directory() {
        let temp = create_test_tree();
        let err = RepoScanner::new()
            .scan(&ScanConfig::new(temp.path().join("file1.txt")), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));

        let err = RepoScanner::new()
            .scan(&ScanConfig::new(temp.path().join("missing")), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let temp = create_test_tree();
        let config = ScanConfig::new(temp.path()).with_ignore_patterns(["[unclosed"]);
        let err = RepoScanner::new()
            .scan(&config, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig { .. }));
    }

    #[test]
    fn test_precancelled_scan_returns_root_only() {
        let temp = create_test_tree();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let tree = RepoScanner::new()
            .scan(&ScanConfig::new(temp.path()), &cancel)
            .unwrap();
        assert!(tree.cancelled);
        assert_eq!(tree.len(), 1);
        assert!(tree.root().is_dir());
    }
}
