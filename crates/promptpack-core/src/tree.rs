//! File tree arena and statistics.

use std::collections::HashSet;
use std::ops::Index;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::error::ScanWarning;
use crate::node::{FileNode, NodeId};

/// Summary statistics for a scanned tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total size of all files in bytes.
    pub total_size: u64,
    /// Total number of files.
    pub total_files: u64,
    /// Total number of directories (excluding the root).
    pub total_dirs: u64,
    /// Symbolic links that were skipped.
    pub skipped_symlinks: u64,
    /// Entries pruned by ignore patterns.
    pub ignored_entries: u64,
    /// Maximum depth reached.
    pub max_depth: u32,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a file entry.
    pub fn record_file(&mut self, size: u64, depth: u32) {
        self.total_files += 1;
        self.total_size += size;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Record a directory.
    pub fn record_dir(&mut self, depth: u32) {
        self.total_dirs += 1;
        self.max_depth = self.max_depth.max(depth);
    }
}

/// Aggregate selection state of a node given a set of selected paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionState {
    /// Neither the node nor any descendant is selected.
    Unchecked,
    /// Some, but not all, descendants are selected.
    Partial,
    /// The node is selected, or every child is.
    Checked,
}

/// Complete scanned file tree.
///
/// Nodes live in a flat arena addressed by [`NodeId`]; the root is always
/// at index 0. Parent links are plain indices, so there is no ownership
/// cycle and aggregate state is computed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTree {
    /// Node arena. `nodes[0]` is the root directory.
    pub nodes: Vec<FileNode>,

    /// Root path that was scanned (canonicalized).
    pub root_path: PathBuf,

    /// When this scan was performed.
    pub scanned_at: SystemTime,

    /// Duration of the scan.
    pub scan_duration: Duration,

    /// Scan configuration used.
    pub config: ScanConfig,

    /// Summary statistics.
    pub stats: TreeStats,

    /// Warnings encountered during scan.
    pub warnings: Vec<ScanWarning>,

    /// Whether the scan stopped early because it was cancelled.
    pub cancelled: bool,
}

impl FileTree {
    /// Create a new file tree from a node arena whose first entry is the root.
    pub fn new(
        nodes: Vec<FileNode>,
        root_path: PathBuf,
        config: ScanConfig,
        stats: TreeStats,
        scan_duration: Duration,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        Self {
            nodes,
            root_path,
            scanned_at: SystemTime::now(),
            scan_duration,
            config,
            stats,
            warnings,
            cancelled: false,
        }
    }

    /// Id of the root node.
    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    /// Root node of the tree.
    pub fn root(&self) -> &FileNode {
        &self.nodes[0]
    }

    /// Look up a node by id.
    pub fn get(&self, id: NodeId) -> Option<&FileNode> {
        self.nodes.get(id.0)
    }

    /// Number of nodes in the arena, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find the node with the given absolute path.
    pub fn find(&self, path: &Path) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.path == path).map(|n| n.id)
    }

    /// Absolute path of a node.
    pub fn path_of(&self, id: NodeId) -> Option<&Path> {
        self.get(id).map(|n| n.path.as_path())
    }

    /// Iterate over the direct children of a node.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &FileNode> + '_ {
        self.get(id)
            .into_iter()
            .flat_map(|n| n.children.iter())
            .filter_map(|c| self.get(*c))
    }

    /// Ancestors of a node, nearest first, ending at the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.get(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            out.push(parent);
            current = self.get(parent).and_then(|n| n.parent);
        }
        out
    }

    /// Pre-order walk of the subtree rooted at `id`, including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Path of a node relative to the root, using `/` separators.
    ///
    /// The root itself maps to an empty string.
    pub fn relative_path(&self, id: NodeId) -> String {
        self.get(id)
            .map(|n| relative_posix(&n.path, &self.root_path))
            .unwrap_or_default()
    }

    /// Every regular file in the tree, in tree order.
    pub fn files(&self) -> impl Iterator<Item = &FileNode> + '_ {
        self.descendants(self.root_id())
            .into_iter()
            .filter_map(|id| self.get(id))
            .filter(|n| n.is_file())
    }

    /// Compute the tri-state selection of a node from a set of selected paths.
    ///
    /// A node whose own path is selected is `Checked`. A directory otherwise
    /// aggregates its children: all checked is `Checked`, none is
    /// `Unchecked`, anything else is `Partial`.
    pub fn selection_state(&self, id: NodeId, selected: &HashSet<PathBuf>) -> SelectionState {
        let Some(node) = self.get(id) else {
            return SelectionState::Unchecked;
        };
        if selected.contains(&node.path) {
            return SelectionState::Checked;
        }
        if node.children.is_empty() {
            return SelectionState::Unchecked;
        }

        let mut checked = 0usize;
        let mut touched = false;
        for child in &node.children {
            match self.selection_state(*child, selected) {
                SelectionState::Checked => {
                    checked += 1;
                    touched = true;
                }
                SelectionState::Partial => touched = true,
                SelectionState::Unchecked => {}
            }
        }

        if checked == node.children.len() {
            SelectionState::Checked
        } else if touched {
            SelectionState::Partial
        } else {
            SelectionState::Unchecked
        }
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        self.stats.total_size
    }

    /// Get the total number of files.
    pub fn total_files(&self) -> u64 {
        self.stats.total_files
    }

    /// Get the total number of directories.
    pub fn total_dirs(&self) -> u64 {
        self.stats.total_dirs
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl Index<NodeId> for FileTree {
    type Output = FileNode;

    fn index(&self, id: NodeId) -> &FileNode {
        &self.nodes[id.0]
    }
}

/// Render `path` relative to `root` with forward slashes.
///
/// Falls back to the bare file name when `path` is not under `root`.
pub fn relative_posix(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}
