//! File and directory node types.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Index of a node within a [`FileTree`](crate::FileTree) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Create a new NodeId from an arena index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Type of file system node.
///
/// Symlinks never make it into a scanned tree, so only files and
/// directories are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }
}

/// A single file or directory in the tree.
///
/// Two nodes are equal iff they have the same path, so nodes can be keyed
/// by path in sets and maps regardless of which scan produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    /// Position of this node in the arena.
    pub id: NodeId,

    /// Absolute, canonicalized path.
    pub path: PathBuf,

    /// File/directory name (not full path).
    pub name: CompactString,

    /// Node type.
    pub kind: NodeKind,

    /// Size in bytes (0 for directories).
    pub size: u64,

    /// Last modification time.
    pub modified: SystemTime,

    /// Containing directory, `None` for the root.
    pub parent: Option<NodeId>,

    /// Children (directories only): directories first, then files, each
    /// group sorted case-insensitively by name.
    pub children: Vec<NodeId>,
}

impl FileNode {
    /// Create a new file node.
    pub fn new_file(
        id: NodeId,
        path: impl Into<PathBuf>,
        name: impl Into<CompactString>,
        size: u64,
        modified: SystemTime,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            name: name.into(),
            kind: NodeKind::File,
            size,
            modified,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Create a new directory node.
    pub fn new_directory(
        id: NodeId,
        path: impl Into<PathBuf>,
        name: impl Into<CompactString>,
        modified: SystemTime,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            name: name.into(),
            kind: NodeKind::Directory,
            size: 0,
            modified,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Absolute path of this node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ordering key for siblings: directories first, then case-insensitive
    /// name, with the exact name as a tiebreak so the order is total.
    pub fn sibling_key(&self) -> (bool, String, &str) {
        (!self.is_dir(), self.name.to_lowercase().to_string(), self.name.as_str())
    }
}

impl PartialEq for FileNode {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileNode {}

impl Hash for FileNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}
