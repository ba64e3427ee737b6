//! Include/exclude filtering over a scanned tree.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use tracing::debug;

use promptpack_core::{FileTree, GlobList, NodeId, PatternError};

/// Include and exclude glob lists applied to a scanned tree.
///
/// Each pattern is tested against both the bare name and the root-relative
/// forward-slash path of a node.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobList,
    exclude: GlobList,
}

/// Outcome of [`PathFilter::filter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterResult {
    /// Flat set of kept nodes: matches plus their ancestors, minus excluded
    /// subtrees.
    pub selected: BTreeSet<NodeId>,
    /// Every node inside an excluded subtree.
    excluded: HashSet<NodeId>,
    /// Nodes that matched an include pattern directly.
    matched: HashSet<NodeId>,
    /// Whether include patterns narrowed the selection.
    narrowed: bool,
}

impl PathFilter {
    /// Compile include and exclude patterns.
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        E: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Ok(Self {
            include: GlobList::new(include)?,
            exclude: GlobList::new(exclude)?,
        })
    }

    /// A filter with no patterns.
    pub fn passthrough() -> Self {
        Self {
            include: GlobList::empty(),
            exclude: GlobList::empty(),
        }
    }

    /// Check whether both pattern lists are empty.
    pub fn is_passthrough(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Filter `nodes` (and everything beneath them).
    ///
    /// Applying the filter again to its own `selected` set yields the same
    /// set.
    pub fn filter(&self, tree: &FileTree, nodes: &[NodeId]) -> FilterResult {
        if self.is_passthrough() {
            return FilterResult {
                selected: nodes.iter().copied().collect(),
                ..FilterResult::default()
            };
        }

        let reachable: BTreeSet<NodeId> = nodes
            .iter()
            .flat_map(|id| tree.descendants(*id))
            .collect();

        let mut matched = HashSet::new();
        let kept: HashSet<NodeId> = if self.include.is_empty() {
            reachable.iter().copied().collect()
        } else {
            let mut kept = HashSet::new();
            for id in &reachable {
                if self.matches(&self.include, tree, *id) {
                    matched.insert(*id);
                    kept.insert(*id);
                    kept.extend(tree.ancestors(*id));
                }
            }
            kept
        };

        let mut excluded = HashSet::new();
        if !self.exclude.is_empty() {
            let mut stack: Vec<NodeId> = nodes.to_vec();
            let mut visited = HashSet::new();
            while let Some(id) = stack.pop() {
                if !kept.contains(&id) || excluded.contains(&id) || !visited.insert(id) {
                    continue;
                }
                if self.matches(&self.exclude, tree, id) {
                    excluded.extend(tree.descendants(id));
                    continue;
                }
                stack.extend(tree.children(id).map(|c| c.id));
            }
        }

        let selected: BTreeSet<NodeId> = reachable
            .into_iter()
            .filter(|id| kept.contains(id) && !excluded.contains(id))
            .collect();

        debug!(
            input = nodes.len(),
            selected = selected.len(),
            excluded = excluded.len(),
            "Filtered nodes"
        );

        FilterResult {
            selected,
            excluded,
            matched,
            narrowed: !self.include.is_empty(),
        }
    }

    fn matches(&self, globs: &GlobList, tree: &FileTree, id: NodeId) -> bool {
        match tree.get(id) {
            Some(node) => globs.is_match(&node.name, &tree.relative_path(id)),
            None => false,
        }
    }
}

impl FilterResult {
    /// Number of selected nodes.
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Check whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Check whether a node is selected.
    pub fn contains(&self, id: NodeId) -> bool {
        self.selected.contains(&id)
    }

    /// Selected node ids, in arena order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.selected.iter().copied().collect()
    }

    /// Expand the selection into a sorted, de-duplicated list of file paths.
    ///
    /// A selected directory contributes its files, except those inside an
    /// excluded subtree. When include patterns were given, a directory kept
    /// only as the ancestor of a match contributes just its matching
    /// descendants.
    pub fn file_paths(&self, tree: &FileTree) -> Vec<PathBuf> {
        let mut paths = BTreeSet::new();
        for id in &self.selected {
            let Some(node) = tree.get(*id) else {
                continue;
            };
            if node.is_file() {
                paths.insert(node.path.clone());
                continue;
            }
            let whole = !self.narrowed || self.under_match(tree, *id);
            let mut stack = vec![*id];
            while let Some(current) = stack.pop() {
                if self.excluded.contains(&current) {
                    continue;
                }
                let Some(entry) = tree.get(current) else {
                    continue;
                };
                if entry.is_file() {
                    if whole || self.selected.contains(&current) {
                        paths.insert(entry.path.clone());
                    }
                } else {
                    stack.extend(entry.children.iter().copied());
                }
            }
        }
        paths.into_iter().collect()
    }

    fn under_match(&self, tree: &FileTree, id: NodeId) -> bool {
        self.matched.contains(&id) || tree.ancestors(id).iter().any(|a| self.matched.contains(a))
    }
}
