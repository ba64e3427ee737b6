use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use promptpack_scan::{
    EntryMeta, FileTree, MetadataProbe, PathFilter, RepoScanner, ScanConfig, ScanError, ScanEvent,
    StdProbe, WarningKind, scan_repo,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Probe that records every path it is asked about.
#[derive(Default)]
struct CountingProbe {
    seen: Mutex<Vec<PathBuf>>,
}

impl CountingProbe {
    fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

impl MetadataProbe for CountingProbe {
    fn stat(&self, path: &Path) -> io::Result<EntryMeta> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        StdProbe.stat(path)
    }
}

/// Probe that fails for one file name.
struct FailingProbe {
    fail_on: &'static str,
}

impl MetadataProbe for FailingProbe {
    fn stat(&self, path: &Path) -> io::Result<EntryMeta> {
        if path.file_name().is_some_and(|n| n == self.fail_on) {
            return Err(io::Error::other("stat exploded"));
        }
        StdProbe.stat(path)
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn web_repo() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "package.json", "{}");
    write(root, "src/index.js", "console.log(1)");
    write(root, "node_modules/left-pad/index.js", "module.exports = 1");
    write(root, "node_modules/left-pad/package.json", "{}");
    write(root, "packages/ui/node_modules/react/index.js", "x");
    write(root, "packages/ui/button.js", "export {}");
    temp
}

fn relative_files(tree: &FileTree) -> Vec<String> {
    let mut files: Vec<String> = tree.files().map(|f| tree.relative_path(f.id)).collect();
    files.sort();
    files
}

#[test]
fn test_node_modules_pruned_without_stat() {
    let temp = web_repo();
    let probe = Arc::new(CountingProbe::default());
    let scanner = RepoScanner::with_probe(probe.clone());
    let config = ScanConfig::new(temp.path()).with_ignore_patterns(["node_modules"]);

    let tree = scanner.scan(&config, &CancellationToken::new()).unwrap();

    assert_eq!(
        relative_files(&tree),
        ["package.json", "packages/ui/button.js", "src/index.js"]
    );
    assert!(tree.nodes.iter().all(|n| n.name != "node_modules"));
    assert_eq!(tree.stats.ignored_entries, 2);

    let seen = probe.seen();
    assert!(!seen.is_empty());
    assert!(
        seen.iter()
            .all(|p| !p.components().any(|c| c.as_os_str() == "node_modules")),
        "pruned subtree was stat'ed: {seen:?}"
    );
}

#[cfg(unix)]
#[test]
fn test_symlinks_never_appear() {
    use std::os::unix::fs::symlink;

    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "real/file.txt", "data");
    write(root, "outside.txt", "outside");
    symlink(root.join("real"), root.join("linked_dir")).unwrap();
    symlink(root.join("outside.txt"), root.join("real/linked_file.txt")).unwrap();
    symlink("/nonexistent/target", root.join("dangling")).unwrap();

    let tree = scan_repo(root, Vec::<String>::new()).unwrap();

    assert_eq!(relative_files(&tree), ["outside.txt", "real/file.txt"]);
    assert!(tree.nodes.iter().all(|n| !n.path.is_symlink()));
    assert_eq!(tree.stats.skipped_symlinks, 3);
}

#[cfg(unix)]
#[test]
fn test_symlink_root_rejected() {
    use std::os::unix::fs::symlink;

    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("real")).unwrap();
    symlink(temp.path().join("real"), temp.path().join("alias")).unwrap();

    let err = scan_repo(temp.path().join("alias"), Vec::<String>::new()).unwrap_err();
    assert!(matches!(err, ScanError::SymlinkRoot { .. }));
}

#[test]
fn test_stat_failure_omits_entry_and_warns() {
    let temp = web_repo();
    let scanner = RepoScanner::with_probe(Arc::new(FailingProbe {
        fail_on: "index.js",
    }));
    let mut events = scanner.subscribe();
    let config = ScanConfig::new(temp.path()).with_ignore_patterns(["node_modules"]);

    let tree = scanner.scan(&config, &CancellationToken::new()).unwrap();

    assert_eq!(
        relative_files(&tree),
        ["package.json", "packages/ui/button.js"]
    );
    assert_eq!(tree.warnings.len(), 1);
    assert_eq!(tree.warnings[0].kind, WarningKind::MetadataError);

    let mut warned = false;
    while let Ok(event) = events.try_recv() {
        if let ScanEvent::Warning(w) = event {
            warned = w.path.ends_with("src/index.js");
        }
    }
    assert!(warned);
}

#[test]
fn test_dir_stat_failure_drops_subtree_from_stats() {
    let temp = web_repo();
    let scanner = RepoScanner::with_probe(Arc::new(FailingProbe {
        fail_on: "packages",
    }));
    let config = ScanConfig::new(temp.path()).with_ignore_patterns(["node_modules"]);

    let tree = scanner.scan(&config, &CancellationToken::new()).unwrap();

    assert_eq!(relative_files(&tree), ["package.json", "src/index.js"]);
    assert_eq!(tree.stats.total_files, tree.files().count() as u64);
    assert_eq!(tree.stats.total_dirs, 1);
    assert_eq!(
        tree.stats.total_size,
        tree.files().map(|f| f.size).sum::<u64>()
    );
    assert_eq!(tree.warnings.len(), 1);
    assert!(tree.warnings[0].path.ends_with("packages"));
}

#[test]
fn test_scan_is_deterministic() {
    let temp = web_repo();
    let first = scan_repo(temp.path(), ["node_modules"]).unwrap();
    let second = scan_repo(temp.path(), ["node_modules"]).unwrap();

    let shape = |t: &FileTree| {
        t.nodes
            .iter()
            .map(|n| (n.path.clone(), n.children.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&first), shape(&second));
}

#[test]
fn test_scan_then_filter() {
    let temp = web_repo();
    let tree = scan_repo(temp.path(), ["node_modules"]).unwrap();
    let filter = PathFilter::new(["*.js"], ["packages"]).unwrap();

    let result = filter.filter(&tree, &tree.root().children);
    let files: Vec<_> = result
        .file_paths(&tree)
        .into_iter()
        .map(|p| p.strip_prefix(&tree.root_path).unwrap().to_path_buf())
        .collect();

    assert_eq!(files, [PathBuf::from("src/index.js")]);
}

#[test]
fn test_final_progress_event() {
    let temp = web_repo();
    let scanner = RepoScanner::new();
    let mut events = scanner.subscribe();
    scanner
        .scan(&ScanConfig::new(temp.path()), &CancellationToken::new())
        .unwrap();

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        if let ScanEvent::Progress(p) = event {
            last = Some(p);
        }
    }
    let last = last.expect("a final progress snapshot");
    assert_eq!(last.files_scanned, 6);
}
