use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use syncbox_core::config::WalkConfig;
use walkdir::{DirEntry, WalkDir};

use crate::ignore::{IgnoreRules, Verdict};

/// What the user handed to the walker.
#[derive(Debug, Clone)]
pub enum Selection {
    /// A picked directory. Paths are relative to it and exclude its own name.
    Directory(PathBuf),
    /// Dropped entries, files or folders. A dropped folder contributes its
    /// own name as the first path segment.
    Entries(Vec<PathBuf>),
    /// Flat file list with no hierarchy. Each file lands at the top level.
    Files(Vec<PathBuf>),
}

/// One entry accepted by the walk.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    /// `/`-separated path relative to the selection.
    pub path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub is_directory: bool,
    pub source_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkErrorKind {
    Oversized,
    Unreadable,
}

#[derive(Debug, Clone)]
pub struct WalkError {
    pub path: String,
    pub kind: WalkErrorKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct WalkResult {
    pub files: Vec<WalkedFile>,
    pub total_size: u64,
    pub file_count: u64,
    pub directory_count: u64,
    pub ignored_count: u64,
    pub errors: Vec<WalkError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkProgress {
    pub current_path: String,
    pub files_processed: u64,
    pub total_files: u64,
    pub current_size: u64,
    pub total_size: u64,
}

/// Walk `selection`, applying the ignore, hidden, dependency and size rules.
///
/// Discovery runs first so that progress can report totals; the second pass
/// reports one progress update per accepted file. File content is never
/// opened here; only metadata is read. Only a
/// bad custom ignore pattern fails the walk; per-entry problems end up in
/// `WalkResult::errors`.
pub fn walk(
    selection: &Selection,
    config: &WalkConfig,
    on_progress: &mut dyn FnMut(&WalkProgress),
) -> anyhow::Result<WalkResult> {
    let rules = IgnoreRules::new(&config.custom_ignore_patterns, config.include_hidden)?;
    let mut result = WalkResult::default();
    let mut found = Vec::new();

    match selection {
        Selection::Directory(root) => {
            discover_tree(root, None, &rules, config, &mut found, &mut result);
        }
        Selection::Entries(entries) => {
            for entry in entries {
                let name = file_name(entry);
                if entry.is_dir() {
                    discover_tree(entry, Some(name.as_str()), &rules, config, &mut found, &mut result);
                } else {
                    discover_file(entry, name, &rules, config, &mut found, &mut result);
                }
            }
        }
        Selection::Files(files) => {
            for file in files {
                let name = file_name(file);
                discover_file(file, name, &rules, config, &mut found, &mut result);
            }
        }
    }

    let total_files = found.iter().filter(|f| !f.is_directory).count() as u64;
    let total_size: u64 = found.iter().map(|f| f.size).sum();
    let mut progress = WalkProgress {
        current_path: String::new(),
        files_processed: 0,
        total_files,
        current_size: 0,
        total_size,
    };

    for file in found {
        if file.is_directory {
            result.files.push(file);
            continue;
        }

        progress.current_path = file.path.clone();
        progress.files_processed += 1;
        progress.current_size += file.size;
        on_progress(&progress);

        result.file_count += 1;
        result.total_size += file.size;
        result.files.push(file);
    }

    tracing::info!(
        files = result.file_count,
        dirs = result.directory_count,
        ignored = result.ignored_count,
        errors = result.errors.len(),
        bytes = result.total_size,
        "walk finished"
    );
    Ok(result)
}

/// Run [`walk`] on a background thread, streaming progress over a channel.
///
/// The channel closes when the walk ends; join the handle for the result.
pub fn spawn_walk(
    selection: Selection,
    config: WalkConfig,
) -> (Receiver<WalkProgress>, JoinHandle<anyhow::Result<WalkResult>>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = thread::spawn(move || {
        walk(&selection, &config, &mut |p| {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(p.clone());
        })
    });
    (rx, handle)
}

fn discover_tree(
    root: &Path,
    prefix: Option<&str>,
    rules: &IgnoreRules,
    config: &WalkConfig,
    found: &mut Vec<WalkedFile>,
    result: &mut WalkResult,
) {
    let ignored = Cell::new(0u64);
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let Some(rel) = relative_path(root, prefix, entry) else {
                return true;
            };
            let verdict = rules.classify(&rel, entry.file_type().is_dir());
            if verdict != Verdict::Keep {
                ignored.set(ignored.get() + 1);
            }
            verdict.is_keep()
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(|p| join_rel(prefix, p))
                    .unwrap_or_else(|| root.display().to_string());
                result.errors.push(WalkError {
                    path,
                    kind: WalkErrorKind::Unreadable,
                    message: e.to_string(),
                });
                continue;
            }
        };

        // The picked directory itself is not part of the result.
        let Some(rel) = relative_path(root, prefix, &entry) else {
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            ignored.set(ignored.get() + 1);
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                result.errors.push(WalkError {
                    path: rel,
                    kind: WalkErrorKind::Unreadable,
                    message: e.to_string(),
                });
                continue;
            }
        };

        if file_type.is_dir() {
            result.directory_count += 1;
            if config.include_directories {
                found.push(WalkedFile {
                    path: rel,
                    size: 0,
                    mtime: mtime_of(&metadata),
                    is_directory: true,
                    source_path: entry.path().to_path_buf(),
                });
            }
            continue;
        }

        accept_file(rel, entry.path(), &metadata, config, found, result);
    }

    result.ignored_count += ignored.get();
}

fn discover_file(
    path: &Path,
    rel: String,
    rules: &IgnoreRules,
    config: &WalkConfig,
    found: &mut Vec<WalkedFile>,
    result: &mut WalkResult,
) {
    if !rules.classify(&rel, false).is_keep() {
        result.ignored_count += 1;
        return;
    }
    match fs::metadata(path) {
        Ok(metadata) => accept_file(rel, path, &metadata, config, found, result),
        Err(e) => result.errors.push(WalkError {
            path: rel,
            kind: WalkErrorKind::Unreadable,
            message: e.to_string(),
        }),
    }
}

fn accept_file(
    rel: String,
    source: &Path,
    metadata: &fs::Metadata,
    config: &WalkConfig,
    found: &mut Vec<WalkedFile>,
    result: &mut WalkResult,
) {
    let size = metadata.len();
    if size > config.max_file_size {
        result.errors.push(WalkError {
            message: format!(
                "file is {size} bytes, limit is {} bytes",
                config.max_file_size
            ),
            path: rel,
            kind: WalkErrorKind::Oversized,
        });
        return;
    }
    found.push(WalkedFile {
        path: rel,
        size,
        mtime: mtime_of(metadata),
        is_directory: false,
        source_path: source.to_path_buf(),
    });
}

/// Path of `entry` relative to the selection, or `None` for a picked root.
fn relative_path(root: &Path, prefix: Option<&str>, entry: &DirEntry) -> Option<String> {
    let rel = entry.path().strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() && prefix.is_none() {
        return None;
    }
    Some(join_rel(prefix, rel))
}

fn join_rel(prefix: Option<&str>, rel: &Path) -> String {
    let mut parts: Vec<String> = prefix.map(str::to_string).into_iter().collect();
    parts.extend(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn mtime_of(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .ok()
        .and_then(|t| {
            let duration = t
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default();
            DateTime::from_timestamp(duration.as_secs() as i64, duration.subsec_nanos())
        })
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn paths(result: &WalkResult) -> Vec<&str> {
        result.files.iter().map(|f| f.path.as_str()).collect()
    }

    fn no_progress() -> impl FnMut(&WalkProgress) {
        |_| {}
    }

    #[test]
    fn test_dropped_folder_skips_dependency_contents() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("proj");
        write(&project, "src/a.py", b"print('a')");
        write(&project, "src/b.py", b"print('b')");
        write(&project, "vendor/lib/index.js", b"x=1;\n");

        let result = walk(
            &Selection::Entries(vec![project]),
            &WalkConfig::default(),
            &mut no_progress(),
        )
        .unwrap();

        assert_eq!(paths(&result), vec!["proj/src/a.py", "proj/src/b.py"]);
        assert_eq!(result.file_count, 2);
        assert_eq!(result.total_size, 20);
        assert!(result.ignored_count >= 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_picked_directory_paths_exclude_root_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.py", b"print('a')");
        write(dir.path(), "README.md", b"# hi");

        let result = walk(
            &Selection::Directory(dir.path().to_path_buf()),
            &WalkConfig::default(),
            &mut no_progress(),
        )
        .unwrap();
        assert_eq!(paths(&result), vec!["README.md", "src/a.py"]);
        assert_eq!(result.directory_count, 1);
    }

    #[test]
    fn test_dependency_manifest_retained() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "vendor/modules.txt", b"# deps");
        write(dir.path(), "vendor/pkg/lib.go", b"package pkg");
        write(dir.path(), "node_modules/.package-lock.json", b"{}");
        write(dir.path(), "node_modules/left-pad/index.js", b"module.exports=1");

        let result = walk(
            &Selection::Directory(dir.path().to_path_buf()),
            &WalkConfig::default(),
            &mut no_progress(),
        )
        .unwrap();
        assert_eq!(
            paths(&result),
            vec!["node_modules/.package-lock.json", "vendor/modules.txt"]
        );
    }

    #[test]
    fn test_oversized_is_error_not_dropped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "big.bin", &[0u8; 64]);
        write(dir.path(), "small.txt", b"ok");
        let config = WalkConfig {
            max_file_size: 32,
            ..WalkConfig::default()
        };

        let result = walk(
            &Selection::Directory(dir.path().to_path_buf()),
            &config,
            &mut no_progress(),
        )
        .unwrap();
        assert_eq!(paths(&result), vec!["small.txt"]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "big.bin");
        assert_eq!(result.errors[0].kind, WalkErrorKind::Oversized);
    }

    #[test]
    fn test_hidden_and_custom_patterns() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".env", b"SECRET=1");
        write(dir.path(), ".git/HEAD", b"ref");
        write(dir.path(), "app.log", b"log");
        write(dir.path(), "main.rs", b"fn main() {}");

        let config = WalkConfig {
            custom_ignore_patterns: vec!["*.log".to_string()],
            ..WalkConfig::default()
        };
        let result = walk(
            &Selection::Directory(dir.path().to_path_buf()),
            &config,
            &mut no_progress(),
        )
        .unwrap();
        assert_eq!(paths(&result), vec!["main.rs"]);
        assert_eq!(result.ignored_count, 3);

        let config = WalkConfig {
            include_hidden: true,
            ..WalkConfig::default()
        };
        let result = walk(
            &Selection::Directory(dir.path().to_path_buf()),
            &config,
            &mut no_progress(),
        )
        .unwrap();
        assert_eq!(paths(&result), vec![".env", "app.log", "main.rs"]);
    }

    #[test]
    fn test_flat_file_list_loses_hierarchy() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "deep/nested/one.txt", b"1");
        write(dir.path(), "two.txt", b"2");

        let result = walk(
            &Selection::Files(vec![
                dir.path().join("deep/nested/one.txt"),
                dir.path().join("two.txt"),
                dir.path().join("missing.txt"),
            ]),
            &WalkConfig::default(),
            &mut no_progress(),
        )
        .unwrap();
        assert_eq!(paths(&result), vec!["one.txt", "two.txt"]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, WalkErrorKind::Unreadable);
    }

    #[test]
    fn test_directory_records() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/guide.md", b"# Guide");
        write(dir.path(), "img.bin", &[0xff, 0xfe, 0x00]);

        let config = WalkConfig {
            include_directories: true,
            ..WalkConfig::default()
        };
        let result = walk(
            &Selection::Directory(dir.path().to_path_buf()),
            &config,
            &mut no_progress(),
        )
        .unwrap();

        let docs = result.files.iter().find(|f| f.path == "docs").unwrap();
        assert!(docs.is_directory);
        assert_eq!(docs.size, 0);
        assert_eq!(result.file_count, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_content_permission_not_needed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write(dir.path(), "locked.txt", b"secret");
        write(dir.path(), "open.txt", b"hello");
        let locked = dir.path().join("locked.txt");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let result = walk(
            &Selection::Directory(dir.path().to_path_buf()),
            &WalkConfig::default(),
            &mut no_progress(),
        )
        .unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(paths(&result), vec!["locked.txt", "open.txt"]);
        assert_eq!(result.total_size, 11);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_progress_reports_totals() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", b"aaaa");
        write(dir.path(), "b.txt", b"bb");

        let mut seen = Vec::new();
        walk(
            &Selection::Directory(dir.path().to_path_buf()),
            &WalkConfig::default(),
            &mut |p| seen.push(p.clone()),
        )
        .unwrap();

        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| p.total_files == 2 && p.total_size == 6));
        let last = seen.last().unwrap();
        assert_eq!(last.files_processed, 2);
        assert_eq!(last.current_size, 6);
    }

    #[test]
    fn test_spawn_walk_streams_progress() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", b"a");
        write(dir.path(), "b.txt", b"b");
        write(dir.path(), "c.txt", b"c");

        let (rx, handle) = spawn_walk(
            Selection::Directory(dir.path().to_path_buf()),
            WalkConfig::default(),
        );
        let updates: Vec<WalkProgress> = rx.iter().collect();
        let result = handle.join().unwrap().unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(result.file_count, 3);
    }
}
