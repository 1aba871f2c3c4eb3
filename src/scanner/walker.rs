use std::path::Path;
use walkdir::WalkDir;

use super::classify;
use super::targets::{DiscoveredStore, ScanResults, StoreKind};
use crate::common::config::CleaningOptions;
use crate::common::format;
use crate::common::progress::Progress;

/// Walk one resolved root and append every classified store to `results`.
///
/// Never fails as a whole: unreadable entries are recorded in
/// `results.errors` and the walk continues.
pub fn walk_root(
    root: &Path,
    options: &CleaningOptions,
    progress: &Progress,
    results: &mut ScanResults,
) {
    let mut it = WalkDir::new(root).follow_links(false).into_iter();

    while let Some(entry) = it.next() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                results.errors.push(format!("Scan error: {}", e));
                continue;
            }
        };

        if entry.depth() == 0 {
            continue;
        }

        let path = entry.path();

        if entry.file_type().is_dir() {
            if is_cache_dir(root, path, &options.cache_directories) {
                let (size, files) = dir_stats(path);
                progress.advance(size, &format::truncate(&format::format_path(path), 40));
                results.stores.push(DiscoveredStore {
                    path: path.to_path_buf(),
                    root: root.to_path_buf(),
                    kind: StoreKind::CacheDir,
                    size_bytes: size,
                    entry_count: Some(files),
                    note: None,
                });
                // Cache contents are opaque; don't list them individually
                it.skip_current_dir();
            }
            continue;
        }

        if !entry.file_type().is_file() || is_backup_artifact(root, path) {
            continue;
        }

        if let Some(store) = classify::classify_file(path, root, options) {
            progress.advance(store.size_bytes, &format::truncate(&format::format_path(path), 40));
            if let Some(ref note) = store.note {
                results
                    .errors
                    .push(format!("Unreadable store '{}': {}", path.display(), note));
            }
            results.stores.push(store);
        }
    }
}

/// Whether `path` (a directory under `root`) is a configured cache directory.
///
/// Single names match at any depth; entries with a separator
/// (`User/workspaceStorage`) match the root-relative path exactly.
pub fn is_cache_dir(root: &Path, path: &Path, cache_names: &[String]) -> bool {
    let rel = match path.strip_prefix(root) {
        Ok(r) => r,
        Err(_) => return false,
    };
    let name = match path.file_name() {
        Some(n) => n.to_string_lossy(),
        None => return false,
    };

    cache_names.iter().any(|entry| {
        if entry.contains('/') || entry.contains('\\') {
            rel == Path::new(entry)
        } else {
            name == entry.as_str()
        }
    })
}

/// Files left behind by other backup tools are never treated as stores.
/// Only the part below `root` counts; the root's own location may say "backup".
fn is_backup_artifact(root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let s = rel.to_string_lossy().to_lowercase();
    s.contains("backup") || s.ends_with(".bak")
}

/// Total size and file count of a directory
pub fn dir_stats(path: &Path) -> (u64, u64) {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(size, count), e| {
            let len = e.metadata().map(|m| m.len()).unwrap_or(0);
            (size + len, count + 1)
        })
}

/// Calculate total size of a directory
pub fn dir_size(path: &Path) -> u64 {
    dir_stats(path).0
}

/// Size of a file, or aggregated size of a directory
pub fn path_size(path: &Path) -> u64 {
    match std::fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => dir_size(path),
        Ok(m) => m.len(),
        Err(_) => 0,
    }
}
