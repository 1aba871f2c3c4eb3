use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

const BUFFER_SIZE: usize = 1024 * 1024;

/// Compute full SHA-256 hash of a file
pub fn full_hash(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();

    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash of a directory tree.
///
/// Covers every relative path (files and empty directories alike) and
/// every file's content, visited in sorted order, so two trees hash equal
/// exactly when their structure and bytes are equal.
pub fn hash_tree(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
    {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            hasher.update(b"d\0");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
        } else if entry.file_type().is_file() {
            hasher.update(b"f\0");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
            hasher.update(full_hash(entry.path())?.as_bytes());
            hasher.update(b"\0");
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash a file or a directory tree
pub fn hash_path(path: &Path) -> Result<String> {
    let meta = std::fs::symlink_metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    if meta.is_dir() {
        hash_tree(path)
    } else {
        full_hash(path)
    }
}
