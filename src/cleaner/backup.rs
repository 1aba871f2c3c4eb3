use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::hasher;
use super::manifest::{sidecar_path, SidecarCopy, SnapshotEntry, SnapshotManifest, CAPTURED_SIDECARS, FILES_DIR};
use super::script;
use crate::common::config::{BackupOptions, Config};
use crate::common::errors::CleanError;
use crate::common::format;
use crate::common::progress::Progress;
use crate::common::safety;
use crate::scanner::targets::{DiscoveredStore, StoreKind};

pub const ARCHIVE_FILE: &str = "snapshot.zip";

/// Copies one path into the snapshot
pub trait SnapshotCopier {
    fn copy(&self, src: &Path, dst: &Path) -> Result<()>;
}

/// Plain file system copy
pub struct FsCopier;

impl SnapshotCopier for FsCopier {
    fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        copy_path(src, dst)
    }
}

/// Copy a file or a directory tree to `dst`
pub fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(src)
        .with_context(|| format!("Path does not exist: {}", src.display()))?;

    if meta.is_dir() {
        copy_dir_recursive(src, dst)
    } else {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create dir: {}", parent.display()))?;
        }
        std::fs::copy(src, dst)
            .with_context(|| format!("Failed to copy '{}' to '{}'", src.display(), dst.display()))?;
        Ok(())
    }
}

/// Recursively copy a directory. Symlinks are not followed or copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).with_context(|| format!("Failed to create dir: {}", dst.display()))?;

    for entry in std::fs::read_dir(src).with_context(|| format!("Failed to read dir: {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            std::fs::copy(&src_path, &dst_path)
                .with_context(|| format!("Failed to copy {}", src_path.display()))?;
        }
    }

    Ok(())
}

/// Produces verified snapshots under a backup root
pub struct BackupManager {
    options: BackupOptions,
    root: PathBuf,
    copier: Box<dyn SnapshotCopier>,
}

impl BackupManager {
    pub fn new(config: &Config) -> Self {
        Self::with_root(config.backup.clone(), config.backup_root())
    }

    pub fn with_root(options: BackupOptions, root: PathBuf) -> Self {
        Self {
            options,
            root,
            copier: Box::new(FsCopier),
        }
    }

    /// Replace the copy step
    pub fn with_copier(mut self, copier: impl SnapshotCopier + 'static) -> Self {
        self.copier = Box::new(copier);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot every mutable store before it is touched.
    ///
    /// On success the returned manifest is complete and every entry is
    /// verified. On failure the manifest on disk stays `complete = false`
    /// and the partial copy is left in place for inspection.
    pub fn snapshot(
        &self,
        application: &str,
        operation: &str,
        stores: &[DiscoveredStore],
        progress: &Progress,
    ) -> Result<SnapshotManifest, CleanError> {
        let stores: Vec<&DiscoveredStore> = stores.iter().filter(|s| s.kind.is_mutable()).collect();
        let total: u64 = stores.iter().map(|s| footprint(s)).sum();

        safety::validate_backup_size(total, self.options.max_total_bytes())?;
        std::fs::create_dir_all(&self.root).map_err(|e| CleanError::io(&self.root, e))?;
        safety::validate_free_space(&self.root, total)?;

        let dir = self.unique_dir(application, operation);
        let mut manifest = SnapshotManifest::new(application, operation, &dir);
        // Crash marker goes down before the first copy
        manifest.save()?;
        tracing::info!(
            "Snapshot {}: {} stores, {} bytes",
            manifest.snapshot_id,
            stores.len(),
            total
        );

        let mut roots: Vec<&Path> = Vec::new();

        for store in stores {
            safety::ensure_not_protected(&store.path)?;

            let root_idx = match roots.iter().position(|r| *r == store.root.as_path()) {
                Some(i) => i,
                None => {
                    roots.push(store.root.as_path());
                    roots.len() - 1
                }
            };
            let root_name = store
                .root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "root".into());
            let backup_rel = PathBuf::from(FILES_DIR)
                .join(format!("{}-{}", root_idx, root_name))
                .join(store.relative_path());
            let dst = dir.join(&backup_rel);

            let (entry, failure) = self.copy_verified(store, &dst, &backup_rel);
            // Unverified entries are recorded too, as evidence of where the run stopped
            manifest.append(entry)?;

            if let Some(message) = failure {
                tracing::error!("Snapshot {} aborted at {}", manifest.snapshot_id, store.path.display());
                return Err(CleanError::BackupVerificationFailed {
                    path: store.path.clone(),
                    message,
                });
            }

            progress.advance(store.size_bytes, &format::truncate(&format::format_path(&store.path), 40));
        }

        if self.options.compression {
            write_archive(&manifest).map_err(|e| CleanError::BackupVerificationFailed {
                path: dir.join(ARCHIVE_FILE),
                message: format!("{:#}", e),
            })?;
            manifest.set_archive(ARCHIVE_FILE)?;
        }

        if self.options.create_restore_script {
            script::write_scripts(&manifest)?;
        }

        manifest.mark_complete()?;
        tracing::info!("Snapshot {} complete", manifest.snapshot_id);
        Ok(manifest)
    }

    /// Copy one store and compare checksums; the second value is the
    /// failure reason when the entry is unverified
    fn copy_verified(&self, store: &DiscoveredStore, dst: &Path, backup_rel: &Path) -> (SnapshotEntry, Option<String>) {
        let mut entry = SnapshotEntry {
            original_path: store.path.clone(),
            backup_path: backup_rel.to_path_buf(),
            checksum: String::new(),
            kind: store.kind,
            size_bytes: store.size_bytes,
            is_dir: store.path.is_dir(),
            verified: false,
            sidecars: Vec::new(),
        };

        let result = self.copy_checked(&store.path, dst).and_then(|checksum| {
            let sidecars = if store.kind == StoreKind::KvStore {
                self.copy_sidecars(&store.path, dst, backup_rel)?
            } else {
                Vec::new()
            };
            Ok((checksum, sidecars))
        });

        match result {
            Ok((checksum, sidecars)) => {
                entry.checksum = checksum;
                entry.sidecars = sidecars;
                entry.verified = true;
                (entry, None)
            }
            Err(e) => {
                tracing::error!("Backup of {} failed: {:#}", store.path.display(), e);
                (entry, Some(format!("{:#}", e)))
            }
        }
    }

    /// Copy `src` to `dst` and return the checksum both share
    fn copy_checked(&self, src: &Path, dst: &Path) -> Result<String> {
        let source = hasher::hash_path(src)?;
        self.copier.copy(src, dst)?;
        let copy = hasher::hash_path(dst)?;
        if source != copy {
            anyhow::bail!("checksum mismatch for {} (source {}, copy {})", src.display(), source, copy);
        }
        Ok(copy)
    }

    /// Committed rows can sit in `-wal` or a hot `-journal` until the
    /// next checkpoint, so those files travel with the database
    fn copy_sidecars(&self, db: &Path, dst: &Path, backup_rel: &Path) -> Result<Vec<SidecarCopy>> {
        let mut copies = Vec::new();
        for suffix in CAPTURED_SIDECARS {
            let src = sidecar_path(db, suffix);
            if !src.is_file() {
                continue;
            }
            let checksum = self.copy_checked(&src, &sidecar_path(dst, suffix))?;
            tracing::debug!("Captured {}", src.display());
            copies.push(SidecarCopy {
                suffix: suffix.to_string(),
                backup_path: sidecar_path(backup_rel, suffix),
                checksum,
                size_bytes: std::fs::metadata(&src).map(|m| m.len()).unwrap_or(0),
            });
        }
        Ok(copies)
    }

    /// `<root>/<app>_<operation>_<YYYYMMDD_HHMMSS>`, suffixed `_N` on collision
    fn unique_dir(&self, application: &str, operation: &str) -> PathBuf {
        let base = format!("{}_{}_{}", application, operation, format::format_stamp(&Utc::now()));
        let mut dir = self.root.join(&base);
        let mut n = 1;
        while dir.exists() {
            dir = self.root.join(format!("{}_{}", base, n));
            n += 1;
        }
        dir
    }
}

/// Bytes a store occupies, journal files included
fn footprint(store: &DiscoveredStore) -> u64 {
    if store.kind != StoreKind::KvStore {
        return store.size_bytes;
    }
    CAPTURED_SIDECARS
        .iter()
        .filter_map(|suffix| std::fs::metadata(sidecar_path(&store.path, suffix)).ok())
        .fold(store.size_bytes, |total, m| total + m.len())
}

/// Zip the verified `files/` tree into the snapshot directory
pub fn write_archive(manifest: &SnapshotManifest) -> Result<()> {
    let out_path = manifest.backup_dir.join(ARCHIVE_FILE);
    let zip_file = File::create(&out_path)
        .with_context(|| format!("Failed to create archive: {}", out_path.display()))?;
    let mut zip = zip::ZipWriter::new(zip_file);
    let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let files_dir = manifest.files_dir();
    if files_dir.exists() {
        for entry in WalkDir::new(&files_dir).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            let rel = entry
                .path()
                .strip_prefix(&manifest.backup_dir)
                .unwrap_or(entry.path());
            let name = rel.to_string_lossy().replace('\\', "/");

            if entry.file_type().is_dir() {
                zip.add_directory(name, options)?;
            } else if entry.file_type().is_file() {
                zip.start_file(name, options)?;
                let mut src = File::open(entry.path())?;
                io::copy(&mut src, &mut zip)?;
            }
        }
    }

    let mut zip_file = zip.finish()?;
    zip_file.flush()?;
    tracing::debug!("Wrote archive {}", out_path.display());
    Ok(())
}

/// Extract the archive members under `prefix` (a backup-relative path)
/// into `dst`, returning how many files were written
pub fn extract_from_archive(archive_path: &Path, prefix: &Path, dst: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        let name = match member.enclosed_name() {
            Some(n) => n,
            None => continue,
        };
        let rel = match name.strip_prefix(prefix) {
            Ok(r) => r.to_path_buf(),
            Err(_) => continue,
        };
        let out = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };

        if member.is_dir() {
            std::fs::create_dir_all(&out)?;
        } else {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut f = File::create(&out)?;
            io::copy(&mut member, &mut f)?;
            written += 1;
        }
    }

    Ok(written)
}
