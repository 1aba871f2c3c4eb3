use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::backup::{self, copy_dir_recursive};
use super::document::temp_sibling;
use super::hasher;
use super::manifest::{sidecar_path, SnapshotEntry, SnapshotManifest, ALL_SIDECARS, DISPLACED_DIR};
use crate::apps::Clearance;
use crate::common::errors::CleanError;
use crate::common::format;
use crate::common::progress::Progress;
use crate::common::safety;
use crate::scanner::targets::StoreKind;

const EXTRACT_DIR: &str = ".extract";

/// Result for one manifest entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Restored,
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoredEntry {
    pub original_path: PathBuf,
    pub size_bytes: u64,
    pub status: EntryStatus,
}

/// Report from a restore operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    pub snapshot_id: String,
    pub application: String,
    pub entries: Vec<RestoredEntry>,
}

impl RestoreReport {
    pub fn restored_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Restored)
            .count()
    }

    pub fn restored_bytes(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Restored)
            .map(|e| e.size_bytes)
            .sum()
    }

    pub fn failures(&self) -> Vec<&RestoredEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Failed { .. }))
            .collect()
    }
}

/// Replays a snapshot over the application's current state
pub struct RestoreExecutor<'a> {
    manifest: &'a SnapshotManifest,
    clearance: &'a Clearance,
    allow_incomplete: bool,
}

impl<'a> RestoreExecutor<'a> {
    pub fn new(manifest: &'a SnapshotManifest, clearance: &'a Clearance) -> Self {
        Self {
            manifest,
            clearance,
            allow_incomplete: false,
        }
    }

    /// Permit restoring the verified entries of an incomplete snapshot
    pub fn allow_incomplete(mut self, allow: bool) -> Self {
        self.allow_incomplete = allow;
        self
    }

    /// Restore every entry, reporting each one. Only precondition
    /// failures are returned as errors; per-entry failures never stop
    /// the remaining entries.
    pub fn restore(&self, progress: &Progress) -> Result<RestoreReport, CleanError> {
        let m = self.manifest;

        if self.clearance.application() != m.application {
            return Err(CleanError::LivenessUnknown {
                app: m.application.clone(),
            });
        }
        if !m.complete && !self.allow_incomplete {
            return Err(CleanError::SnapshotIncomplete {
                snapshot_id: m.snapshot_id.clone(),
            });
        }

        tracing::info!("Restoring snapshot {} ({} entries)", m.snapshot_id, m.entries.len());

        let mut entries = Vec::with_capacity(m.entries.len());
        for (idx, entry) in m.entries.iter().enumerate() {
            let status = if entry.verified {
                match self.restore_entry(idx, entry) {
                    Ok(()) => EntryStatus::Restored,
                    Err(e) => EntryStatus::Failed {
                        reason: format!("{:#}", e),
                    },
                }
            } else {
                EntryStatus::Skipped {
                    reason: "backup copy was never verified".into(),
                }
            };

            match &status {
                EntryStatus::Restored => tracing::info!("Restored {}", entry.original_path.display()),
                EntryStatus::Skipped { reason } => {
                    tracing::warn!("Skipped {}: {}", entry.original_path.display(), reason)
                }
                EntryStatus::Failed { reason } => {
                    tracing::error!("Failed to restore {}: {}", entry.original_path.display(), reason)
                }
            }

            progress.advance(
                entry.size_bytes,
                &format::truncate(&format::format_path(&entry.original_path), 40),
            );
            entries.push(RestoredEntry {
                original_path: entry.original_path.clone(),
                size_bytes: entry.size_bytes,
                status,
            });
        }

        let _ = std::fs::remove_dir_all(m.backup_dir.join(EXTRACT_DIR));

        Ok(RestoreReport {
            snapshot_id: m.snapshot_id.clone(),
            application: m.application.clone(),
            entries,
        })
    }

    fn restore_entry(&self, idx: usize, entry: &SnapshotEntry) -> Result<()> {
        safety::ensure_not_protected(&entry.original_path)?;
        let source = self.source_for(&idx.to_string(), &entry.backup_path, entry.is_dir)?;
        let dest = &entry.original_path;

        if entry.is_dir {
            if dest.exists() {
                std::fs::remove_dir_all(dest)
                    .with_context(|| format!("Failed to clear {}", dest.display()))?;
            }
            copy_dir_recursive(&source, dest)?;
        } else {
            replace_file(&source, dest)?;
            if entry.kind == StoreKind::KvStore {
                self.restore_sidecars(idx, entry)?;
            }
        }

        let actual = hasher::hash_path(dest)?;
        if actual != entry.checksum {
            anyhow::bail!("checksum mismatch after restore (expected {}, got {})", entry.checksum, actual);
        }
        for copy in &entry.sidecars {
            let path = sidecar_path(dest, &copy.suffix);
            let actual = hasher::hash_path(&path)?;
            if actual != copy.checksum {
                anyhow::bail!(
                    "checksum mismatch after restoring {} (expected {}, got {})",
                    path.display(),
                    copy.checksum,
                    actual
                );
            }
        }
        Ok(())
    }

    /// Put back the journal files the snapshot captured and move any
    /// others out of the way, so SQLite never replays a journal that
    /// belongs to different content
    fn restore_sidecars(&self, idx: usize, entry: &SnapshotEntry) -> Result<()> {
        for suffix in ALL_SIDECARS {
            let dest = sidecar_path(&entry.original_path, suffix);
            match entry.sidecar(suffix) {
                Some(copy) => {
                    let source = self.source_for(&format!("{}{}", idx, suffix), &copy.backup_path, false)?;
                    replace_file(&source, &dest)?;
                }
                None if dest.exists() => self.displace(idx, &dest)?,
                None => {}
            }
        }
        Ok(())
    }

    /// Move a file into `<snapshot>/displaced/` instead of deleting it
    fn displace(&self, idx: usize, path: &Path) -> Result<()> {
        let dir = self.manifest.backup_dir.join(DISPLACED_DIR);
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create dir: {}", dir.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = dir.join(format!("{}-{}", idx, name));

        if std::fs::rename(path, &target).is_err() {
            std::fs::copy(path, &target)
                .with_context(|| format!("Failed to move {} aside", path.display()))?;
            std::fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        tracing::warn!("Moved {} to {}", path.display(), target.display());
        Ok(())
    }

    /// The directory copy, or the same content extracted from the archive
    /// into `.extract/<key>`
    fn source_for(&self, key: &str, backup_path: &Path, is_dir: bool) -> Result<PathBuf> {
        let direct = self.manifest.backup_dir.join(backup_path);
        if direct.exists() {
            return Ok(direct);
        }

        let archive = match self.manifest.archive_path() {
            Some(a) if a.exists() => a,
            _ => anyhow::bail!("Backup copy is missing: {}", direct.display()),
        };

        let staging = self.manifest.backup_dir.join(EXTRACT_DIR).join(key);
        let out = if is_dir {
            std::fs::create_dir_all(&staging)?;
            staging
        } else {
            staging.join(backup_path.file_name().unwrap_or_default())
        };

        let written = backup::extract_from_archive(&archive, backup_path, &out)?;
        if !is_dir && written == 0 {
            anyhow::bail!("{} is not in {}", backup_path.display(), archive.display());
        }
        tracing::debug!("Extracted {} from {}", backup_path.display(), archive.display());
        Ok(out)
    }
}

/// Replace `dest` with a copy of `source` via a sibling temp file
fn replace_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create dir: {}", parent.display()))?;
    }
    let tmp = temp_sibling(dest);
    std::fs::copy(source, &tmp).with_context(|| format!("Failed to copy backup to {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, dest) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to replace {} (is it locked?)", dest.display()));
    }
    Ok(())
}
