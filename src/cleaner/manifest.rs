use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::common::errors::CleanError;
use crate::scanner::targets::StoreKind;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FILES_DIR: &str = "files";
/// Where restore moves journal files that the snapshot did not capture
pub const DISPLACED_DIR: &str = "displaced";

/// SQLite journal files that can hold committed data outside the main file
pub const CAPTURED_SIDECARS: [&str; 2] = ["-wal", "-journal"];
/// Every journal file a restore has to account for (`-shm` is a derived index)
pub const ALL_SIDECARS: [&str; 3] = ["-wal", "-shm", "-journal"];

/// `state.vscdb` + `-wal` -> `state.vscdb-wal`
pub fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Record of one snapshot: what was copied, where, and whether it verified.
///
/// Written to disk with `complete = false` before the first copy and
/// re-saved after every entry. Once `complete` is set the manifest is
/// sealed and every further change is refused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotManifest {
    /// Directory name under the backup root
    pub snapshot_id: String,

    pub application: String,

    /// Operation kind the snapshot was taken for (e.g. "clean")
    pub operation: String,

    pub created_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Absolute snapshot directory
    pub backup_dir: PathBuf,

    /// Copied paths, in copy order
    pub entries: Vec<SnapshotEntry>,

    /// Sum of entry sizes
    pub total_bytes: u64,

    /// Archive file name inside `backup_dir`, when compression is enabled
    pub archive: Option<String>,

    pub complete: bool,
}

/// One copied path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotEntry {
    /// Where the data lives in the application's tree
    pub original_path: PathBuf,

    /// Location of the copy, relative to the snapshot directory
    pub backup_path: PathBuf,

    /// SHA-256 of the verified copy (tree hash for directories)
    pub checksum: String,

    pub kind: StoreKind,

    pub size_bytes: u64,

    pub is_dir: bool,

    /// Source and copy checksums were equal
    pub verified: bool,

    /// Journal files copied with a key-value store
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidecars: Vec<SidecarCopy>,
}

/// A `-wal` or `-journal` file that existed next to a key-value store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SidecarCopy {
    pub suffix: String,
    pub backup_path: PathBuf,
    pub checksum: String,
    pub size_bytes: u64,
}

impl SnapshotEntry {
    pub fn sidecar(&self, suffix: &str) -> Option<&SidecarCopy> {
        self.sidecars.iter().find(|s| s.suffix == suffix)
    }
}

impl SnapshotManifest {
    pub fn new(application: &str, operation: &str, backup_dir: &Path) -> Self {
        let snapshot_id = backup_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            snapshot_id,
            application: application.to_string(),
            operation: operation.to_string(),
            created_at: Utc::now(),
            completed_at: None,
            backup_dir: backup_dir.to_path_buf(),
            entries: Vec::new(),
            total_bytes: 0,
            archive: None,
            complete: false,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.backup_dir.join(MANIFEST_FILE)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.backup_dir.join(FILES_DIR)
    }

    /// Absolute location of the archive, if one was written
    pub fn archive_path(&self) -> Option<PathBuf> {
        self.archive.as_ref().map(|a| self.backup_dir.join(a))
    }

    fn ensure_open(&self) -> Result<(), CleanError> {
        if self.complete {
            return Err(CleanError::ManifestSealed {
                snapshot_id: self.snapshot_id.clone(),
            });
        }
        Ok(())
    }

    /// Append an entry and persist the manifest before returning
    pub fn append(&mut self, entry: SnapshotEntry) -> Result<(), CleanError> {
        self.ensure_open()?;
        self.total_bytes += entry.size_bytes;
        self.entries.push(entry);
        self.save()
    }

    /// Record the archive file name
    pub fn set_archive(&mut self, name: &str) -> Result<(), CleanError> {
        self.ensure_open()?;
        self.archive = Some(name.to_string());
        self.save()
    }

    /// Seal the manifest. Refused while any entry is unverified.
    pub fn mark_complete(&mut self) -> Result<(), CleanError> {
        self.ensure_open()?;
        if let Some(bad) = self.entries.iter().find(|e| !e.verified) {
            return Err(CleanError::BackupVerificationFailed {
                path: bad.original_path.clone(),
                message: "entry was never verified".into(),
            });
        }
        self.complete = true;
        self.completed_at = Some(Utc::now());
        self.save()
    }

    /// Write manifest.json atomically (temp file + rename)
    pub fn save(&self) -> Result<(), CleanError> {
        std::fs::create_dir_all(&self.backup_dir).map_err(|e| CleanError::io(&self.backup_dir, e))?;

        let path = self.manifest_path();
        let json = serde_json::to_string_pretty(self).map_err(|e| CleanError::Json {
            path: path.clone(),
            source: e,
        })?;

        let tmp = self.backup_dir.join(format!("{}.tmp", MANIFEST_FILE));
        std::fs::write(&tmp, json).map_err(|e| CleanError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| CleanError::io(&path, e))?;
        Ok(())
    }

    /// Load a manifest from a snapshot directory
    pub fn load(snapshot_dir: &Path) -> Result<Self, CleanError> {
        let path = snapshot_dir.join(MANIFEST_FILE);
        let contents = std::fs::read_to_string(&path).map_err(|e| CleanError::io(&path, e))?;
        let mut manifest: SnapshotManifest =
            serde_json::from_str(&contents).map_err(|e| CleanError::Json {
                path: path.clone(),
                source: e,
            })?;
        // The directory may have been moved since it was written
        manifest.backup_dir = snapshot_dir.to_path_buf();
        Ok(manifest)
    }

    /// Load a snapshot by id from the backup root
    pub fn load_by_id(backup_root: &Path, snapshot_id: &str) -> Result<Self> {
        let dir = backup_root.join(snapshot_id);
        if !dir.join(MANIFEST_FILE).exists() {
            anyhow::bail!("Snapshot '{}' not found in {}", snapshot_id, backup_root.display());
        }
        Self::load(&dir).with_context(|| format!("Failed to load snapshot '{}'", snapshot_id))
    }

    /// The entry covering exactly `path`
    pub fn entry_for(&self, path: &Path) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.original_path == path)
    }

    /// Whether `path` may be mutated under this manifest
    pub fn is_verified_for(&self, path: &Path) -> bool {
        self.complete && self.entry_for(path).is_some_and(|e| e.verified)
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            snapshot_id: self.snapshot_id.clone(),
            application: self.application.clone(),
            operation: self.operation.clone(),
            created_at: self.created_at,
            complete: self.complete,
            entry_count: self.entries.len(),
            total_bytes: self.total_bytes,
            on_disk_bytes: crate::scanner::walker::dir_size(&self.backup_dir),
            has_archive: self.archive.is_some(),
            backup_dir: self.backup_dir.clone(),
        }
    }

    /// List all snapshots under `backup_root`, most recent first.
    /// Directories without a readable manifest are skipped.
    pub fn list(backup_root: &Path) -> Result<Vec<SnapshotSummary>> {
        if !backup_root.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();

        for entry in std::fs::read_dir(backup_root)
            .with_context(|| format!("Failed to read backup dir: {}", backup_root.display()))?
        {
            let path = entry?.path();
            if !path.is_dir() || !path.join(MANIFEST_FILE).exists() {
                continue;
            }

            match Self::load(&path) {
                Ok(manifest) => snapshots.push(manifest.summary()),
                Err(e) => tracing::warn!("Skipping unreadable snapshot {}: {}", path.display(), e),
            }
        }

        snapshots.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.snapshot_id.cmp(&a.snapshot_id))
        });
        Ok(snapshots)
    }

    /// Most recent complete snapshot for an application
    pub fn most_recent(backup_root: &Path, application: &str) -> Result<Option<SnapshotSummary>> {
        Ok(Self::list(backup_root)?
            .into_iter()
            .find(|s| s.complete && s.application == application))
    }

    /// Incomplete snapshots for an application (crash markers)
    pub fn incomplete(backup_root: &Path, application: &str) -> Result<Vec<SnapshotSummary>> {
        Ok(Self::list(backup_root)?
            .into_iter()
            .filter(|s| !s.complete && s.application == application)
            .collect())
    }
}

/// Summary info about a snapshot (for listing)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub snapshot_id: String,
    pub application: String,
    pub operation: String,
    pub created_at: DateTime<Utc>,
    pub complete: bool,
    pub entry_count: usize,
    pub total_bytes: u64,
    pub on_disk_bytes: u64,
    pub has_archive: bool,
    pub backup_dir: PathBuf,
}
