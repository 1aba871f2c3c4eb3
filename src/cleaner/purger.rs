use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use super::manifest::{SnapshotManifest, SnapshotSummary};

/// Purge complete snapshots older than the retention window.
///
/// Incomplete snapshots are crash evidence and are never removed here;
/// see [`discard_incomplete`].
pub fn purge_expired(backup_root: &Path, retention_days: u32) -> Result<PurgeReport> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
    let mut report = PurgeReport::default();

    for snapshot in SnapshotManifest::list(backup_root)? {
        if !snapshot.complete || snapshot.created_at >= cutoff {
            continue;
        }
        remove_into(&snapshot, &mut report);
    }

    Ok(report)
}

/// Purge a specific snapshot by ID
pub fn purge_snapshot(backup_root: &Path, snapshot_id: &str) -> Result<u64> {
    let manifest = SnapshotManifest::load_by_id(backup_root, snapshot_id)?;
    let size = crate::scanner::walker::dir_size(&manifest.backup_dir);

    std::fs::remove_dir_all(&manifest.backup_dir)
        .with_context(|| format!("Failed to purge snapshot: {}", snapshot_id))?;
    tracing::info!("Purged snapshot {} ({} bytes)", snapshot_id, size);

    Ok(size)
}

/// Remove one incomplete snapshot. Complete snapshots are refused.
pub fn discard_incomplete(backup_root: &Path, snapshot_id: &str) -> Result<u64> {
    let manifest = SnapshotManifest::load_by_id(backup_root, snapshot_id)?;
    if manifest.complete {
        anyhow::bail!(
            "Snapshot '{}' is complete; use 'purge --snapshot {}' to remove it",
            snapshot_id,
            snapshot_id
        );
    }
    purge_snapshot(backup_root, snapshot_id)
}

fn remove_into(snapshot: &SnapshotSummary, report: &mut PurgeReport) {
    let size = crate::scanner::walker::dir_size(&snapshot.backup_dir);

    match std::fs::remove_dir_all(&snapshot.backup_dir) {
        Ok(()) => {
            tracing::info!("Purged expired snapshot {}", snapshot.snapshot_id);
            report.purged.push(PurgedSnapshot {
                snapshot_id: snapshot.snapshot_id.clone(),
                bytes_freed: size,
                entry_count: snapshot.entry_count,
            });
            report.total_bytes_freed += size;
        }
        Err(e) => {
            report.errors.push(format!(
                "Failed to purge snapshot '{}': {}",
                snapshot.snapshot_id, e
            ));
        }
    }
}

/// Report from a purge operation
#[derive(Debug, Default, Serialize)]
pub struct PurgeReport {
    pub purged: Vec<PurgedSnapshot>,
    pub total_bytes_freed: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PurgedSnapshot {
    pub snapshot_id: String,
    pub bytes_freed: u64,
    pub entry_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(root: &Path, id: &str, age_days: i64, complete: bool) {
        let mut m = SnapshotManifest::new("cursor", "clean", &root.join(id));
        m.created_at = chrono::Utc::now() - chrono::Duration::days(age_days);
        if complete {
            m.mark_complete().unwrap();
        } else {
            m.save().unwrap();
        }
    }

    #[test]
    fn test_purge_expired_keeps_recent_and_incomplete() {
        let dir = TempDir::new().unwrap();
        snapshot(dir.path(), "old", 40, true);
        snapshot(dir.path(), "new", 1, true);
        snapshot(dir.path(), "crashed", 40, false);

        let report = purge_expired(dir.path(), 30).unwrap();
        assert_eq!(report.purged.len(), 1);
        assert_eq!(report.purged[0].snapshot_id, "old");
        assert!(!dir.path().join("old").exists());
        assert!(dir.path().join("new").exists());
        assert!(dir.path().join("crashed").exists());
    }

    #[test]
    fn test_discard_only_incomplete() {
        let dir = TempDir::new().unwrap();
        snapshot(dir.path(), "done", 0, true);
        snapshot(dir.path(), "crashed", 0, false);

        assert!(discard_incomplete(dir.path(), "done").is_err());
        assert!(discard_incomplete(dir.path(), "crashed").is_ok());
        assert!(!dir.path().join("crashed").exists());
        assert!(purge_snapshot(dir.path(), "missing").is_err());
    }
}
