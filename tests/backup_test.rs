mod common;

use std::path::Path;

use statewipe::cleaner::{
    BackupManager, EntryStatus, MutationEngine, Outcome, RestoreExecutor, SnapshotCopier, SnapshotManifest,
};
use statewipe::common::config::{BackupOptions, CleaningOptions};
use statewipe::common::errors::CleanError;
use statewipe::common::progress::Progress;

/// Copies faithfully, then flips a byte in the copy
struct CorruptingCopier;

impl SnapshotCopier for CorruptingCopier {
    fn copy(&self, src: &Path, dst: &Path) -> anyhow::Result<()> {
        statewipe::cleaner::backup::copy_path(src, dst)?;
        let mut bytes = std::fs::read(dst)?;
        bytes[0] ^= 0xff;
        std::fs::write(dst, bytes)?;
        Ok(())
    }
}

fn populate(fx: &common::Fixture) {
    fx.kv_store(&[
        ("telemetry.machineId", "abc"),
        ("authToken", "t"),
        ("account.login", "me"),
        ("theme", "dark"),
    ]);
    fx.document(r#"{"telemetry.machineId": "abc", "nested": {"sessionId": "s"}}"#);
    fx.cache(&[2048, 4096]);
}

#[test]
fn test_restore_round_trip_is_byte_identical() {
    let fx = common::Fixture::new();
    populate(&fx);
    let before = common::tree(&fx.app_root());

    let stores = fx.scan().stores;
    let manager = BackupManager::with_root(BackupOptions::default(), fx.snapshots());
    let manifest = manager.snapshot("cursor", "clean", &stores, &Progress::hidden()).unwrap();
    assert!(manifest.entries.iter().all(|e| e.verified));

    let options = CleaningOptions::default();
    let clearance = common::clearance();
    let reports = MutationEngine::new(&options, &manifest, &clearance).apply_all(&stores);
    assert!(reports.iter().all(|r| r.outcome.is_done()));
    assert_ne!(common::tree(&fx.app_root()), before);

    let report = RestoreExecutor::new(&manifest, &clearance)
        .restore(&Progress::hidden())
        .unwrap();
    assert_eq!(report.restored_count(), stores.len());
    assert!(report.failures().is_empty());
    assert_eq!(common::tree(&fx.app_root()), before);
}

#[test]
fn test_restore_from_archive_when_copies_are_gone() {
    let fx = common::Fixture::new();
    populate(&fx);
    let before = common::tree(&fx.app_root());

    let stores = fx.scan().stores;
    let options = BackupOptions {
        compression: true,
        ..BackupOptions::default()
    };
    let manifest = BackupManager::with_root(options, fx.snapshots())
        .snapshot("cursor", "clean", &stores, &Progress::hidden())
        .unwrap();
    assert!(manifest.archive.is_some());

    let clearance = common::clearance();
    let cleaning = CleaningOptions::default();
    MutationEngine::new(&cleaning, &manifest, &clearance).apply_all(&stores);

    std::fs::remove_dir_all(manifest.files_dir()).unwrap();

    let report = RestoreExecutor::new(&manifest, &clearance)
        .restore(&Progress::hidden())
        .unwrap();
    assert!(report.failures().is_empty(), "{:?}", report.failures());
    assert_eq!(common::tree(&fx.app_root()), before);
    assert!(!manifest.backup_dir.join(".extract").exists());
}

#[test]
fn test_corrupted_copy_aborts_and_blocks_mutation() {
    let fx = common::Fixture::new();
    let doc = fx.document(r#"{"telemetry.machineId": "abc"}"#);
    let original = std::fs::read(&doc).unwrap();

    let stores = fx.scan().stores;
    let manager =
        BackupManager::with_root(BackupOptions::default(), fx.snapshots()).with_copier(CorruptingCopier);
    let err = manager
        .snapshot("cursor", "clean", &stores, &Progress::hidden())
        .unwrap_err();
    assert!(matches!(err, CleanError::BackupVerificationFailed { .. }));

    // The incomplete manifest stays on disk as evidence
    let listed = SnapshotManifest::list(&fx.snapshots()).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].complete);
    let manifest = SnapshotManifest::load(&listed[0].backup_dir).unwrap();
    assert_eq!(manifest.entries.len(), 1);
    assert!(!manifest.entries[0].verified);

    let options = CleaningOptions::default();
    let clearance = common::clearance();
    let report = MutationEngine::new(&options, &manifest, &clearance).apply(&stores[0]);
    assert!(matches!(report.outcome, Outcome::Skipped { .. }));
    assert_eq!(std::fs::read(&doc).unwrap(), original);
}

#[test]
fn test_incomplete_snapshot_restore_requires_opt_in() {
    let fx = common::Fixture::new();
    fx.document(r#"{"telemetry.machineId": "abc"}"#);
    let stores = fx.scan().stores;

    let _ = BackupManager::with_root(BackupOptions::default(), fx.snapshots())
        .with_copier(CorruptingCopier)
        .snapshot("cursor", "clean", &stores, &Progress::hidden());
    let summary = &SnapshotManifest::list(&fx.snapshots()).unwrap()[0];
    let manifest = SnapshotManifest::load(&summary.backup_dir).unwrap();
    let clearance = common::clearance();

    let err = RestoreExecutor::new(&manifest, &clearance)
        .restore(&Progress::hidden())
        .unwrap_err();
    assert!(matches!(err, CleanError::SnapshotIncomplete { .. }));

    let report = RestoreExecutor::new(&manifest, &clearance)
        .allow_incomplete(true)
        .restore(&Progress::hidden())
        .unwrap();
    assert_eq!(report.restored_count(), 0);
    assert!(matches!(report.entries[0].status, EntryStatus::Skipped { .. }));
}

#[test]
fn test_restore_scripts_cover_verified_entries() {
    let fx = common::Fixture::new();
    let doc = fx.document(r#"{"a": 1}"#);
    let stores = fx.scan().stores;

    let manifest = BackupManager::with_root(BackupOptions::default(), fx.snapshots())
        .snapshot("cursor", "clean", &stores, &Progress::hidden())
        .unwrap();
    let sh = std::fs::read_to_string(manifest.backup_dir.join("restore.sh")).unwrap();
    let ps1 = std::fs::read_to_string(manifest.backup_dir.join("restore.ps1")).unwrap();

    let name = doc.file_name().unwrap().to_string_lossy().to_string();
    assert!(sh.contains(&name));
    assert!(ps1.contains(&name));
}

#[test]
fn test_manifest_sealed_after_completion() {
    let fx = common::Fixture::new();
    fx.document(r#"{"a": 1}"#);
    let stores = fx.scan().stores;

    let mut manifest = BackupManager::with_root(BackupOptions::default(), fx.snapshots())
        .snapshot("cursor", "clean", &stores, &Progress::hidden())
        .unwrap();
    let extra = manifest.entries[0].clone();
    assert!(matches!(manifest.append(extra), Err(CleanError::ManifestSealed { .. })));
}

// ─── SQLite journals ─────────────────────────────────────────────────────────

fn owned(rows: &[(&str, &str)]) -> Vec<(String, String)> {
    rows.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn test_rows_only_in_wal_survive_clean_and_restore() {
    let fx = common::Fixture::new();
    let db = fx.wal_kv_store(&[("machineId", "abc-123"), ("userSetting", "in-wal-only")]);
    let wal = common::sidecar(&db, "-wal");
    let wal_before = std::fs::read(&wal).unwrap();

    let stores = fx.scan().stores;
    let manifest = BackupManager::with_root(BackupOptions::default(), fx.snapshots())
        .snapshot("cursor", "clean", &stores, &Progress::hidden())
        .unwrap();
    let entry = manifest.entry_for(&db).unwrap();
    assert!(entry.sidecar("-wal").is_some());
    assert!(entry.sidecar("-shm").is_none());

    let options = CleaningOptions::default();
    let clearance = common::clearance();
    let reports = MutationEngine::new(&options, &manifest, &clearance).apply_all(&stores);
    assert!(reports[0].outcome.record().unwrap().changed());
    assert_ne!(common::value_of(&db, "machineId").unwrap(), "abc-123");

    let report = RestoreExecutor::new(&manifest, &clearance)
        .restore(&Progress::hidden())
        .unwrap();
    assert_eq!(report.restored_count(), 1);
    assert!(report.failures().is_empty(), "{:?}", report.failures());
    assert_eq!(std::fs::read(&wal).unwrap(), wal_before);
    assert_eq!(
        common::rows(&db),
        owned(&[("machineId", "abc-123"), ("userSetting", "in-wal-only")])
    );
}

#[test]
fn test_restore_moves_uncaptured_journal_aside() {
    let fx = common::Fixture::new();
    let db = fx.kv_store(&[("machineId", "abc-123")]);
    let original = std::fs::read(&db).unwrap();

    let stores = fx.scan().stores;
    let manifest = BackupManager::with_root(BackupOptions::default(), fx.snapshots())
        .snapshot("cursor", "clean", &stores, &Progress::hidden())
        .unwrap();
    assert!(manifest.entries[0].sidecars.is_empty());

    let clearance = common::clearance();
    let options = CleaningOptions::default();
    MutationEngine::new(&options, &manifest, &clearance).apply_all(&stores);

    // Left behind by a later session of the application
    let stray = common::sidecar(&db, "-wal");
    std::fs::write(&stray, b"later journal").unwrap();

    let report = RestoreExecutor::new(&manifest, &clearance)
        .restore(&Progress::hidden())
        .unwrap();
    assert!(report.failures().is_empty(), "{:?}", report.failures());
    assert_eq!(std::fs::read(&db).unwrap(), original);
    assert!(!stray.exists());

    let moved = manifest.backup_dir.join("displaced/0-state.vscdb-wal");
    assert_eq!(std::fs::read(moved).unwrap(), b"later journal");
    assert_eq!(common::value_of(&db, "machineId").unwrap(), "abc-123");
}

#[test]
fn test_wal_restored_from_archive() {
    let fx = common::Fixture::new();
    let db = fx.wal_kv_store(&[("machineId", "abc-123"), ("userSetting", "in-wal-only")]);

    let stores = fx.scan().stores;
    let options = BackupOptions {
        compression: true,
        ..BackupOptions::default()
    };
    let manifest = BackupManager::with_root(options, fx.snapshots())
        .snapshot("cursor", "clean", &stores, &Progress::hidden())
        .unwrap();

    let clearance = common::clearance();
    let cleaning = CleaningOptions::default();
    MutationEngine::new(&cleaning, &manifest, &clearance).apply_all(&stores);
    std::fs::remove_dir_all(manifest.files_dir()).unwrap();

    let report = RestoreExecutor::new(&manifest, &clearance)
        .restore(&Progress::hidden())
        .unwrap();
    assert!(report.failures().is_empty(), "{:?}", report.failures());
    assert_eq!(
        common::rows(&db),
        owned(&[("machineId", "abc-123"), ("userSetting", "in-wal-only")])
    );
}
