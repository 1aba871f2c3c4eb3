mod common;

use statewipe::scanner::targets::StoreKind;

#[test]
fn test_classifies_every_store_kind() {
    let fx = common::Fixture::new();
    fx.kv_store(&[("theme", "dark"), ("authToken", "t")]);
    fx.document(r#"{"telemetry.machineId": "abc", "theme": "dark"}"#);
    fx.cache(&[100, 200]);

    let results = fx.scan();
    assert!(results.errors.is_empty(), "{:?}", results.errors);

    let kv = results.filter_by_kind(StoreKind::KvStore);
    assert_eq!(kv.len(), 1);
    assert_eq!(kv[0].entry_count, Some(2));

    let docs = results.filter_by_kind(StoreKind::Document);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].entry_count, Some(2));

    let caches = results.filter_by_kind(StoreKind::CacheDir);
    assert_eq!(caches.len(), 1);
    assert_eq!(caches[0].size_bytes, 300);
    assert_eq!(caches[0].entry_count, Some(2));
}

#[test]
fn test_corrupt_stores_become_unknown() {
    let fx = common::Fixture::new();
    let dir = fx.app_root().join("User");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("broken.vscdb"), b"definitely not sqlite").unwrap();
    std::fs::write(dir.join("broken.json"), b"{ nope").unwrap();
    std::fs::write(dir.join("list.json"), b"[1, 2, 3]").unwrap();

    let results = fx.scan();
    let unknown = results.filter_by_kind(StoreKind::Unknown);
    assert_eq!(unknown.len(), 3);
    assert!(unknown.iter().all(|s| s.note.is_some()));
    assert_eq!(results.errors.len(), 3);
    assert!(results.mutable_stores().is_empty());
}

#[test]
fn test_cache_contents_not_listed() {
    let fx = common::Fixture::new();
    let cache = fx.cache(&[10]);
    std::fs::write(cache.join("inner.json"), b"{}").unwrap();

    let results = fx.scan();
    assert_eq!(results.stores.len(), 1);
    assert_eq!(results.stores[0].kind, StoreKind::CacheDir);
}

#[test]
fn test_unrelated_files_ignored() {
    let fx = common::Fixture::new();
    let dir = fx.app_root().join("User");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("notes.txt"), b"hello").unwrap();
    std::fs::write(dir.join("settings.json.bak"), b"{}").unwrap();

    assert!(fx.scan().stores.is_empty());
}

#[test]
fn test_scan_is_read_only() {
    let fx = common::Fixture::new();
    fx.kv_store(&[("telemetry.machineId", "abc")]);
    fx.document(r#"{"telemetry.machineId": "abc"}"#);
    let before = common::tree(&fx.app_root());

    fx.scan();
    fx.scan();
    assert_eq!(common::tree(&fx.app_root()), before);
}

#[test]
fn test_root_under_backup_directory_is_scanned() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("mnt/backup/cfg/Cursor");
    std::fs::create_dir_all(root.join("User")).unwrap();
    std::fs::write(root.join("User/storage.json"), r#"{"telemetry.machineId": "abc"}"#).unwrap();
    std::fs::write(root.join("User/storage.json.bak"), r#"{"old": true}"#).unwrap();

    let results = statewipe::scanner::run_scan(
        &[root.clone()],
        &statewipe::common::config::CleaningOptions::default(),
        false,
    );
    assert_eq!(results.stores.len(), 1);
    assert_eq!(results.stores[0].path, root.join("User/storage.json"));
    assert_eq!(results.stores[0].kind, StoreKind::Document);
}
