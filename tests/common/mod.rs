#![allow(dead_code)]

use rusqlite::config::DbConfig;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use statewipe::apps::{clear_to_mutate, Clearance};
use statewipe::common::config::{CleaningOptions, Config};
use statewipe::profiles::{ApplicationProfile, MapEnv, PlatformPaths};
use statewipe::scanner::{self, targets::ScanResults};

pub const MB: u64 = 1024 * 1024;

/// Cursor-like profile that resolves `~/.config/Cursor` on every platform
pub fn profile() -> ApplicationProfile {
    let paths = vec!["~/.config/Cursor".to_string()];
    ApplicationProfile {
        name: "cursor".into(),
        display_name: "Cursor".into(),
        process_names: vec!["Cursor".into()],
        paths: PlatformPaths {
            windows: paths.clone(),
            darwin: paths.clone(),
            linux: paths,
        },
    }
}

/// A fake home directory holding one application's data
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("home")).unwrap();
        Self { dir }
    }

    pub fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    pub fn env(&self) -> MapEnv {
        MapEnv::new().with_home(self.home())
    }

    pub fn app_root(&self) -> PathBuf {
        self.home().join(".config/Cursor")
    }

    pub fn snapshots(&self) -> PathBuf {
        self.dir.path().join("snapshots")
    }

    /// `User/globalStorage/state.vscdb` with an `ItemTable`
    pub fn kv_store(&self, rows: &[(&str, &str)]) -> PathBuf {
        let dir = self.app_root().join("User/globalStorage");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.vscdb");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);")
            .unwrap();
        for (k, v) in rows {
            conn.execute("INSERT INTO ItemTable (key, value) VALUES (?1, ?2)", [k, v])
                .unwrap();
        }
        path
    }

    /// WAL-mode `state.vscdb` whose rows exist only in `state.vscdb-wal`,
    /// the way a killed process leaves it
    pub fn wal_kv_store(&self, rows: &[(&str, &str)]) -> PathBuf {
        let path = self.kv_store(&[]);
        Connection::open(&path)
            .unwrap()
            .execute_batch("PRAGMA journal_mode=WAL;")
            .unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_NO_CKPT_ON_CLOSE, true)
            .unwrap();
        conn.execute_batch("PRAGMA wal_autocheckpoint=0;").unwrap();
        for (k, v) in rows {
            conn.execute("INSERT INTO ItemTable (key, value) VALUES (?1, ?2)", [k, v])
                .unwrap();
        }
        drop(conn);

        assert!(std::fs::metadata(sidecar(&path, "-wal")).unwrap().len() > 0);
        path
    }

    /// `User/globalStorage/storage.json`
    pub fn document(&self, json: &str) -> PathBuf {
        let dir = self.app_root().join("User/globalStorage");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("storage.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    /// `Cache/` filled with files of the given sizes
    pub fn cache(&self, sizes: &[u64]) -> PathBuf {
        let dir = self.app_root().join("Cache");
        std::fs::create_dir_all(&dir).unwrap();
        for (i, size) in sizes.iter().enumerate() {
            std::fs::write(dir.join(format!("data_{}", i)), vec![0u8; *size as usize]).unwrap();
        }
        dir
    }

    pub fn scan(&self) -> ScanResults {
        let roots = vec![std::fs::canonicalize(self.app_root()).unwrap()];
        scanner::run_scan(&roots, &CleaningOptions::default(), false)
    }
}

pub fn config() -> Config {
    Config::default()
}

pub fn clearance() -> Clearance {
    clear_to_mutate(&profile(), &|_: &str| Some(false)).unwrap()
}

pub fn rows(path: &Path) -> Vec<(String, String)> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn.prepare("SELECT key, value FROM ItemTable ORDER BY key").unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

/// `state.vscdb` + `-wal` -> `state.vscdb-wal`
pub fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn value_of(path: &Path, key: &str) -> Option<String> {
    rows(path).into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Every file under `dir` with its contents, relative and sorted
pub fn tree(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut out: Vec<_> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            (
                e.path().strip_prefix(dir).unwrap().to_path_buf(),
                std::fs::read(e.path()).unwrap(),
            )
        })
        .collect();
    out.sort();
    out
}
