use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ─── Core types ───────────────────────────────────────────────────────────────

/// Classification of a discovered store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// SQLite file with key/value tables
    KvStore,
    /// JSON document holding a key/value mapping
    Document,
    /// Opaque cache directory, removable as a whole
    CacheDir,
    /// Unreadable or corrupt; never mutated
    Unknown,
}

impl StoreKind {
    /// Whether the mutation engine may touch stores of this kind
    pub fn is_mutable(&self) -> bool {
        !matches!(self, StoreKind::Unknown)
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::KvStore => write!(f, "kv_store"),
            StoreKind::Document => write!(f, "document"),
            StoreKind::CacheDir => write!(f, "cache_dir"),
            StoreKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A store found under one of an application's data directories
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredStore {
    /// Absolute path of the file or directory
    pub path: PathBuf,

    /// Resolved root this store was found under
    pub root: PathBuf,

    pub kind: StoreKind,

    /// Size in bytes (aggregated for directories)
    pub size_bytes: u64,

    /// Row count, top-level key count, or file count
    pub entry_count: Option<u64>,

    /// Why the store was classified `unknown`
    pub note: Option<String>,
}

impl DiscoveredStore {
    /// Path relative to its root (empty when the store is the root itself)
    pub fn relative_path(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }
}

/// Complete scan results for one application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResults {
    /// When the scan was performed
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// How long the scan took in seconds
    pub duration_secs: f64,

    /// Roots that were walked
    pub roots: Vec<PathBuf>,

    /// Every classified store, in walk order
    pub stores: Vec<DiscoveredStore>,

    /// Total size of all stores in bytes
    pub total_bytes: u64,

    /// Errors encountered during scan (never fatal)
    pub errors: Vec<String>,
}

impl Default for ScanResults {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanResults {
    pub fn new() -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            duration_secs: 0.0,
            roots: Vec::new(),
            stores: Vec::new(),
            total_bytes: 0,
            errors: Vec::new(),
        }
    }

    /// Recalculate totals from stores
    pub fn recalculate(&mut self) {
        self.total_bytes = self.stores.iter().map(|s| s.size_bytes).sum();
    }

    /// Stores the engine is allowed to mutate
    pub fn mutable_stores(&self) -> Vec<&DiscoveredStore> {
        self.stores.iter().filter(|s| s.kind.is_mutable()).collect()
    }

    /// Filter stores by kind
    pub fn filter_by_kind(&self, kind: StoreKind) -> Vec<&DiscoveredStore> {
        self.stores.iter().filter(|s| s.kind == kind).collect()
    }

    /// Total bytes of stores of one kind
    pub fn bytes_of(&self, kind: StoreKind) -> u64 {
        self.stores
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.size_bytes)
            .sum()
    }
}
