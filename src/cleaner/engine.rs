use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::manifest::SnapshotManifest;
use super::{document, kv_store};
use crate::apps::Clearance;
use crate::common::config::CleaningOptions;
use crate::common::errors::CleanError;
use crate::common::safety;
use crate::scanner::targets::{DiscoveredStore, StoreKind};
use crate::scanner::walker;

/// Which generated identifier a telemetry key receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFamily {
    Machine,
    Session,
    Telemetry,
}

impl IdFamily {
    pub fn of(key: &str) -> Self {
        let k = key.to_lowercase();
        if k.contains("machineid") || k.contains("deviceid") {
            IdFamily::Machine
        } else if k.contains("sessionid") {
            IdFamily::Session
        } else {
            IdFamily::Telemetry
        }
    }
}

/// Replacement identifiers, generated once per engine.
///
/// Reusing the same values for every store makes a second pass a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSet {
    pub machine: String,
    pub session: String,
    pub telemetry: String,
}

impl IdentifierSet {
    pub fn generate() -> Self {
        Self {
            machine: uuid::Uuid::new_v4().to_string(),
            session: uuid::Uuid::new_v4().to_string(),
            telemetry: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn value_for(&self, key: &str) -> &str {
        match IdFamily::of(key) {
            IdFamily::Machine => &self.machine,
            IdFamily::Session => &self.session,
            IdFamily::Telemetry => &self.telemetry,
        }
    }
}

/// One identifier that received a new value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyReset {
    pub key: String,
    /// Table the row lives in (key-value stores only)
    pub table: Option<String>,
    pub value: String,
}

/// What a mutation did to one store. Logged and persisted, never replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub path: PathBuf,
    pub kind: StoreKind,
    pub keys_reset: Vec<KeyReset>,
    pub keys_removed: Vec<String>,
    pub records_deleted: u64,
    pub tables_cleared: Vec<String>,
    pub bytes_freed: u64,
}

impl MutationRecord {
    pub fn new(path: &Path, kind: StoreKind) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            keys_reset: Vec::new(),
            keys_removed: Vec::new(),
            records_deleted: 0,
            tables_cleared: Vec::new(),
            bytes_freed: 0,
        }
    }

    /// Whether the store's logical content changed
    pub fn changed(&self) -> bool {
        !self.keys_reset.is_empty()
            || !self.keys_removed.is_empty()
            || self.records_deleted > 0
            || !self.tables_cleared.is_empty()
    }

    /// Total number of individual edits
    pub fn change_count(&self) -> u64 {
        (self.keys_reset.len() + self.keys_removed.len()) as u64 + self.records_deleted
    }
}

/// Result of one per-store operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Done(MutationRecord),
    Skipped { reason: String },
    Failed { reason: String },
}

impl Outcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn record(&self) -> Option<&MutationRecord> {
        match self {
            Outcome::Done(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReport {
    pub path: PathBuf,
    pub kind: StoreKind,
    pub outcome: Outcome,
}

/// Applies identifier reset, record purge and cache removal.
///
/// Works only on paths covered by a complete, verified snapshot of the
/// application named by the clearance.
pub struct MutationEngine<'a> {
    options: &'a CleaningOptions,
    manifest: &'a SnapshotManifest,
    clearance: &'a Clearance,
    ids: IdentifierSet,
}

impl<'a> MutationEngine<'a> {
    pub fn new(options: &'a CleaningOptions, manifest: &'a SnapshotManifest, clearance: &'a Clearance) -> Self {
        Self::with_ids(options, manifest, clearance, IdentifierSet::generate())
    }

    pub fn with_ids(
        options: &'a CleaningOptions,
        manifest: &'a SnapshotManifest,
        clearance: &'a Clearance,
        ids: IdentifierSet,
    ) -> Self {
        Self {
            options,
            manifest,
            clearance,
            ids,
        }
    }

    pub fn ids(&self) -> &IdentifierSet {
        &self.ids
    }

    /// Checked before any store is opened for writing
    pub fn guard(&self, path: &Path) -> Result<(), CleanError> {
        if self.clearance.application() != self.manifest.application {
            return Err(CleanError::LivenessUnknown {
                app: self.manifest.application.clone(),
            });
        }
        safety::ensure_not_protected(path)?;
        if !self.manifest.is_verified_for(path) {
            return Err(CleanError::NotBackedUp {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Mutate one store
    pub fn apply(&self, store: &DiscoveredStore) -> StoreReport {
        let outcome = self.run(store);
        match &outcome {
            Outcome::Done(r) => tracing::info!(
                "{}: {} edits, {} bytes freed",
                store.path.display(),
                r.change_count(),
                r.bytes_freed
            ),
            Outcome::Skipped { reason } => tracing::warn!("Skipped {}: {}", store.path.display(), reason),
            Outcome::Failed { reason } => tracing::error!("Failed {}: {}", store.path.display(), reason),
        }

        StoreReport {
            path: store.path.clone(),
            kind: store.kind,
            outcome,
        }
    }

    /// Mutate every store, continuing past per-store failures
    pub fn apply_all(&self, stores: &[DiscoveredStore]) -> Vec<StoreReport> {
        stores.iter().map(|s| self.apply(s)).collect()
    }

    fn run(&self, store: &DiscoveredStore) -> Outcome {
        if !store.kind.is_mutable() {
            return Outcome::Skipped {
                reason: store.note.clone().unwrap_or_else(|| "unreadable store".into()),
            };
        }

        if let Err(e) = self.guard(&store.path) {
            return Outcome::Skipped { reason: e.to_string() };
        }

        let result = match store.kind {
            StoreKind::KvStore => kv_store::apply(&store.path, self.options, &self.ids),
            StoreKind::Document => document::apply(&store.path, self.options, &self.ids),
            StoreKind::CacheDir => clear_cache_dir(&store.path, self.options.recreate_cache_dirs),
            StoreKind::Unknown => {
                return Outcome::Skipped {
                    reason: "unreadable store".into(),
                }
            }
        };

        match result {
            Ok(record) => Outcome::Done(record),
            Err(e @ CleanError::StoreBusy { .. }) => Outcome::Skipped { reason: e.to_string() },
            Err(e) => Outcome::Failed { reason: e.to_string() },
        }
    }
}

/// Remove everything inside a cache directory.
///
/// With `recreate` the emptied directory is kept (or created) so the
/// application finds its mount point; otherwise it is removed as well.
pub fn clear_cache_dir(path: &Path, recreate: bool) -> Result<MutationRecord, CleanError> {
    let mut record = MutationRecord::new(path, StoreKind::CacheDir);

    if path.is_dir() {
        for entry in std::fs::read_dir(path).map_err(|e| CleanError::io(path, e))? {
            let entry = entry.map_err(|e| CleanError::io(path, e))?;
            let child = entry.path();
            let size = walker::path_size(&child);
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

            let removed = if is_dir {
                std::fs::remove_dir_all(&child)
            } else {
                std::fs::remove_file(&child)
            };
            removed.map_err(|e| CleanError::io(&child, e))?;

            record.records_deleted += 1;
            record.bytes_freed += size;
        }

        if !recreate {
            std::fs::remove_dir(path).map_err(|e| CleanError::io(path, e))?;
        }
    } else if recreate {
        std::fs::create_dir_all(path).map_err(|e| CleanError::io(path, e))?;
    }

    Ok(record)
}
