pub mod backup;
pub mod document;
pub mod engine;
pub mod hasher;
pub mod kv_store;
pub mod manifest;
pub mod matcher;
pub mod purger;
pub mod restore;
pub mod run;
pub mod script;

pub use backup::{BackupManager, FsCopier, SnapshotCopier};
pub use engine::{IdentifierSet, MutationEngine, MutationRecord, Outcome, StoreReport};
pub use manifest::{SnapshotEntry, SnapshotManifest, SnapshotSummary};
pub use purger::{discard_incomplete, purge_expired, purge_snapshot, PurgeReport};
pub use restore::{EntryStatus, RestoreExecutor, RestoreReport};
pub use run::{clean_application, discover, restore_snapshot, CleanMode, Discovery, RunContext, RunReport, RunStatus};
