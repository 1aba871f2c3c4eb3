use std::path::PathBuf;

use thiserror::Error;

/// Typed errors for statewipe operations.
/// We use `anyhow` at the top level for CLI error handling,
/// but these typed errors let each phase decide whether a failure
/// skips one store or stops the run.
#[derive(Debug, Error)]
pub enum CleanError {
    /// No resolved path exists for the application (informational)
    #[error("{app} is not installed (no data directory found)")]
    NotInstalled { app: String },

    /// The application is running; mutation is refused
    #[error("{app} is currently running. Close it before continuing.")]
    ApplicationRunning { app: String },

    /// The liveness probe could not tell whether the application runs
    #[error("Could not determine whether {app} is running; refusing to modify its data")]
    LivenessUnknown { app: String },

    /// A store could not be read or parsed
    #[error("Store '{}' is unreadable: {message}", path.display())]
    StoreCorrupt { path: PathBuf, message: String },

    /// A backup copy did not match its source
    #[error("Backup verification failed for '{}': {message}", path.display())]
    BackupVerificationFailed { path: PathBuf, message: String },

    /// A store is locked by another process
    #[error("Store '{}' is busy (locked by another process)", path.display())]
    StoreBusy { path: PathBuf },

    /// Not enough free space at the backup root
    #[error("Insufficient space at '{}': need {needed} bytes, {available} available", root.display())]
    InsufficientSpace {
        root: PathBuf,
        needed: u64,
        available: u64,
    },

    /// Aggregate backup size is above the configured maximum
    #[error("Backup of {total} bytes exceeds the configured limit of {limit} bytes")]
    SizeLimitExceeded { total: u64, limit: u64 },

    /// No verified snapshot entry covers the path
    #[error("No verified backup covers '{}'", path.display())]
    NotBackedUp { path: PathBuf },

    /// Restore was asked for a snapshot that never completed
    #[error("Snapshot '{snapshot_id}' is incomplete; pass --allow-incomplete to restore its verified entries")]
    SnapshotIncomplete { snapshot_id: String },

    /// A complete manifest was asked to change
    #[error("Snapshot '{snapshot_id}' is complete and can no longer be modified")]
    ManifestSealed { snapshot_id: String },

    /// Path must never be touched
    #[error("SAFETY: refusing to touch protected path: {}", path.display())]
    ProtectedPath { path: PathBuf },

    /// File system operation failed
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error at '{}': {source}", path.display())]
    Sqlite {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("JSON error at '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CleanError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CleanError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_installed_message() {
        let err = CleanError::NotInstalled { app: "Windsurf".into() };
        assert_eq!(err.to_string(), "Windsurf is not installed (no data directory found)");
    }

    #[test]
    fn test_display_mentions_path() {
        let err = CleanError::NotBackedUp {
            path: PathBuf::from("/tmp/state.vscdb"),
        };
        assert!(err.to_string().contains("/tmp/state.vscdb"));
    }
}
