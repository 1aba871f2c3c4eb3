use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

use super::backup::BackupManager;
use super::engine::{MutationEngine, Outcome, StoreReport};
use super::manifest::SnapshotManifest;
use super::restore::{RestoreExecutor, RestoreReport};
use crate::apps::{clear_to_mutate, AssumeStopped, Clearance, ProcessProbe};
use crate::common::config::Config;
use crate::common::errors::CleanError;
use crate::common::progress::Progress;
use crate::profiles::{resolver, ApplicationProfile, Environment, Platform};
use crate::scanner::{self, targets::ScanResults};

pub const MUTATIONS_FILE: &str = "mutations.json";
pub const CLEAN_OPERATION: &str = "clean";

/// Clean mode determines whether anything is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanMode {
    /// Show what would be done without doing it
    DryRun,
    /// Back up, then mutate
    Apply,
}

/// Everything a run needs from the outside world
pub struct RunContext<'a> {
    pub config: &'a Config,
    pub platform: Platform,
    pub env: &'a dyn Environment,
    pub probe: &'a dyn ProcessProbe,
    pub show_progress: bool,
}

impl RunContext<'_> {
    /// Issue a clearance, or skip the check when disabled in config
    pub fn clearance(&self, profile: &ApplicationProfile) -> Result<Clearance, CleanError> {
        if self.config.safety.check_running_processes {
            clear_to_mutate(profile, self.probe)
        } else {
            tracing::debug!("Process check disabled; assuming {} is stopped", profile.name);
            clear_to_mutate(profile, &AssumeStopped)
        }
    }
}

/// Resolved roots and scanned stores for one application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discovery {
    pub application: String,
    pub display_name: String,
    pub scan: ScanResults,
}

impl Discovery {
    pub fn is_installed(&self) -> bool {
        !self.scan.roots.is_empty()
    }
}

/// Resolve and scan one application. Read-only.
pub fn discover(ctx: &RunContext<'_>, profile: &ApplicationProfile) -> Discovery {
    let roots = resolver::resolve(profile, ctx.platform, ctx.env);
    let scan = scanner::run_scan(&roots, &ctx.config.cleaning, ctx.show_progress);

    Discovery {
        application: profile.name.clone(),
        display_name: profile.display_name.clone(),
        scan,
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Backup verified and every store processed (individual stores may be skipped)
    Completed,
    /// No data directory found; nothing to do
    NotInstalled,
    /// Liveness check refused the run
    Blocked,
    /// Backup failed; nothing was mutated
    Aborted,
    /// Planned only
    DryRun,
}

/// Per-application aggregation of every phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub application: String,
    pub display_name: String,
    pub status: RunStatus,
    /// Why the run stopped early (not installed, blocked or aborted)
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub roots: Vec<PathBuf>,
    pub snapshot_id: Option<String>,
    pub backup_dir: Option<PathBuf>,
    pub stores: Vec<StoreReport>,
    pub warnings: Vec<String>,
}

impl RunReport {
    fn new(discovery: &Discovery, status: RunStatus) -> Self {
        Self {
            application: discovery.application.clone(),
            display_name: discovery.display_name.clone(),
            status,
            reason: None,
            started_at: Utc::now(),
            duration_secs: 0.0,
            roots: discovery.scan.roots.clone(),
            snapshot_id: None,
            backup_dir: None,
            stores: Vec::new(),
            warnings: discovery.scan.errors.clone(),
        }
    }

    /// Whether the run should make the process exit non-zero
    pub fn is_fatal(&self) -> bool {
        matches!(self.status, RunStatus::Blocked | RunStatus::Aborted)
    }

    pub fn done(&self) -> usize {
        self.stores.iter().filter(|s| s.outcome.is_done()).count()
    }

    pub fn skipped(&self) -> usize {
        self.stores
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.stores
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Failed { .. }))
            .count()
    }

    pub fn bytes_freed(&self) -> u64 {
        self.stores
            .iter()
            .filter_map(|s| s.outcome.record())
            .map(|r| r.bytes_freed)
            .sum()
    }

    pub fn change_count(&self) -> u64 {
        self.stores
            .iter()
            .filter_map(|s| s.outcome.record())
            .map(|r| r.change_count())
            .sum()
    }
}

/// Discover, check liveness, snapshot, then mutate one application.
///
/// Each phase runs only when the previous one succeeded: a blocked
/// liveness check means no backup; a failed backup means no mutation.
pub fn clean_application(
    ctx: &RunContext<'_>,
    profile: &ApplicationProfile,
    mode: CleanMode,
    backups: &BackupManager,
) -> RunReport {
    let start = Instant::now();
    let discovery = discover(ctx, profile);

    let mut report = if !discovery.is_installed() {
        let reason = CleanError::NotInstalled {
            app: profile.display_name.clone(),
        };
        tracing::info!("{}", reason);
        let mut report = RunReport::new(&discovery, RunStatus::NotInstalled);
        report.reason = Some(reason.to_string());
        report
    } else if mode == CleanMode::DryRun {
        plan(&discovery)
    } else {
        apply(ctx, profile, &discovery, backups)
    };

    report.duration_secs = start.elapsed().as_secs_f64();
    report
}

fn plan(discovery: &Discovery) -> RunReport {
    let mut report = RunReport::new(discovery, RunStatus::DryRun);
    report.stores = discovery
        .scan
        .stores
        .iter()
        .map(|s| StoreReport {
            path: s.path.clone(),
            kind: s.kind,
            outcome: Outcome::Skipped {
                reason: if s.kind.is_mutable() {
                    "dry run".into()
                } else {
                    s.note.clone().unwrap_or_else(|| "unreadable store".into())
                },
            },
        })
        .collect();
    report
}

fn apply(
    ctx: &RunContext<'_>,
    profile: &ApplicationProfile,
    discovery: &Discovery,
    backups: &BackupManager,
) -> RunReport {
    let mut report = RunReport::new(discovery, RunStatus::Completed);

    let clearance = match ctx.clearance(profile) {
        Ok(c) => c,
        Err(e) => {
            report.status = RunStatus::Blocked;
            report.reason = Some(e.to_string());
            return report;
        }
    };

    match SnapshotManifest::incomplete(backups.root(), &profile.name) {
        Ok(stale) => {
            for s in stale {
                let msg = format!(
                    "Incomplete snapshot {} from an interrupted run is still on disk",
                    s.snapshot_id
                );
                tracing::warn!("{}", msg);
                report.warnings.push(msg);
            }
        }
        Err(e) => tracing::warn!("Could not list snapshots: {:#}", e),
    }

    let stores: Vec<_> = discovery
        .scan
        .stores
        .iter()
        .filter(|s| s.kind.is_mutable())
        .cloned()
        .collect();

    if stores.is_empty() {
        tracing::info!("{}: nothing to clean", profile.display_name);
        return report;
    }

    let progress = Progress::bar(ctx.show_progress, stores.len() as u64, "backing up");
    let manifest = backups.snapshot(&profile.name, CLEAN_OPERATION, &stores, &progress);
    progress.finish();

    let manifest = match manifest {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("Backup of {} aborted: {}", profile.display_name, e);
            report.status = RunStatus::Aborted;
            report.reason = Some(e.to_string());
            return report;
        }
    };
    report.snapshot_id = Some(manifest.snapshot_id.clone());
    report.backup_dir = Some(manifest.backup_dir.clone());

    let engine = MutationEngine::new(&ctx.config.cleaning, &manifest, &clearance);
    report.stores = engine.apply_all(&stores);

    let path = manifest.backup_dir.join(MUTATIONS_FILE);
    let written = serde_json::to_string_pretty(&report.stores)
        .map_err(anyhow::Error::from)
        .and_then(|json| std::fs::write(&path, json).map_err(anyhow::Error::from));
    if let Err(e) = written {
        let msg = format!("Could not write {}: {:#}", path.display(), e);
        tracing::warn!("{}", msg);
        report.warnings.push(msg);
    }

    report
}

/// Restore a snapshot after confirming its application is stopped
pub fn restore_snapshot(
    ctx: &RunContext<'_>,
    profile: &ApplicationProfile,
    manifest: &SnapshotManifest,
    allow_incomplete: bool,
) -> Result<RestoreReport, CleanError> {
    let clearance = ctx.clearance(profile)?;
    let progress = Progress::bar(ctx.show_progress, manifest.entries.len() as u64, "restoring");
    let report = RestoreExecutor::new(manifest, &clearance)
        .allow_incomplete(allow_incomplete)
        .restore(&progress);
    progress.finish();
    report
}
