use colored::*;
use serde::Serialize;

use crate::cleaner::{
    Discovery, EntryStatus, Outcome, PurgeReport, RestoreReport, RunReport, RunStatus, SnapshotManifest,
    SnapshotSummary,
};
use crate::common::format::{self, format_path, format_size, format_size_colored};
use crate::scanner::targets::StoreKind;

/// Print any report as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results: {}", e),
    }
}

/// Print discovery results in human-readable format
pub fn print_discovery(discoveries: &[Discovery]) {
    println!();
    println!("{}  statewipe Discovery", "🔎");
    println!("{}", "─".repeat(60).dimmed());

    for d in discoveries {
        println!();
        if !d.is_installed() {
            println!("  {} {} {}", "○".dimmed(), d.display_name.bold(), "not installed".dimmed());
            continue;
        }

        println!(
            "  {} {} ({} in {})",
            "●".green(),
            d.display_name.bold(),
            format_size_colored(d.scan.total_bytes),
            format::format_duration(d.scan.duration_secs).cyan()
        );
        for root in &d.scan.roots {
            println!("    {} {}", "↳".dimmed(), format_path(root).dimmed());
        }
        println!();

        for kind in [StoreKind::KvStore, StoreKind::Document, StoreKind::CacheDir, StoreKind::Unknown] {
            for store in d.scan.filter_by_kind(kind) {
                let count = store
                    .entry_count
                    .map(|c| {
                        let noun = match kind {
                            StoreKind::CacheDir => "file",
                            StoreKind::Document => "key",
                            _ => "row",
                        };
                        format::format_entries(c, noun)
                    })
                    .unwrap_or_default();
                println!(
                    "    {:<10} {:<50} {:>10}  {}",
                    format::format_kind(&store.kind),
                    format::truncate(&store.relative_path().display().to_string(), 50),
                    format_size(store.size_bytes),
                    count.dimmed()
                );
            }
        }

        if !d.scan.errors.is_empty() {
            println!();
            println!("  {} {}", "⚠".yellow(), format!("{} warnings:", d.scan.errors.len()).yellow());
            for error in &d.scan.errors {
                println!("    {} {}", "→".dimmed(), error.dimmed());
            }
        }
    }

    println!();
    println!("{}", "─".repeat(60).dimmed());
    println!("  {} Run {} to back up and clean", "💡", "statewipe clean <app>".cyan());
    println!();
}

/// Print a minimal discovery summary
pub fn print_discovery_quiet(discoveries: &[Discovery]) {
    for d in discoveries {
        println!("{}  {}  {}", d.application, d.scan.stores.len(), d.scan.total_bytes);
    }
}

/// Print a clean run report
pub fn print_run_report(report: &RunReport) {
    println!();
    let (icon, label) = match report.status {
        RunStatus::Completed => ("✓".green(), "Cleaned".green().bold()),
        RunStatus::DryRun => ("ℹ".cyan(), "Dry run".cyan().bold()),
        RunStatus::NotInstalled => ("○".dimmed(), "Not installed".dimmed()),
        RunStatus::Blocked => ("✗".red(), "Blocked".red().bold()),
        RunStatus::Aborted => ("✗".red(), "Aborted".red().bold()),
    };
    println!("  {} {} {}", icon, label, report.display_name.bold());

    if let Some(ref reason) = report.reason {
        let reason = if report.is_fatal() { reason.red() } else { reason.dimmed() };
        println!("    {} {}", "→".dimmed(), reason);
    }

    for store in &report.stores {
        let path = format::truncate(&format_path(&store.path), 60);
        match &store.outcome {
            Outcome::Done(record) => {
                let mut parts = Vec::new();
                if !record.keys_reset.is_empty() {
                    parts.push(format!("{} reset", record.keys_reset.len()));
                }
                if !record.keys_removed.is_empty() {
                    parts.push(format!("{} removed", record.keys_removed.len()));
                }
                if record.records_deleted > 0 {
                    parts.push(format::format_entries(record.records_deleted, "record"));
                }
                if record.bytes_freed > 0 {
                    parts.push(format!("{} freed", format_size(record.bytes_freed)));
                }
                let detail = if parts.is_empty() {
                    "unchanged".to_string()
                } else {
                    parts.join(", ")
                };
                println!("    {} {:<60} {}", "✓".green(), path, detail.dimmed());
            }
            Outcome::Skipped { reason } => {
                println!("    {} {:<60} {}", "–".yellow(), path, reason.yellow());
            }
            Outcome::Failed { reason } => {
                println!("    {} {:<60} {}", "✗".red(), path, reason.red());
            }
        }
    }

    if report.status == RunStatus::Completed && !report.stores.is_empty() {
        println!();
        println!(
            "  {} {} stores changed, {} skipped, {} failed; {} edits, {} freed",
            "📊",
            report.done().to_string().cyan(),
            report.skipped(),
            report.failed(),
            report.change_count(),
            format_size_colored(report.bytes_freed())
        );
    }

    if let Some(ref sid) = report.snapshot_id {
        println!("  {} Snapshot: {}", "💾", sid.cyan());
        println!("  {} Undo with: {}", "💡", format!("statewipe restore --snapshot {}", sid).cyan());
    }

    if !report.warnings.is_empty() {
        println!();
        println!("  {} {} warnings:", "⚠".yellow(), report.warnings.len());
        for (i, w) in report.warnings.iter().enumerate().take(10) {
            println!("    {} {}", format!("{}.", i + 1).dimmed(), w.dimmed());
        }
        if report.warnings.len() > 10 {
            println!("    ... and {} more", (report.warnings.len() - 10).to_string().dimmed());
        }
    }
    println!();
}

/// Print the list of snapshots
pub fn print_snapshots(snapshots: &[SnapshotSummary]) {
    println!();
    println!("  {} Snapshots", "📦");
    println!("{}", "─".repeat(80).dimmed());
    println!();

    if snapshots.is_empty() {
        println!("  No snapshots found.");
        println!();
        return;
    }

    println!(
        "  {:<36} {:<10} {:<20} {:>10} {:>8}  {}",
        "Snapshot ID".dimmed(),
        "App".dimmed(),
        "Created".dimmed(),
        "Size".dimmed(),
        "Entries".dimmed(),
        "Status".dimmed(),
    );
    println!("  {}", "─".repeat(96).dimmed());

    for s in snapshots {
        let status = if s.complete {
            "Complete".green()
        } else {
            "Incomplete".red()
        };
        println!(
            "  {:<36} {:<10} {:<20} {:>10} {:>8}  {}",
            s.snapshot_id,
            s.application,
            s.created_at.format("%Y-%m-%d %H:%M:%S"),
            format_size(s.on_disk_bytes),
            s.entry_count,
            status,
        );
    }

    let incomplete = snapshots.iter().filter(|s| !s.complete).count();
    if incomplete > 0 {
        println!();
        println!(
            "  {} {} incomplete snapshots. Inspect or remove with {}",
            "⚠".yellow(),
            incomplete,
            "statewipe backups discard <ID>".cyan()
        );
    }
    println!();
}

/// Print one snapshot in detail
pub fn print_snapshot_detail(manifest: &SnapshotManifest) {
    format::print_header(&format!("Snapshot {}", manifest.snapshot_id));
    format::print_kv("Application", &manifest.application);
    format::print_kv("Operation", &manifest.operation);
    format::print_kv("Created", &manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    format::print_kv("Directory", &format_path(&manifest.backup_dir));
    format::print_kv("Complete", if manifest.complete { "yes" } else { "no" });
    if let Some(ref archive) = manifest.archive {
        format::print_kv("Archive", archive);
    }
    format::print_kv("Total", &format_size(manifest.total_bytes));
    println!();

    for entry in &manifest.entries {
        let mark = if entry.verified { "✓".green() } else { "✗".red() };
        println!(
            "    {} {:<10} {:<60} {:>10}",
            mark,
            format::format_kind(&entry.kind),
            format::truncate(&format_path(&entry.original_path), 60),
            format_size(entry.size_bytes)
        );
    }
    println!();
}

/// Print a restore report
pub fn print_restore_report(report: &RestoreReport) {
    println!();
    for entry in &report.entries {
        let path = format::truncate(&format_path(&entry.original_path), 60);
        match &entry.status {
            EntryStatus::Restored => println!("    {} {}", "✓".green(), path),
            EntryStatus::Skipped { reason } => println!("    {} {:<60} {}", "–".yellow(), path, reason.yellow()),
            EntryStatus::Failed { reason } => println!("    {} {:<60} {}", "✗".red(), path, reason.red()),
        }
    }
    println!();
    println!(
        "  {} Restored {} of {} entries ({}) from {}",
        if report.failures().is_empty() { "✓".green() } else { "⚠".yellow() },
        report.restored_count().to_string().cyan(),
        report.entries.len(),
        format_size_colored(report.restored_bytes()),
        report.snapshot_id.cyan()
    );
    println!();
}

/// Print a purge report
pub fn print_purge_report(report: &PurgeReport) {
    println!();
    if report.purged.is_empty() {
        println!("  No snapshots to purge.");
    } else {
        for p in &report.purged {
            println!("    {} {} ({})", "✓".green(), p.snapshot_id, format_size(p.bytes_freed));
        }
        println!();
        println!(
            "  {} Purged {} snapshots, freed {}",
            "🗑",
            report.purged.len().to_string().cyan(),
            format_size_colored(report.total_bytes_freed)
        );
    }
    for err in &report.errors {
        println!("    {} {}", "⚠".yellow(), err.dimmed());
    }
    println!();
}
