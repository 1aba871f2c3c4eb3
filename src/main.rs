use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use statewipe::apps::SystemProbe;
use statewipe::cleaner::{
    self, discard_incomplete, purge_expired, purge_snapshot, BackupManager, CleanMode, RunContext,
    SnapshotManifest,
};
use statewipe::cli::args::{AppTarget, BackupsAction, Cli, Commands, CompletionShell, ConfigAction, OutputFormat};
use statewipe::cli::output;
use statewipe::common::config::Config;
use statewipe::common::format;
use statewipe::profiles::{ApplicationProfile, Platform, SystemEnv};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let _log_guard = init_logging(cli.verbose);

    match cli.command {
        Commands::Discover { ref app } => cmd_discover(&cli, app.as_deref()),

        Commands::Clean {
            ref target,
            dry_run,
            yes,
        } => cmd_clean(&cli, target, dry_run, yes),

        Commands::Restore {
            ref last,
            ref snapshot,
            allow_incomplete,
            yes,
        } => cmd_restore(&cli, last.as_deref(), snapshot.as_deref(), allow_incomplete, yes),

        Commands::Backups { ref action } => cmd_backups(&cli, action),

        Commands::Purge {
            expired,
            ref snapshot,
            yes,
        } => cmd_purge(&cli, expired, snapshot.as_deref(), yes),

        Commands::Config { ref action } => cmd_config(action),

        Commands::Completions { ref shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            let shell = match shell {
                CompletionShell::Bash => clap_complete::Shell::Bash,
                CompletionShell::Zsh => clap_complete::Shell::Zsh,
                CompletionShell::Fish => clap_complete::Shell::Fish,
                CompletionShell::Powershell => clap_complete::Shell::PowerShell,
            };
            clap_complete::generate(shell, &mut cmd, "statewipe", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ─── Logging ──────────────────────────────────────────────────────────────────

/// Install the subscriber: a daily log file always, stderr only when verbose.
/// The returned guard flushes the file writer on drop.
fn init_logging(verbose: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default = if verbose { "statewipe=debug" } else { "statewipe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let logs_dir = Config::logs_dir();
    let (file_layer, guard) = match std::fs::create_dir_all(&logs_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&logs_dir, "statewipe.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    guard
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn show_progress(cli: &Cli) -> bool {
    !cli.quiet && matches!(cli.format, OutputFormat::Human)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("  {} {} [y/N] ", "?".yellow().bold(), prompt);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    if !input.trim().eq_ignore_ascii_case("y") {
        println!("  {} Cancelled", "✗".red());
        return Ok(false);
    }
    Ok(true)
}

fn profiles_for(app: Option<&str>) -> Result<Vec<ApplicationProfile>> {
    match app {
        Some(name) => Ok(vec![ApplicationProfile::load(name)?]),
        None => ApplicationProfile::all(),
    }
}

// ─── Discover ─────────────────────────────────────────────────────────────────

fn cmd_discover(cli: &Cli, app: Option<&str>) -> Result<ExitCode> {
    let config = Config::load()?;
    let env = SystemEnv;
    let probe = SystemProbe;
    let ctx = RunContext {
        config: &config,
        platform: Platform::current(),
        env: &env,
        probe: &probe,
        show_progress: show_progress(cli),
    };

    let discoveries: Vec<_> = profiles_for(app)?
        .iter()
        .map(|p| cleaner::discover(&ctx, p))
        .collect();

    match cli.format {
        OutputFormat::Human => output::print_discovery(&discoveries),
        OutputFormat::Json => output::print_json(&discoveries),
        OutputFormat::Quiet => output::print_discovery_quiet(&discoveries),
    }

    Ok(ExitCode::SUCCESS)
}

// ─── Clean ────────────────────────────────────────────────────────────────────

fn cmd_clean(cli: &Cli, target: &AppTarget, dry_run: bool, yes: bool) -> Result<ExitCode> {
    let config = Config::load()?;
    let profiles = profiles_for(if target.all { None } else { target.app.as_deref() })?;

    let mode = if dry_run { CleanMode::DryRun } else { CleanMode::Apply };

    if mode == CleanMode::Apply && !yes && config.safety.require_confirmation {
        let names: Vec<&str> = profiles.iter().map(|p| p.display_name.as_str()).collect();
        println!();
        println!(
            "  {} statewipe will back up, then reset identifiers and clear sessions and caches of: {}",
            "⚠".yellow(),
            names.join(", ").bold()
        );
        println!("  Make sure these applications are closed.");
        println!();
        if !confirm("Proceed?")? {
            return Ok(ExitCode::SUCCESS);
        }
    }

    config.init_dirs()?;
    let backups = BackupManager::new(&config);
    let env = SystemEnv;
    let probe = SystemProbe;
    let ctx = RunContext {
        config: &config,
        platform: Platform::current(),
        env: &env,
        probe: &probe,
        show_progress: show_progress(cli),
    };

    let mut reports = Vec::new();
    for profile in &profiles {
        tracing::info!("Cleaning {} ({:?})", profile.display_name, mode);
        let report = cleaner::clean_application(&ctx, profile, mode, &backups);
        tracing::info!(
            "{}: {:?}, {} stores changed, {} skipped, {} failed",
            profile.display_name,
            report.status,
            report.done(),
            report.skipped(),
            report.failed()
        );
        if matches!(cli.format, OutputFormat::Human) && !cli.quiet {
            output::print_run_report(&report);
        }
        reports.push(report);
    }

    match cli.format {
        OutputFormat::Json => output::print_json(&reports),
        OutputFormat::Quiet => {
            for r in &reports {
                println!(
                    "{}  {:?}  {}  {}",
                    r.application,
                    r.status,
                    r.change_count(),
                    r.snapshot_id.as_deref().unwrap_or("-")
                );
            }
        }
        OutputFormat::Human => {}
    }

    if reports.iter().any(|r| r.is_fatal()) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

// ─── Restore ──────────────────────────────────────────────────────────────────

fn cmd_restore(
    cli: &Cli,
    last: Option<&str>,
    snapshot: Option<&str>,
    allow_incomplete: bool,
    yes: bool,
) -> Result<ExitCode> {
    let config = Config::load()?;
    let root = config.backup_root();

    let manifest = match (last, snapshot) {
        (_, Some(id)) => SnapshotManifest::load_by_id(&root, id)?,
        (Some(app), None) => {
            let summary = SnapshotManifest::most_recent(&root, app)?
                .with_context(|| format!("No complete snapshot found for '{}'", app))?;
            SnapshotManifest::load(&summary.backup_dir)?
        }
        (None, None) => anyhow::bail!("Specify --last <APP> or --snapshot <ID>"),
    };
    let profile = ApplicationProfile::load(&manifest.application)?;

    if !yes && config.safety.require_confirmation {
        println!();
        println!(
            "  {} Restoring {} ({} entries, {}) will overwrite the current state of {}",
            "⚠".yellow(),
            manifest.snapshot_id.cyan(),
            manifest.entries.len(),
            format::format_size(manifest.total_bytes),
            profile.display_name.bold()
        );
        println!();
        if !confirm("Proceed?")? {
            return Ok(ExitCode::SUCCESS);
        }
    }

    let env = SystemEnv;
    let probe = SystemProbe;
    let ctx = RunContext {
        config: &config,
        platform: Platform::current(),
        env: &env,
        probe: &probe,
        show_progress: show_progress(cli),
    };

    let report = cleaner::restore_snapshot(&ctx, &profile, &manifest, allow_incomplete)?;
    tracing::info!(
        "Restored {} of {} entries from {}",
        report.restored_count(),
        report.entries.len(),
        report.snapshot_id
    );

    match cli.format {
        OutputFormat::Human => output::print_restore_report(&report),
        OutputFormat::Json => output::print_json(&report),
        OutputFormat::Quiet => println!("{}  {}", report.snapshot_id, report.restored_count()),
    }

    if report.failures().is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

// ─── Backups ──────────────────────────────────────────────────────────────────

fn cmd_backups(cli: &Cli, action: &BackupsAction) -> Result<ExitCode> {
    let config = Config::load()?;
    let root = config.backup_root();

    match action {
        BackupsAction::List => {
            let snapshots = SnapshotManifest::list(&root)?;
            match cli.format {
                OutputFormat::Human => output::print_snapshots(&snapshots),
                OutputFormat::Json => output::print_json(&snapshots),
                OutputFormat::Quiet => {
                    for s in &snapshots {
                        println!("{}", s.snapshot_id);
                    }
                }
            }
        }
        BackupsAction::Show { id } => {
            let manifest = SnapshotManifest::load_by_id(&root, id)?;
            match cli.format {
                OutputFormat::Json => output::print_json(&manifest),
                _ => output::print_snapshot_detail(&manifest),
            }
        }
        BackupsAction::Discard { id } => {
            let freed = discard_incomplete(&root, id)?;
            println!(
                "  {} Discarded incomplete snapshot {} ({})",
                "✓".green(),
                id,
                format::format_size(freed)
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ─── Purge ────────────────────────────────────────────────────────────────────

fn cmd_purge(cli: &Cli, expired: bool, snapshot: Option<&str>, yes: bool) -> Result<ExitCode> {
    let config = Config::load()?;
    let root = config.backup_root();

    if let Some(id) = snapshot {
        if !yes && !confirm(&format!("Permanently delete snapshot {}?", id))? {
            return Ok(ExitCode::SUCCESS);
        }
        let freed = purge_snapshot(&root, id)?;
        println!(
            "  {} Purged snapshot {} ({})",
            "✓".green(),
            id,
            format::format_size(freed)
        );
        return Ok(ExitCode::SUCCESS);
    }

    if expired {
        let report = purge_expired(&root, config.backup.retention_days)?;
        match cli.format {
            OutputFormat::Human => output::print_purge_report(&report),
            OutputFormat::Json => output::print_json(&report),
            OutputFormat::Quiet => println!("{}  {}", report.purged.len(), report.total_bytes_freed),
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(action: &ConfigAction) -> Result<ExitCode> {
    match action {
        ConfigAction::Init => {
            let config = Config::load()?;
            config.init_dirs()?;
            config.save()?;
            println!(
                "  {} statewipe initialized at {}",
                "✓".green(),
                format::format_path(&Config::data_dir())
            );
            println!("  Created: config.toml, backups/, logs/, profiles/");
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("  {} Configuration reset to defaults", "✓".green());
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }
    }
    Ok(ExitCode::SUCCESS)
}
