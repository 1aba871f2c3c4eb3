use std::fmt::Write as _;
use std::path::Path;

use super::manifest::{sidecar_path, SnapshotManifest, ALL_SIDECARS, DISPLACED_DIR};
use crate::common::errors::CleanError;
use crate::scanner::targets::StoreKind;

pub const SH_SCRIPT: &str = "restore.sh";
pub const PS1_SCRIPT: &str = "restore.ps1";

fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn rel(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// One line of a restore script
enum Step {
    File { backup: String, dest: String },
    Dir { backup: String, dest: String },
    /// Journal file the snapshot did not capture; moved under `displaced/`
    Displace { dest: String, name: String },
}

/// Same order and sidecar handling as `RestoreExecutor`
fn steps(manifest: &SnapshotManifest) -> Vec<Step> {
    let mut steps = Vec::new();
    for (idx, entry) in manifest.entries.iter().enumerate().filter(|(_, e)| e.verified) {
        let dest = entry.original_path.to_string_lossy().to_string();
        let backup = rel(&entry.backup_path);
        if entry.is_dir {
            steps.push(Step::Dir { backup, dest });
            continue;
        }
        steps.push(Step::File { backup, dest });

        if entry.kind != StoreKind::KvStore {
            continue;
        }
        for suffix in ALL_SIDECARS {
            let dest = sidecar_path(&entry.original_path, suffix);
            let dest_str = dest.to_string_lossy().to_string();
            match entry.sidecar(suffix) {
                Some(copy) => steps.push(Step::File {
                    backup: rel(&copy.backup_path),
                    dest: dest_str,
                }),
                None => {
                    let name = dest
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    steps.push(Step::Displace {
                        dest: dest_str,
                        name: format!("{}-{}", idx, name),
                    });
                }
            }
        }
    }
    steps
}

/// POSIX shell restore procedure.
/// Backup paths resolve relative to the script, so the snapshot directory
/// can be moved before running it.
pub fn render_sh(manifest: &SnapshotManifest) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "#!/bin/sh");
    let _ = writeln!(
        s,
        "# Restore snapshot {} of {} taken {}",
        manifest.snapshot_id,
        manifest.application,
        manifest.created_at.to_rfc3339()
    );
    let _ = writeln!(s, "# Close the application before running this script.");
    s.push_str(
        r#"set -e
HERE="$(cd "$(dirname "$0")" && pwd)"

restore_file() {
    mkdir -p "$(dirname "$2")"
    cp -p "$HERE/$1" "$2.restore-tmp"
    mv -f "$2.restore-tmp" "$2"
    echo "restored $2"
}

restore_dir() {
    rm -rf "$2"
    mkdir -p "$2"
    cp -Rp "$HERE/$1/." "$2/"
    echo "restored $2"
}

displace() {
    if [ -e "$1" ]; then
        mkdir -p "$HERE/__DISPLACED__"
        mv -f "$1" "$HERE/__DISPLACED__/$2"
        echo "moved aside $1"
    fi
}

"#
        .replace("__DISPLACED__", DISPLACED_DIR)
        .as_str(),
    );

    for step in steps(manifest) {
        let _ = match step {
            Step::File { backup, dest } => writeln!(s, "restore_file {} {}", sh_quote(&backup), sh_quote(&dest)),
            Step::Dir { backup, dest } => writeln!(s, "restore_dir {} {}", sh_quote(&backup), sh_quote(&dest)),
            Step::Displace { dest, name } => writeln!(s, "displace {} {}", sh_quote(&dest), sh_quote(&name)),
        };
    }
    s
}

/// PowerShell restore procedure
pub fn render_ps1(manifest: &SnapshotManifest) -> String {
    let mut s = String::new();
    let _ = writeln!(
        s,
        "# Restore snapshot {} of {} taken {}",
        manifest.snapshot_id,
        manifest.application,
        manifest.created_at.to_rfc3339()
    );
    let _ = writeln!(s, "# Close the application before running this script.");
    s.push_str(
        r#"$ErrorActionPreference = 'Stop'
$here = Split-Path -Parent $MyInvocation.MyCommand.Path

function Restore-File($rel, $dest) {
    New-Item -ItemType Directory -Force -Path (Split-Path -Parent $dest) | Out-Null
    Copy-Item -LiteralPath (Join-Path $here $rel) -Destination "$dest.restore-tmp" -Force
    Move-Item -LiteralPath "$dest.restore-tmp" -Destination $dest -Force
    Write-Host "restored $dest"
}

function Restore-Dir($rel, $dest) {
    if (Test-Path -LiteralPath $dest) { Remove-Item -LiteralPath $dest -Recurse -Force }
    New-Item -ItemType Directory -Force -Path $dest | Out-Null
    Get-ChildItem -LiteralPath (Join-Path $here $rel) -Force | Copy-Item -Destination $dest -Recurse -Force
    Write-Host "restored $dest"
}

function Move-Aside($path, $name) {
    if (Test-Path -LiteralPath $path) {
        $dir = Join-Path $here '__DISPLACED__'
        New-Item -ItemType Directory -Force -Path $dir | Out-Null
        Move-Item -LiteralPath $path -Destination (Join-Path $dir $name) -Force
        Write-Host "moved aside $path"
    }
}

"#
        .replace("__DISPLACED__", DISPLACED_DIR)
        .as_str(),
    );

    for step in steps(manifest) {
        let _ = match step {
            Step::File { backup, dest } => writeln!(s, "Restore-File {} {}", ps_quote(&backup), ps_quote(&dest)),
            Step::Dir { backup, dest } => writeln!(s, "Restore-Dir {} {}", ps_quote(&backup), ps_quote(&dest)),
            Step::Displace { dest, name } => writeln!(s, "Move-Aside {} {}", ps_quote(&dest), ps_quote(&name)),
        };
    }
    s
}

/// Write both scripts into the snapshot directory
pub fn write_scripts(manifest: &SnapshotManifest) -> Result<(), CleanError> {
    let sh = manifest.backup_dir.join(SH_SCRIPT);
    std::fs::write(&sh, render_sh(manifest)).map_err(|e| CleanError::io(&sh, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&sh, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| CleanError::io(&sh, e))?;
    }

    let ps1 = manifest.backup_dir.join(PS1_SCRIPT);
    std::fs::write(&ps1, render_ps1(manifest)).map_err(|e| CleanError::io(&ps1, e))?;

    tracing::debug!("Wrote restore scripts to {}", manifest.backup_dir.display());
    Ok(())
}
