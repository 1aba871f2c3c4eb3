use std::path::Path;

use crate::common::errors::CleanError;

/// Paths that must NEVER be mutated or restored over.
/// This is a critical safety net against bad path templates.
const PROTECTED_PATHS: &[&str] = &[
    "/",
    "/System",
    "/Applications",
    "/Users",
    "/Library",
    "/home",
    "/root",
    "/usr",
    "/bin",
    "/sbin",
    "/var",
    "/etc",
    "/opt",
    "/private",
    "C:\\",
    "C:\\Windows",
    "C:\\Users",
    "C:\\Program Files",
];

/// Paths under home that must never be mutated entirely
const PROTECTED_HOME_DIRS: &[&str] = &[
    "", // home dir itself
    "Desktop",
    "Documents",
    "Downloads",
    "Library",
    "Library/Application Support",
    ".config",
    "AppData",
    "AppData/Roaming",
    "AppData/Local",
    ".ssh",
    ".gnupg",
];

/// Check if a path is protected and should NEVER be touched
pub fn is_protected(path: &Path) -> bool {
    if PROTECTED_PATHS.iter().any(|p| path == Path::new(p)) {
        return true;
    }

    if let Some(home) = dirs::home_dir() {
        for dir in PROTECTED_HOME_DIRS {
            let protected = if dir.is_empty() {
                home.clone()
            } else {
                home.join(dir)
            };
            if path == protected {
                return true;
            }
        }
    }

    false
}

/// Refuse with `ProtectedPath` if the path is protected
pub fn ensure_not_protected(path: &Path) -> Result<(), CleanError> {
    if is_protected(path) {
        return Err(CleanError::ProtectedPath {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Validate the aggregate size of a snapshot before any copy starts
pub fn validate_backup_size(total_bytes: u64, limit_bytes: u64) -> Result<(), CleanError> {
    if total_bytes > limit_bytes {
        return Err(CleanError::SizeLimitExceeded {
            total: total_bytes,
            limit: limit_bytes,
        });
    }
    Ok(())
}

/// Validate there is room for the snapshot at `root`.
/// Unknown free space is not treated as a failure.
pub fn validate_free_space(root: &Path, needed: u64) -> Result<(), CleanError> {
    match available_space(root) {
        Some(available) if available < needed => Err(CleanError::InsufficientSpace {
            root: root.to_path_buf(),
            needed,
            available,
        }),
        _ => Ok(()),
    }
}

/// Free bytes on the filesystem holding `path`, via `df -Pk`
#[cfg(unix)]
pub fn available_space(path: &Path) -> Option<u64> {
    // df needs an existing path; walk up until one exists
    let existing = path.ancestors().find(|p| p.exists())?;
    let output = std::process::Command::new("df")
        .arg("-Pk")
        .arg(existing)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_df_available(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> Option<u64> {
    None
}

/// Parse the "Available" column (KB) of POSIX `df -Pk` output
pub fn parse_df_available(stdout: &str) -> Option<u64> {
    let line = stdout.lines().nth(1)?;
    let kb: u64 = line.split_whitespace().nth(3)?.parse().ok()?;
    Some(kb * 1024)
}
