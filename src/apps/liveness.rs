use std::process::Command;

use crate::common::errors::CleanError;
use crate::profiles::ApplicationProfile;

/// Answers "is a process with this name running?".
///
/// `None` means the answer is unknown, which callers treat the same as
/// "running". Any `Fn(&str) -> Option<bool>` is a probe.
pub trait ProcessProbe {
    fn probe(&self, process_name: &str) -> Option<bool>;

    /// Whether any of the application's processes runs.
    /// A profile without process names cannot be checked, so it is unknown.
    fn is_running(&self, profile: &ApplicationProfile) -> Option<bool> {
        if profile.process_names.is_empty() {
            return None;
        }
        let mut unknown = false;
        for name in &profile.process_names {
            match self.probe(name) {
                Some(true) => return Some(true),
                Some(false) => {}
                None => unknown = true,
            }
        }
        if unknown {
            None
        } else {
            Some(false)
        }
    }
}

impl<F> ProcessProbe for F
where
    F: Fn(&str) -> Option<bool>,
{
    fn probe(&self, process_name: &str) -> Option<bool> {
        self(process_name)
    }
}

/// Asks the operating system (`pgrep` on Unix, `tasklist` on Windows)
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    #[cfg(unix)]
    fn probe(&self, process_name: &str) -> Option<bool> {
        let output = Command::new("pgrep").arg("-i").arg(process_name).output().ok()?;
        // pgrep: 0 = match, 1 = no match, anything else = failure
        match output.status.code() {
            Some(0) => Some(true),
            Some(1) => Some(false),
            _ => None,
        }
    }

    #[cfg(windows)]
    fn probe(&self, process_name: &str) -> Option<bool> {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("IMAGENAME eq {}.exe", process_name), "/NH"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
        Some(stdout.contains(&process_name.to_lowercase()))
    }

    #[cfg(not(any(unix, windows)))]
    fn probe(&self, _process_name: &str) -> Option<bool> {
        None
    }
}

/// Probe used when process checks are disabled in the configuration
pub struct AssumeStopped;

impl ProcessProbe for AssumeStopped {
    fn probe(&self, _process_name: &str) -> Option<bool> {
        Some(false)
    }

    fn is_running(&self, _profile: &ApplicationProfile) -> Option<bool> {
        Some(false)
    }
}

/// Proof that an application was seen not running.
///
/// Only [`clear_to_mutate`] creates one; mutation and restore require it.
#[derive(Debug)]
pub struct Clearance {
    application: String,
}

impl Clearance {
    pub fn application(&self) -> &str {
        &self.application
    }
}

/// Check liveness and issue a [`Clearance`] when the application is stopped
pub fn clear_to_mutate(profile: &ApplicationProfile, probe: &dyn ProcessProbe) -> Result<Clearance, CleanError> {
    match probe.is_running(profile) {
        Some(false) => {
            tracing::debug!("{} is not running", profile.display_name);
            Ok(Clearance {
                application: profile.name.clone(),
            })
        }
        Some(true) => {
            tracing::warn!("{} is running; refusing to continue", profile.display_name);
            Err(CleanError::ApplicationRunning {
                app: profile.display_name.clone(),
            })
        }
        None => {
            tracing::warn!("Could not determine whether {} is running", profile.display_name);
            Err(CleanError::LivenessUnknown {
                app: profile.display_name.clone(),
            })
        }
    }
}
