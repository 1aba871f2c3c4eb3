use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::common::config::Config;

/// Operating system family that selects a profile's path templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Darwin,
    Linux,
}

impl Platform {
    /// Platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Darwin => write!(f, "darwin"),
            Platform::Linux => write!(f, "linux"),
        }
    }
}

/// Ordered path templates per platform
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlatformPaths {
    #[serde(default)]
    pub windows: Vec<String>,
    #[serde(default)]
    pub darwin: Vec<String>,
    #[serde(default)]
    pub linux: Vec<String>,
}

/// An application whose per-user state can be cleaned.
///
/// Built-in profiles cover Cursor and Windsurf; more can be added as
/// `<data_dir>/profiles/<name>.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationProfile {
    pub name: String,

    pub display_name: String,

    /// Process names the liveness check looks for
    #[serde(default)]
    pub process_names: Vec<String>,

    pub paths: PlatformPaths,
}

impl ApplicationProfile {
    /// Templates for one platform, in priority order
    pub fn templates(&self, platform: Platform) -> &[String] {
        match platform {
            Platform::Windows => &self.paths.windows,
            Platform::Darwin => &self.paths.darwin,
            Platform::Linux => &self.paths.linux,
        }
    }

    /// Load a profile by name
    pub fn load(name: &str) -> Result<Self> {
        Self::load_from_dir(&Config::profiles_dir(), name)
    }

    /// Load a profile by name, looking for user profiles in `dir`
    pub fn load_from_dir(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{}.toml", name));
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read profile: {}", path.display()))?;
            let profile: ApplicationProfile = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse profile: {}", path.display()))?;
            if profile.process_names.is_empty() {
                tracing::warn!(
                    "Profile {} lists no process_names; its running state cannot be checked",
                    path.display()
                );
            }
            return Ok(profile);
        }

        if let Some(profile) = builtin_profile(name) {
            return Ok(profile);
        }

        anyhow::bail!(
            "Application '{}' not found. Available: {}",
            name,
            Self::available_in(dir).join(", ")
        )
    }

    /// Every known profile, built-ins first
    pub fn all() -> Result<Vec<Self>> {
        let dir = Config::profiles_dir();
        Self::available_in(&dir)
            .iter()
            .map(|name| Self::load_from_dir(&dir, name))
            .collect()
    }

    /// List all available profile names
    pub fn available() -> Vec<String> {
        Self::available_in(&Config::profiles_dir())
    }

    fn available_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN.iter().map(|s| s.to_string()).collect();

        // Add user profiles
        if let Ok(entries) = std::fs::read_dir(dir) {
            let mut extra: Vec<String> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|x| x == "toml"))
                .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
                .filter(|n| !names.contains(n))
                .collect();
            extra.sort();
            names.extend(extra);
        }

        names
    }
}

const BUILTIN: &[&str] = &["cursor", "windsurf"];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Built-in profile definitions
fn builtin_profile(name: &str) -> Option<ApplicationProfile> {
    match name {
        "cursor" => Some(ApplicationProfile {
            name: "cursor".into(),
            display_name: "Cursor".into(),
            process_names: strings(&["Cursor"]),
            paths: PlatformPaths {
                windows: strings(&[
                    "%APPDATA%/Cursor",
                    "%LOCALAPPDATA%/Cursor",
                    "%APPDATA%/cursor-ai",
                    "%LOCALAPPDATA%/cursor-ai",
                ]),
                darwin: strings(&[
                    "~/Library/Application Support/Cursor",
                    "~/Library/Application Support/cursor-ai",
                ]),
                linux: strings(&[
                    "${XDG_CONFIG_HOME}/Cursor",
                    "~/.config/Cursor",
                    "~/.config/cursor-ai",
                ]),
            },
        }),

        "windsurf" => Some(ApplicationProfile {
            name: "windsurf".into(),
            display_name: "Windsurf".into(),
            process_names: strings(&["Windsurf"]),
            paths: PlatformPaths {
                windows: strings(&[
                    "%APPDATA%/Windsurf",
                    "%LOCALAPPDATA%/Windsurf",
                    "%APPDATA%/windsurf-ai",
                    "%LOCALAPPDATA%/windsurf-ai",
                    "%APPDATA%/Codeium/Windsurf",
                    "%LOCALAPPDATA%/Codeium/Windsurf",
                ]),
                darwin: strings(&[
                    "~/Library/Application Support/Windsurf",
                    "~/Library/Application Support/windsurf-ai",
                    "~/Library/Application Support/Codeium/Windsurf",
                ]),
                linux: strings(&[
                    "${XDG_CONFIG_HOME}/Windsurf",
                    "~/.config/Windsurf",
                    "~/.config/windsurf-ai",
                    "~/.config/Codeium/Windsurf",
                ]),
            },
        }),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtins_have_every_platform() {
        for name in BUILTIN {
            let p = builtin_profile(name).unwrap();
            assert!(!p.process_names.is_empty());
            for platform in [Platform::Windows, Platform::Darwin, Platform::Linux] {
                assert!(!p.templates(platform).is_empty(), "{} {}", name, platform);
            }
        }
    }

    #[test]
    fn test_user_profile_overrides_and_extends() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("vscodium.toml"),
            r#"
name = "vscodium"
display_name = "VSCodium"
process_names = ["codium"]

[paths]
linux = ["~/.config/VSCodium"]
"#,
        )
        .unwrap();

        let p = ApplicationProfile::load_from_dir(dir.path(), "vscodium").unwrap();
        assert_eq!(p.display_name, "VSCodium");
        assert!(p.templates(Platform::Windows).is_empty());
        assert_eq!(
            ApplicationProfile::available_in(dir.path()),
            vec!["cursor", "windsurf", "vscodium"]
        );
    }

    #[test]
    fn test_unknown_profile_errors() {
        let dir = TempDir::new().unwrap();
        let err = ApplicationProfile::load_from_dir(dir.path(), "emacs").unwrap_err();
        assert!(err.to_string().contains("cursor"));
    }
}
