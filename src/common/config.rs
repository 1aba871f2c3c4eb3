use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that relocates the statewipe data directory
pub const HOME_ENV: &str = "STATEWIPE_HOME";

/// Global statewipe configuration.
///
/// Loaded once at startup and passed by reference into every component;
/// nothing in the library reads it from ambient state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub cleaning: CleaningOptions,

    #[serde(default)]
    pub backup: BackupOptions,

    #[serde(default)]
    pub safety: SafetyOptions,
}

/// How record-purge keywords are matched against a row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Only the row key is inspected
    #[default]
    KeyOnly,
    /// Key or value may match
    KeyAndValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleaningOptions {
    /// Identifier keys whose values are replaced with fresh UUIDs
    #[serde(default = "default_telemetry_keys")]
    pub telemetry_keys: Vec<String>,

    /// Session/token keys that are removed outright
    #[serde(default = "default_session_keys")]
    pub session_keys: Vec<String>,

    /// Keywords for record purge (case-insensitive substring, any-of)
    #[serde(default = "default_purge_keywords")]
    pub purge_keywords: Vec<String>,

    #[serde(default)]
    pub match_policy: MatchPolicy,

    /// Directory names (or root-relative paths) treated as opaque caches
    #[serde(default = "default_cache_directories")]
    pub cache_directories: Vec<String>,

    /// Tables cleared entirely when their name contains one of these
    #[serde(default = "default_cache_table_patterns")]
    pub cache_table_patterns: Vec<String>,

    #[serde(default = "default_kv_extensions")]
    pub kv_extensions: Vec<String>,

    #[serde(default = "default_document_extensions")]
    pub document_extensions: Vec<String>,

    /// Recreate emptied cache directories so the app finds its mount points
    #[serde(default = "default_true")]
    pub recreate_cache_dirs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupOptions {
    /// Backup root; defaults to `<data_dir>/backups`
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Also write a zip archive of each verified snapshot
    #[serde(default)]
    pub compression: bool,

    /// Complete snapshots older than this are eligible for purge
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Refuse to back up more than this many MB in one snapshot
    #[serde(default = "default_max_total_mb")]
    pub max_total_mb: u64,

    #[serde(default = "default_true")]
    pub create_restore_script: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyOptions {
    #[serde(default = "default_true")]
    pub check_running_processes: bool,

    #[serde(default = "default_true")]
    pub require_confirmation: bool,
}

fn default_true() -> bool {
    true
}
fn default_retention_days() -> u32 {
    30
}
fn default_max_total_mb() -> u64 {
    4096
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_telemetry_keys() -> Vec<String> {
    strings(&[
        "machineId",
        "telemetry.machineId",
        "telemetryMachineId",
        "telemetry.macMachineId",
        "deviceId",
        "telemetry.devDeviceId",
        "telemetry.deviceId",
        "lastSessionId",
        "sessionId",
        "installationId",
        "sqmUserId",
        "sqmMachineId",
        "telemetry.sqmId",
    ])
}
fn default_session_keys() -> Vec<String> {
    strings(&[
        "lastSessionDate",
        "sessionStartTime",
        "userSession",
        "authToken",
        "accessToken",
        "refreshToken",
    ])
}
fn default_purge_keywords() -> Vec<String> {
    strings(&["augment", "account", "session", "login", "auth", "token"])
}
fn default_cache_directories() -> Vec<String> {
    strings(&[
        "IndexedDB",
        "Local Storage",
        "Session Storage",
        "Cache",
        "Code Cache",
        "GPUCache",
        "blob_storage",
        "CachedData",
        "CachedExtensions",
        "logs",
        "User/workspaceStorage",
        "User/History",
    ])
}
fn default_cache_table_patterns() -> Vec<String> {
    strings(&["cache", "session", "temp", "log"])
}
fn default_kv_extensions() -> Vec<String> {
    strings(&["vscdb", "db", "sqlite", "sqlite3"])
}
fn default_document_extensions() -> Vec<String> {
    strings(&["json"])
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            telemetry_keys: default_telemetry_keys(),
            session_keys: default_session_keys(),
            purge_keywords: default_purge_keywords(),
            match_policy: MatchPolicy::KeyOnly,
            cache_directories: default_cache_directories(),
            cache_table_patterns: default_cache_table_patterns(),
            kv_extensions: default_kv_extensions(),
            document_extensions: default_document_extensions(),
            recreate_cache_dirs: true,
        }
    }
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            root: None,
            compression: false,
            retention_days: default_retention_days(),
            max_total_mb: default_max_total_mb(),
            create_restore_script: true,
        }
    }
}

impl Default for SafetyOptions {
    fn default() -> Self {
        Self {
            check_running_processes: true,
            require_confirmation: true,
        }
    }
}

impl BackupOptions {
    /// Size limit in bytes
    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_mb.saturating_mul(1024 * 1024)
    }
}

impl Config {
    /// Get the statewipe data directory (~/.statewipe, or $STATEWIPE_HOME)
    pub fn data_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".statewipe")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Get the logs directory
    pub fn logs_dir() -> PathBuf {
        Self::data_dir().join("logs")
    }

    /// Get the user profiles directory
    pub fn profiles_dir() -> PathBuf {
        Self::data_dir().join("profiles")
    }

    /// Effective backup root for this configuration
    pub fn backup_root(&self) -> PathBuf {
        self.backup
            .root
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("backups"))
    }

    /// Load config from the default location, or defaults if it does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a specific file, or defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Initialize all statewipe directories
    pub fn init_dirs(&self) -> Result<()> {
        let dirs = [
            Self::data_dir(),
            Self::logs_dir(),
            Self::profiles_dir(),
            self.backup_root(),
        ];
        for dir in &dirs {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}
