use colored::*;
use std::path::Path;

use crate::scanner::targets::StoreKind;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable byte count (`512 B`, `1.5 KB`, `3.25 MB`)
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    match unit {
        0 => format!("{} B", bytes),
        1 => format!("{:.1} {}", value, UNITS[unit]),
        _ => format!("{:.2} {}", value, UNITS[unit]),
    }
}

/// Size colored by how much state it represents
pub fn format_size_colored(bytes: u64) -> ColoredString {
    const MB: u64 = 1024 * 1024;
    let s = format_size(bytes);
    match bytes {
        b if b >= 500 * MB => s.red().bold(),
        b if b >= 50 * MB => s.yellow(),
        _ => s.normal(),
    }
}

/// Display a path with the home directory shortened to `~`
pub fn format_path(path: &Path) -> String {
    dirs::home_dir()
        .and_then(|home| path.strip_prefix(home).ok().map(|rel| format!("~/{}", rel.display())))
        .unwrap_or_else(|| path.display().to_string())
}

/// `1 record`, `3 records`
pub fn format_entries(count: u64, noun: &str) -> String {
    let plural = if count == 1 { "" } else { "s" };
    format!("{} {}{}", count, noun, plural)
}

pub fn format_duration(secs: f64) -> String {
    if secs >= 60.0 {
        let whole = secs.round() as u64;
        format!("{}m {}s", whole / 60, whole % 60)
    } else if secs >= 1.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}

pub fn format_kind(kind: &StoreKind) -> ColoredString {
    let label = kind.to_string();
    match kind {
        StoreKind::KvStore => label.cyan(),
        StoreKind::Document => label.green(),
        StoreKind::CacheDir => label.yellow(),
        StoreKind::Unknown => label.red(),
    }
}

/// Timestamp component of snapshot directory names
pub fn format_stamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y%m%d_%H%M%S").to_string()
}

pub fn print_header(title: &str) {
    println!();
    println!("  {}", title.bold());
    println!("{}", "─".repeat(60).dimmed());
}

pub fn print_kv(key: &str, value: &str) {
    println!("  {:<12} {}", format!("{}:", key).dimmed(), value);
}

/// Shorten to `max_len` characters, keeping the end (the file name
/// is the informative part of a path)
pub fn truncate(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let tail: String = s.chars().skip(len - (max_len - 3)).collect();
    format!("...{}", tail)
}
