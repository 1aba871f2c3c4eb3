use rusqlite::{Connection, OpenFlags};
use std::io::Read;
use std::path::Path;

use super::targets::{DiscoveredStore, StoreKind};
use crate::cleaner::kv_store;
use crate::common::config::CleaningOptions;
use crate::common::errors::CleanError;

/// First 16 bytes of every SQLite database file
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Classify a single file.
///
/// Returns `None` for files that are neither key-value stores nor
/// documents by extension. Files that claim to be one but fail the
/// sniff come back as `Unknown` with the reason in `note`.
pub fn classify_file(
    path: &Path,
    root: &Path,
    options: &CleaningOptions,
) -> Option<DiscoveredStore> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    let sniffed = if has_extension(&options.kv_extensions, &ext) {
        Some(sniff_kv_store(path).map(|rows| (StoreKind::KvStore, rows)))
    } else if has_extension(&options.document_extensions, &ext) {
        Some(sniff_document(path).map(|keys| (StoreKind::Document, keys)))
    } else {
        None
    }?;

    let (kind, entry_count, note) = match sniffed {
        Ok((kind, count)) => (kind, Some(count), None),
        Err(e) => {
            tracing::debug!("Degrading {} to unknown: {}", path.display(), e);
            (StoreKind::Unknown, None, Some(e.to_string()))
        }
    };

    Some(DiscoveredStore {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
        kind,
        size_bytes,
        entry_count,
        note,
    })
}

fn has_extension(list: &[String], ext: &str) -> bool {
    list.iter().any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Confirm a file is a well-formed SQLite database and count its key/value rows.
/// Opens the file read-only; never writes.
pub fn sniff_kv_store(path: &Path) -> Result<u64, CleanError> {
    let mut header = [0u8; 16];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map_err(|e| CleanError::StoreCorrupt {
            path: path.to_path_buf(),
            message: format!("cannot read header: {}", e),
        })?;

    if &header != SQLITE_HEADER {
        return Err(CleanError::StoreCorrupt {
            path: path.to_path_buf(),
            message: "missing SQLite header".into(),
        });
    }

    let corrupt = |e: rusqlite::Error| CleanError::StoreCorrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(corrupt)?;

    let mut rows = 0u64;
    for table in kv_store::key_value_tables(&conn).map_err(corrupt)? {
        let sql = format!("SELECT COUNT(*) FROM {}", kv_store::quote_ident(&table));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0)).map_err(corrupt)?;
        rows += count.max(0) as u64;
    }

    Ok(rows)
}

/// Confirm a file is a UTF-8 JSON object and count its top-level keys
pub fn sniff_document(path: &Path) -> Result<u64, CleanError> {
    let contents = std::fs::read_to_string(path).map_err(|e| CleanError::StoreCorrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    match serde_json::from_str::<serde_json::Value>(&contents) {
        Ok(serde_json::Value::Object(map)) => Ok(map.len() as u64),
        Ok(_) => Err(CleanError::StoreCorrupt {
            path: path.to_path_buf(),
            message: "document is not a key/value object".into(),
        }),
        Err(e) => Err(CleanError::StoreCorrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}
