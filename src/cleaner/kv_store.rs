use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use super::engine::{IdentifierSet, KeyReset, MutationRecord};
use super::matcher;
use crate::common::config::CleaningOptions;
use crate::common::errors::CleanError;
use crate::scanner::targets::StoreKind;

/// How long to wait for another process' lock before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Quote an SQLite identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// User tables in the database, in schema order
pub fn user_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Tables having both a `key` and a `value` column (VS Code's `ItemTable` shape)
pub fn key_value_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut tables = Vec::new();
    for table in user_tables(conn)? {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(&table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));
        if has("key") && has("value") {
            tables.push(table);
        }
    }
    Ok(tables)
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn map_err(path: &Path) -> impl Fn(rusqlite::Error) -> CleanError + '_ {
    move |e| {
        if is_busy(&e) {
            CleanError::StoreBusy {
                path: path.to_path_buf(),
            }
        } else if matches!(
            &e,
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(err.code, ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase)
        ) {
            CleanError::StoreCorrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        } else {
            CleanError::Sqlite {
                path: path.to_path_buf(),
                source: e,
            }
        }
    }
}

fn text_of(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(b) | ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Null => None,
    }
}

/// Apply identifier reset, record purge and cache-table clearing to one
/// SQLite store.
///
/// Every edit runs inside a single `IMMEDIATE` transaction. When nothing
/// changes the transaction is rolled back and the file is left untouched.
pub fn apply(
    path: &Path,
    options: &CleaningOptions,
    ids: &IdentifierSet,
) -> Result<MutationRecord, CleanError> {
    let err = map_err(path);
    let size_before = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    let mut conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(&err)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(&err)?;

    let mut record = MutationRecord::new(path, StoreKind::KvStore);

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(&err)?;

    let kv_tables = key_value_tables(&tx).map_err(&err)?;

    for table in &kv_tables {
        let t = quote_ident(table);

        // Identifier reset; only rows whose value actually differs
        for key in &options.telemetry_keys {
            let value = ids.value_for(key);
            let changed = tx
                .execute(
                    &format!("UPDATE {t} SET value = ?1 WHERE key = ?2 AND (value IS NULL OR value <> ?1)"),
                    rusqlite::params![value, key],
                )
                .map_err(&err)?;
            if changed > 0 {
                tracing::info!("Reset {} in {}:{}", key, path.display(), table);
                record.keys_reset.push(KeyReset {
                    key: key.clone(),
                    table: Some(table.clone()),
                    value: value.to_string(),
                });
            }
        }

        for key in &options.session_keys {
            let removed = tx
                .execute(&format!("DELETE FROM {t} WHERE key = ?1"), [key])
                .map_err(&err)?;
            if removed > 0 {
                tracing::info!("Removed {} from {}:{}", key, path.display(), table);
                record.keys_removed.push(key.clone());
            }
        }

        // Record purge. Freshly reset identifiers are exempt.
        let mut doomed: Vec<Value> = Vec::new();
        {
            let mut stmt = tx
                .prepare(&format!("SELECT key, value FROM {t}"))
                .map_err(&err)?;
            let mut rows = stmt.query([]).map_err(&err)?;
            while let Some(row) = rows.next().map_err(&err)? {
                let raw_key = row.get_ref(0).map_err(&err)?;
                let key = match text_of(raw_key) {
                    Some(k) => k,
                    None => continue,
                };
                if options.telemetry_keys.iter().any(|k| *k == key) {
                    continue;
                }
                let value = text_of(row.get_ref(1).map_err(&err)?);
                if matcher::key_matches(&key, value.as_deref(), &options.purge_keywords, options.match_policy) {
                    doomed.push(raw_key.into());
                }
            }
        }

        for key in &doomed {
            let deleted = tx
                .execute(&format!("DELETE FROM {t} WHERE key = ?1"), [key])
                .map_err(&err)?;
            record.records_deleted += deleted as u64;
        }
        if !doomed.is_empty() {
            tracing::info!(
                "Purged {} records from {}:{}",
                doomed.len(),
                path.display(),
                table
            );
        }
    }

    for table in user_tables(&tx).map_err(&err)? {
        if kv_tables.contains(&table) || !matcher::table_matches(&table, &options.cache_table_patterns) {
            continue;
        }
        let cleared = tx
            .execute(&format!("DELETE FROM {}", quote_ident(&table)), [])
            .map_err(&err)?;
        if cleared > 0 {
            tracing::info!("Cleared table {} ({} rows) in {}", table, cleared, path.display());
            record.records_deleted += cleared as u64;
            record.tables_cleared.push(table);
        }
    }

    if !record.changed() {
        tx.rollback().map_err(&err)?;
        tracing::debug!("No changes needed in {}", path.display());
        return Ok(record);
    }

    tx.commit().map_err(&err)?;

    // Reclaim space; the edit itself is already durable
    if let Err(e) = conn.execute_batch("VACUUM") {
        tracing::warn!("VACUUM failed on {}: {}", path.display(), e);
    }
    drop(conn);

    let size_after = std::fs::metadata(path).map(|m| m.len()).unwrap_or(size_before);
    record.bytes_freed = size_before.saturating_sub(size_after);

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir, rows: &[(&str, &str)]) -> std::path::PathBuf {
        let path = dir.path().join("state.vscdb");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);")
            .unwrap();
        for (k, v) in rows {
            conn.execute("INSERT INTO ItemTable (key, value) VALUES (?1, ?2)", [k, v])
                .unwrap();
        }
        path
    }

    fn options(keywords: &[&str]) -> CleaningOptions {
        CleaningOptions {
            purge_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            ..CleaningOptions::default()
        }
    }

    fn value_of(path: &Path, key: &str) -> Option<String> {
        let conn = Connection::open(path).unwrap();
        conn.query_row("SELECT value FROM ItemTable WHERE key = ?1", [key], |r| r.get(0))
            .ok()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("ItemTable"), "\"ItemTable\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_key_value_tables_detects_shape() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ItemTable (key TEXT, value BLOB);
             CREATE TABLE Other (KEY TEXT, VALUE TEXT);
             CREATE TABLE plain (id INTEGER);",
        )
        .unwrap();
        assert_eq!(key_value_tables(&conn).unwrap(), vec!["ItemTable", "Other"]);
    }

    #[test]
    fn test_reset_and_remove() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, &[("telemetry.machineId", "abc"), ("authToken", "t"), ("theme", "dark")]);
        let ids = IdentifierSet::generate();

        let record = apply(&path, &options(&[]), &ids).unwrap();
        assert_eq!(record.keys_reset.len(), 1);
        assert_eq!(record.keys_removed, vec!["authToken"]);
        assert_eq!(value_of(&path, "telemetry.machineId").unwrap(), ids.machine);
        assert!(value_of(&path, "authToken").is_none());
        assert_eq!(value_of(&path, "theme").unwrap(), "dark");
    }

    #[test]
    fn test_noop_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, &[("theme", "dark")]);
        let before = std::fs::read(&path).unwrap();

        let record = apply(&path, &options(&["session"]), &IdentifierSet::generate()).unwrap();
        assert!(!record.changed());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_cache_tables_cleared() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, &[("theme", "dark")]);
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE extension_cache (id INTEGER, blob TEXT);
                 INSERT INTO extension_cache VALUES (1, 'a'), (2, 'b');",
            )
            .unwrap();
        }

        let record = apply(&path, &options(&[]), &IdentifierSet::generate()).unwrap();
        assert_eq!(record.tables_cleared, vec!["extension_cache"]);
        assert_eq!(record.records_deleted, 2);
    }

    #[test]
    fn test_busy_store_reported() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, &[("authToken", "t")]);

        let holder = Connection::open(&path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let err = apply(&path, &options(&[]), &IdentifierSet::generate()).unwrap_err();
        assert!(matches!(err, CleanError::StoreBusy { .. }));

        holder.execute_batch("ROLLBACK;").unwrap();
        assert_eq!(value_of(&path, "authToken").unwrap(), "t");
    }
}
