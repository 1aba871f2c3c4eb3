use serde_json::Value;
use std::path::{Path, PathBuf};

use super::engine::{IdentifierSet, KeyReset, MutationRecord};
use crate::common::config::CleaningOptions;
use crate::common::errors::CleanError;
use crate::scanner::targets::StoreKind;

/// Apply identifier reset to one JSON document.
///
/// Keys are matched at any nesting depth. The file is rewritten (2-space
/// indent, original key order) through a temp file and rename, and only
/// when something changed.
pub fn apply(
    path: &Path,
    options: &CleaningOptions,
    ids: &IdentifierSet,
) -> Result<MutationRecord, CleanError> {
    let contents = std::fs::read_to_string(path).map_err(|e| CleanError::io(path, e))?;
    let mut doc: Value = serde_json::from_str(&contents).map_err(|e| CleanError::StoreCorrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if !doc.is_object() {
        return Err(CleanError::StoreCorrupt {
            path: path.to_path_buf(),
            message: "document is not a key/value object".into(),
        });
    }

    let mut record = MutationRecord::new(path, StoreKind::Document);
    rewrite(&mut doc, options, ids, &mut record);

    if !record.changed() {
        tracing::debug!("No changes needed in {}", path.display());
        return Ok(record);
    }

    let json = serde_json::to_string_pretty(&doc).map_err(|e| CleanError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    write_atomic(path, json.as_bytes())?;

    record.bytes_freed = (contents.len() as u64).saturating_sub(json.len() as u64);
    tracing::info!(
        "Rewrote {}: {} reset, {} removed",
        path.display(),
        record.keys_reset.len(),
        record.keys_removed.len()
    );
    Ok(record)
}

fn rewrite(node: &mut Value, options: &CleaningOptions, ids: &IdentifierSet, record: &mut MutationRecord) {
    match node {
        Value::Object(map) => {
            for key in &options.session_keys {
                if map.shift_remove(key).is_some() {
                    record.keys_removed.push(key.clone());
                }
            }

            for key in &options.telemetry_keys {
                if let Some(slot) = map.get_mut(key) {
                    let fresh = ids.value_for(key);
                    if slot.as_str() != Some(fresh) {
                        *slot = Value::String(fresh.to_string());
                        record.keys_reset.push(KeyReset {
                            key: key.clone(),
                            table: None,
                            value: fresh.to_string(),
                        });
                    }
                }
            }

            for (key, child) in map.iter_mut() {
                if options.telemetry_keys.contains(key) {
                    continue;
                }
                rewrite(child, options, ids, record);
            }
        }
        Value::Array(items) => {
            for child in items {
                rewrite(child, options, ids, record);
            }
        }
        _ => {}
    }
}

/// Replace `path` with `bytes` via a sibling temp file, keeping permissions
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CleanError> {
    let tmp = temp_sibling(path);
    std::fs::write(&tmp, bytes).map_err(|e| CleanError::io(&tmp, e))?;
    if let Ok(meta) = std::fs::metadata(path) {
        let _ = std::fs::set_permissions(&tmp, meta.permissions());
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        CleanError::io(path, e)
    })
}

pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.statewipe-tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reset_nested_and_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(
            &path,
            r#"{"zeta": 1, "telemetry.machineId": "old", "nested": {"deviceId": "d", "authToken": "x"}, "alpha": true}"#,
        )
        .unwrap();
        let ids = IdentifierSet::generate();

        let record = apply(&path, &CleaningOptions::default(), &ids).unwrap();
        assert_eq!(record.keys_reset.len(), 2);
        assert_eq!(record.keys_removed, vec!["authToken"]);

        let text = std::fs::read_to_string(&path).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["telemetry.machineId"], ids.machine.as_str());
        assert_eq!(doc["nested"]["deviceId"], ids.machine.as_str());
        assert!(doc["nested"].get("authToken").is_none());

        // Key order and indentation preserved
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
        assert!(text.contains("\n  \"zeta\": 1"));
    }

    #[test]
    fn test_unchanged_document_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let original = "{\"editor.fontSize\":14}";
        std::fs::write(&path, original).unwrap();

        let record = apply(&path, &CleaningOptions::default(), &IdentifierSet::generate()).unwrap();
        assert!(!record.changed());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"machineId": "abc-123", "sessionStartTime": 5}"#).unwrap();
        let ids = IdentifierSet::generate();

        assert!(apply(&path, &CleaningOptions::default(), &ids).unwrap().changed());
        let once = std::fs::read(&path).unwrap();
        assert!(!apply(&path, &CleaningOptions::default(), &ids).unwrap().changed());
        assert_eq!(std::fs::read(&path).unwrap(), once);
    }

    #[test]
    fn test_non_object_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list.json");
        std::fs::write(&path, "[]").unwrap();
        let err = apply(&path, &CleaningOptions::default(), &IdentifierSet::generate()).unwrap_err();
        assert!(matches!(err, CleanError::StoreCorrupt { .. }));
    }
}
