use crate::common::config::MatchPolicy;

/// Whether a record should be purged.
///
/// A record matches when any keyword is a case-insensitive substring of
/// its key. Under [`MatchPolicy::KeyAndValue`] the value is inspected too.
/// Empty keywords never match.
pub fn key_matches(key: &str, value: Option<&str>, keywords: &[String], policy: MatchPolicy) -> bool {
    let key = key.to_lowercase();
    let value = match policy {
        MatchPolicy::KeyOnly => None,
        MatchPolicy::KeyAndValue => value.map(str::to_lowercase),
    };

    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .any(|k| key.contains(&k) || value.as_deref().is_some_and(|v| v.contains(&k)))
}

/// Whether a table should be cleared wholesale
pub fn table_matches(table: &str, patterns: &[String]) -> bool {
    key_matches(table, None, patterns, MatchPolicy::KeyOnly)
}
