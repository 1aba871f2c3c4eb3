use std::collections::HashMap;
use std::path::PathBuf;

use super::loader::{ApplicationProfile, Platform};
use crate::common::safety;

/// Source of environment variables and the home directory.
///
/// Path templates are expanded against this rather than the process
/// environment so resolution can be exercised with a fixed map.
pub trait Environment {
    fn var(&self, name: &str) -> Option<String>;
    fn home_dir(&self) -> Option<PathBuf>;
}

/// The real process environment
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }
}

/// A fixed environment
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }
}

impl Environment for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).filter(|v| !v.is_empty()).cloned()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Expand `~`, `$VAR`, `${VAR}` and `%VAR%` in a template.
///
/// Returns `None` when the template references anything the environment
/// does not define; such templates are skipped, not reported as errors.
/// A `%` not closing a valid variable name is kept literally.
pub fn expand_template(template: &str, env: &dyn Environment) -> Option<String> {
    let mut out = String::with_capacity(template.len());

    let rest = if template == "~" || template.starts_with("~/") || template.starts_with("~\\") {
        out.push_str(&env.home_dir()?.to_string_lossy());
        &template[1..]
    } else {
        template
    };

    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '$' if chars.get(i + 1) == Some(&'{') => {
                let close = chars[i + 2..].iter().position(|&c| c == '}')? + i + 2;
                let name: String = chars[i + 2..close].iter().collect();
                out.push_str(&env.var(&name)?);
                i = close + 1;
            }
            '$' if chars.get(i + 1).is_some_and(|&c| is_ident(c)) => {
                let len = chars[i + 1..].iter().take_while(|&&c| is_ident(c)).count();
                let name: String = chars[i + 1..i + 1 + len].iter().collect();
                out.push_str(&env.var(&name)?);
                i += 1 + len;
            }
            '%' => {
                let close = chars[i + 1..].iter().position(|&c| c == '%').map(|p| p + i + 1);
                match close {
                    Some(close) if close > i + 1 && chars[i + 1..close].iter().all(|&c| is_ident(c)) => {
                        let name: String = chars[i + 1..close].iter().collect();
                        out.push_str(&env.var(&name)?);
                        i = close + 1;
                    }
                    _ => {
                        out.push('%');
                        i += 1;
                    }
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Some(out)
}

fn has_wildcard(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// Resolve an application's data directories on `platform`.
///
/// Only existing absolute directories are returned, deduplicated by
/// canonical path, in template order. An empty result means the
/// application is not installed.
pub fn resolve(profile: &ApplicationProfile, platform: Platform, env: &dyn Environment) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();

    for template in profile.templates(platform) {
        let expanded = match expand_template(template, env) {
            Some(e) => e,
            None => {
                tracing::debug!("Skipping template {} (undefined variable)", template);
                continue;
            }
        };

        let candidates: Vec<PathBuf> = if has_wildcard(&expanded) {
            match glob::glob(&expanded) {
                Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
                Err(e) => {
                    tracing::warn!("Bad glob pattern {}: {}", expanded, e);
                    continue;
                }
            }
        } else {
            vec![PathBuf::from(&expanded)]
        };

        for candidate in candidates {
            if !candidate.is_absolute() || !candidate.is_dir() {
                continue;
            }
            let canonical = std::fs::canonicalize(&candidate).unwrap_or(candidate);
            if safety::is_protected(&canonical) {
                tracing::warn!("Ignoring protected path from template {}: {}", template, canonical.display());
                continue;
            }
            if !roots.contains(&canonical) {
                roots.push(canonical);
            }
        }
    }

    tracing::debug!("Resolved {} roots for {}", roots.len(), profile.name);
    roots
}
