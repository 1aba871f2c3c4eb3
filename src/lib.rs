//! # statewipe
//!
//! Safe, reversible cleanup of the per-user state that Cursor and Windsurf
//! keep on disk.
//!
//! A run resolves the application's data directories, classifies the stores
//! found there, and takes a checksum-verified snapshot of every store it will
//! touch. Only then does it reset telemetry identifiers, remove session and
//! token records, and empty caches. Every snapshot carries its own restore
//! scripts and can be replayed with `statewipe restore`.
//!
//! Nothing is mutated while the application is running, and nothing is
//! mutated without a verified backup of that exact path.

pub mod apps;
pub mod cleaner;
pub mod cli;
pub mod common;
pub mod profiles;
pub mod scanner;
