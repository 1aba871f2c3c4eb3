pub mod classify;
pub mod targets;
pub mod walker;

use std::path::PathBuf;
use std::time::Instant;

use crate::common::config::CleaningOptions;
use crate::common::progress::Progress;
use targets::ScanResults;

/// Main scan entry point - walks every resolved root and classifies stores.
///
/// Read-only and repeatable; per-file failures degrade that entry to
/// `unknown` and never abort the scan.
pub fn run_scan(roots: &[PathBuf], options: &CleaningOptions, show_progress: bool) -> ScanResults {
    let start = Instant::now();
    let mut results = ScanResults::new();
    results.roots = roots.to_vec();

    let progress = Progress::spinner(show_progress, "stores scanned");

    for root in roots {
        tracing::debug!("Scanning {}", root.display());
        walker::walk_root(root, options, &progress, &mut results);
    }

    progress.finish();

    results.recalculate();
    results.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Scanned {} roots: {} stores, {} bytes",
        roots.len(),
        results.stores.len(),
        results.total_bytes
    );

    results
}
