//! Runs many digitisations across a worker pool, isolating each file's
//! failure from the rest of the batch (spec.md §5) — the ambient
//! replacement for the excluded GUI's dispatch-to-thread-pool model. Mirrors
//! the reference system's per-path try/except-and-continue loop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use rayon::prelude::*;

use crate::config::Configuration;
use crate::error::DigitizationError;
use crate::metadata::MetadataExtractor;
use crate::pipeline;

/// The outcome of digitising one file: `Ok(())` on success, the path and
/// the error that stopped it otherwise.
pub type BatchResult = (PathBuf, Option<DigitizationError>);

/// Digitise every path in `inputs`, writing outputs under `output_dir`.
/// Runs on rayon's global pool (size it with `RAYON_NUM_THREADS` or a
/// `rayon::ThreadPoolBuilder` scope around the call). `cancel` is checked
/// between items only — a digitisation already in flight always runs to
/// completion, matching §5's "runs to completion" rule.
pub fn run(
    inputs: &[PathBuf],
    output_dir: &Path,
    config: &Configuration,
    metadata_extractor: Option<&(dyn MetadataExtractor + Sync)>,
    cancel: Arc<AtomicBool>,
) -> Vec<BatchResult> {
    inputs
        .par_iter()
        .map(|path| {
            if cancel.load(Ordering::Relaxed) {
                warn!("batch cancelled, skipping {path:?}");
                return (path.clone(), None);
            }
            match pipeline::digitize_path(path, output_dir, config, metadata_extractor) {
                Ok(()) => (path.clone(), None),
                Err(e) => {
                    error!("{} ({:?})", e, path.file_name().unwrap_or_default());
                    (path.clone(), Some(e))
                }
            }
        })
        .collect()
}

/// Summarise a batch's outcome the way a CLI caller wants to print it.
pub fn log_summary(results: &[BatchResult]) {
    let failed = results.iter().filter(|(_, err)| err.is_some()).count();
    info!("{} of {} files digitized successfully", results.len() - failed, results.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_before_start_skips_every_item() {
        let inputs = vec![PathBuf::from("/nonexistent/a.png"), PathBuf::from("/nonexistent/b.png")];
        let cancel = Arc::new(AtomicBool::new(true));
        let cfg = crate::config::Configuration::new(
            crate::config::Layout::new(3, 4),
            vec![],
            false,
            false,
            None,
        )
        .unwrap();
        let results = run(&inputs, Path::new("/tmp/nonexistent-output"), &cfg, None, cancel);
        assert!(results.iter().all(|(_, err)| err.is_none()));
    }
}
