//! Digitisation configuration: fixed for the lifetime of one invocation
//! (spec.md §3). Deliberately a plain, directly-constructed struct — the
//! reference system's Settings/GUI layer that populates this is out of
//! scope for the core.

use std::fs;
use std::path::Path;

use crate::lead::Lead;
use serde::{Deserialize, Serialize};

/// Grid layout of the main 12-lead panel: `(rows, cols)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub rows: u32,
    pub cols: u32,
}

impl Layout {
    pub fn new(rows: u32, cols: u32) -> Self {
        Layout { rows, cols }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub layout: Layout,
    /// Additional full-width rhythm strips, top to bottom. Must be empty
    /// when `layout.cols == 1`.
    pub rhythm: Vec<Lead>,
    /// True iff the calibration pulse is printed at the right-hand end of
    /// each row.
    pub rp_at_right: bool,
    /// True selects the Cabrera lead ordering and inverts aVR.
    pub cabrera: bool,
    /// If set, every lead is resampled to exactly this many observations.
    pub interpolation: Option<u32>,
}

impl Configuration {
    pub fn new(
        layout: Layout,
        rhythm: Vec<Lead>,
        rp_at_right: bool,
        cabrera: bool,
        interpolation: Option<u32>,
    ) -> Result<Self, String> {
        if layout.cols == 1 && !rhythm.is_empty() {
            return Err("rhythm strips must be empty when layout has a single column".to_string());
        }
        if let Some(n) = interpolation {
            if n == 0 {
                return Err("interpolation must be a positive observation count".to_string());
            }
        }
        Ok(Configuration { layout, rhythm, rp_at_right, cabrera, interpolation })
    }

    /// Number of trace rows the extractor must recover: the panel rows plus
    /// one per rhythm strip.
    pub fn trace_row_count(&self) -> usize {
        self.layout.rows as usize + self.rhythm.len()
    }

    pub fn lead_order(&self) -> &'static [Lead; 12] {
        if self.cabrera {
            &Lead::CABRERA
        } else {
            &Lead::STANDARD
        }
    }

    /// Load a configuration previously written by [`Configuration::save`].
    /// Re-validates the loaded struct so a hand-edited file can't smuggle
    /// in an invalid `rhythm`/`interpolation` combination.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("cannot read {path:?}: {e}"))?;
        let cfg: Configuration =
            serde_json::from_str(&text).map_err(|e| format!("parse error in {path:?}: {e}"))?;
        Configuration::new(cfg.layout, cfg.rhythm, cfg.rp_at_right, cfg.cabrera, cfg.interpolation)
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("cannot create dirs for {path:?}: {e}"))?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| format!("serialise error: {e}"))?;
        fs::write(path, text).map_err(|e| format!("cannot write {path:?}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_rhythm_with_single_column_layout() {
        let r = Configuration::new(Layout::new(12, 1), vec![Lead::II], false, false, None);
        assert!(r.is_err());
    }

    #[test]
    fn accepts_empty_rhythm_with_single_column_layout() {
        let r = Configuration::new(Layout::new(12, 1), vec![], true, false, None);
        assert!(r.is_ok());
        assert_eq!(r.unwrap().trace_row_count(), 12);
    }

    #[test]
    fn trace_row_count_adds_rhythm_strips() {
        let cfg = Configuration::new(Layout::new(3, 4), vec![Lead::II, Lead::V1], true, false, None).unwrap();
        assert_eq!(cfg.trace_row_count(), 5);
    }

    #[test]
    fn rejects_zero_interpolation() {
        let r = Configuration::new(Layout::new(3, 4), vec![], true, false, Some(0));
        assert!(r.is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let cfg = Configuration::new(Layout::new(6, 2), vec![Lead::II], true, true, Some(2500)).unwrap();
        let path = std::env::temp_dir().join(format!("ecg-digitizer-test-config-{:p}.json", &cfg));
        cfg.save(&path).unwrap();
        let loaded = Configuration::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.layout, cfg.layout);
        assert_eq!(loaded.rhythm, cfg.rhythm);
        assert_eq!(loaded.rp_at_right, cfg.rp_at_right);
        assert_eq!(loaded.cabrera, cfg.cabrera);
        assert_eq!(loaded.interpolation, cfg.interpolation);
    }

    #[test]
    fn load_rejects_an_invalid_saved_combination() {
        // Hand-write a file a caller could have edited into an invalid state.
        let path = std::env::temp_dir().join("ecg-digitizer-test-config-invalid.json");
        std::fs::write(
            &path,
            r#"{"layout":{"rows":12,"cols":1},"rhythm":["II"],"rp_at_right":true,"cabrera":false,"interpolation":null}"#,
        )
        .unwrap();
        let err = Configuration::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(err.is_err());
    }
}
