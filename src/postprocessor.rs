//! Stage 3: split the traced polylines into calibration pulses and 12 lead
//! signals, scale to millivolts, resample, and render a diagnostic overlay
//! (spec.md §4.3).

use crate::config::Configuration;
use crate::error::DigitizationError;
use crate::geometry::Point;
use crate::image::Image;
use crate::sampletable::{round4, SampleTable};

const PIXEL_EPS: i64 = 5;
const DASH_SPACE: u32 = 20;

const PALETTE: [[u8; 3]; 12] = [
    [0, 0, 255],
    [0, 255, 0],
    [255, 0, 0],
    [0, 200, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 0, 125],
    [0, 125, 0],
    [125, 0, 0],
    [0, 100, 125],
    [125, 125, 0],
    [125, 0, 125],
];

pub struct Postprocessor {
    config: Configuration,
}

impl Postprocessor {
    pub fn new(config: Configuration) -> Self {
        Postprocessor { config }
    }

    pub fn postprocess(
        &self,
        raw_signals: &[Vec<Point>],
        ecg_crop: &Image,
    ) -> Result<(SampleTable, Image), DigitizationError> {
        let (signals, ref_pulses) = self.segment_calibration(raw_signals);
        let table = self.resample_and_scale(&signals, &ref_pulses)?;
        let trace = self.render_overlay(ecg_crop, &signals, &ref_pulses);
        Ok((table, trace))
    }

    /// Find where the calibration pulse block ends (or begins, if printed at
    /// the right) by walking the traces from the pulse side inward, looking
    /// for the point where every trace stops sitting near its own baseline.
    pub fn segment_calibration(&self, raw_signals: &[Vec<Point>]) -> (Vec<Vec<Point>>, Vec<(i64, i64)>) {
        #[derive(PartialEq, Clone, Copy)]
        enum State {
            Ini,
            Mid,
            End,
        }

        let limit = raw_signals.iter().map(|s| s.len()).min().unwrap_or(0);
        // v0 sits at the row's outermost column: the last column when the
        // pulse is printed at the right, the first otherwise (spec.md §4.3.1).
        let baseline_y: Vec<i64> = raw_signals
            .iter()
            .map(|s| if self.config.rp_at_right { s.last().unwrap().y } else { s.first().unwrap().y })
            .collect();

        let direction: Vec<i64> = if self.config.rp_at_right {
            (1..limit as i64).map(|k| -k).collect()
        } else {
            (0..limit as i64).collect()
        };

        let mut state = State::Ini;
        let mut ini_count: i64 = 0;
        let mut cut: i64 = 0;

        for &i in &direction {
            let y_coords: Vec<i64> = raw_signals
                .iter()
                .zip(baseline_y.iter())
                .map(|(signal, &base)| point_at(signal, i).y - base)
                .collect();
            let at_v0 = y_coords.iter().any(|&y| y.abs() <= PIXEL_EPS);
            let break_symmetry = state == State::End && (!at_v0 || ini_count <= 0);
            if break_symmetry {
                cut = i;
                break;
            }
            match state {
                State::Ini => {
                    if at_v0 {
                        ini_count += 1;
                    } else {
                        state = State::Mid;
                    }
                }
                State::Mid => {
                    if at_v0 {
                        state = State::End;
                        ini_count -= 1;
                    }
                }
                State::End => {
                    ini_count -= 1;
                }
            }
            cut = i;
        }

        let signals: Vec<Vec<Point>> = raw_signals
            .iter()
            .map(|rs| {
                if self.config.rp_at_right {
                    py_slice(rs, None, Some(cut + 1))
                } else {
                    py_slice(rs, Some(cut), None)
                }
            })
            .collect();

        let ref_pulses: Vec<(i64, i64)> = raw_signals
            .iter()
            .enumerate()
            .map(|(idx, rs)| {
                let slice = if self.config.rp_at_right {
                    py_slice(rs, Some(cut + 1), None)
                } else {
                    py_slice(rs, None, Some(cut + 1))
                };
                let mut ys: Vec<i64> = slice.iter().map(|p| p.y).collect();
                ys.sort_unstable_by(|a, b| b.cmp(a));
                let volt_1 = *ys.last().unwrap_or(&baseline_y[idx]);
                (baseline_y[idx], volt_1)
            })
            .collect();

        (signals, ref_pulses)
    }

    /// Pad to a multiple of the panel's column count (or `interpolation` if
    /// set), linearly resample every trace row to that length, slice by
    /// lead position, and scale pixel rows to millivolts via the pulses.
    pub fn resample_and_scale(
        &self,
        signals: &[Vec<Point>],
        ref_pulses: &[(i64, i64)],
    ) -> Result<SampleTable, DigitizationError> {
        let nrows = self.config.layout.rows as usize;
        let ncols = self.config.layout.cols as usize;
        let order = self.config.lead_order();

        let max_len = signals.iter().map(|s| s.len()).max().unwrap_or(0);
        let max_diff = max_len % ncols;
        let max_pad = if max_diff == 0 { 0 } else { ncols - max_diff };
        let total_obs = self.config.interpolation.map(|n| n as usize).unwrap_or(max_len + max_pad);

        let interp_signals: Vec<Vec<f64>> = signals
            .iter()
            .map(|s| {
                let ys: Vec<f64> = s.iter().map(|p| p.y as f64).collect();
                resample_linear(&ys, total_obs)
            })
            .collect();

        let mut table = SampleTable::new(total_obs);
        for (i, &lead) in order.iter().enumerate() {
            let rhythm_pos = self.config.rhythm.iter().position(|&l| l == lead);
            let (r, c) = match rhythm_pos {
                Some(pos) => (pos + nrows, 0),
                None => (i % nrows, i / nrows),
            };

            let (volt_0, volt_1) = ref_pulses[r];
            if volt_0 == volt_1 {
                return Err(DigitizationError::Calibration(
                    "reference pulses have not been detected correctly".to_string(),
                ));
            }

            let signal = &interp_signals[r];
            let obs_num = signal.len() / if rhythm_pos.is_some() { 1 } else { ncols };
            let part = &signal[c * obs_num..(c + 1) * obs_num];
            let (v0, v1) = (volt_0 as f64, volt_1 as f64);
            let mut scaled: Vec<f64> = part.iter().map(|&y| round4((v0 - y) / (v0 - v1))).collect();
            if self.config.cabrera && lead == crate::lead::Lead::AVR {
                for v in scaled.iter_mut() {
                    *v = -*v;
                }
            }
            table.set_slice(lead, c * obs_num, &scaled);
        }
        Ok(table)
    }

    /// Diagnostic overlay: dashed calibration-pulse lines plus one
    /// distinctly-coloured polyline per lead, drawn over the binarised crop.
    pub fn render_overlay(&self, ecg: &Image, signals: &[Vec<Point>], ref_pulses: &[(i64, i64)]) -> Image {
        let nrows = self.config.layout.rows as usize;
        let ncols = self.config.layout.cols as usize;
        let order = self.config.lead_order();

        let mut trace = ecg.copy().to_bgr();

        for &(volt_0, volt_1) in ref_pulses {
            trace.draw_dashed_hline(volt_0, &[0, 0, 0], DASH_SPACE / 2, DASH_SPACE);
            trace.draw_dashed_hline(volt_1, &[0, 0, 0], DASH_SPACE / 2, DASH_SPACE);
        }

        for (i, &lead) in order.iter().enumerate() {
            let rhythm_pos = self.config.rhythm.iter().position(|&l| l == lead);
            let (r, c) = match rhythm_pos {
                Some(pos) => (pos + nrows, 0),
                None => (i % nrows, i / nrows),
            };
            let signal = &signals[r];
            let obs_num = signal.len() / if rhythm_pos.is_some() { 1 } else { ncols };
            let part = &signal[c * obs_num..(c + 1) * obs_num];
            let color = PALETTE[i % PALETTE.len()];
            for pair in part.windows(2) {
                trace.draw_line(pair[0], pair[1], &color, 2);
            }
        }
        trace
    }
}

/// Python-style negative indexing: resolve `i` (possibly negative) against
/// `len`, clamping to a valid index.
fn resolve_index(i: i64, len: usize) -> i64 {
    if i < 0 {
        len as i64 + i
    } else {
        i
    }
}

fn point_at(signal: &[Point], i: i64) -> Point {
    let idx = resolve_index(i, signal.len()).clamp(0, signal.len() as i64 - 1);
    signal[idx as usize]
}

/// Python-style `list[start:end]` slicing with optional negative bounds.
fn py_slice(v: &[Point], start: Option<i64>, end_excl: Option<i64>) -> Vec<Point> {
    let len = v.len() as i64;
    let s = start.map(|i| resolve_index(i, v.len())).unwrap_or(0).clamp(0, len);
    let e = end_excl.map(|i| resolve_index(i, v.len())).unwrap_or(len).clamp(0, len);
    if e <= s {
        Vec::new()
    } else {
        v[s as usize..e as usize].to_vec()
    }
}

/// Resample `values` (indices 0..len-1) to `total_obs` points via linear
/// interpolation over `linspace(0, len - 1, total_obs)`.
fn resample_linear(values: &[f64], total_obs: usize) -> Vec<f64> {
    let len = values.len();
    if len == 1 || total_obs <= 1 {
        return vec![values[0]; total_obs];
    }
    let step = (len - 1) as f64 / (total_obs - 1) as f64;
    (0..total_obs)
        .map(|i| {
            let x = i as f64 * step;
            let lo = x.floor() as usize;
            let hi = (lo + 1).min(len - 1);
            let frac = x - lo as f64;
            values[lo] * (1.0 - frac) + values[hi] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;

    /// A single-row, `cols`-wide layout: every lead shares trace row 0, so
    /// tests only need to supply one signal / one reference pulse.
    fn single_row_cfg(cols: u32, rp_at_right: bool, cabrera: bool) -> Configuration {
        Configuration::new(Layout::new(1, cols), vec![], rp_at_right, cabrera, None).unwrap()
    }

    #[test]
    fn resample_linear_preserves_endpoints() {
        let values = vec![0.0, 10.0, 20.0];
        let out = resample_linear(&values, 5);
        assert_eq!(out.first().copied(), Some(0.0));
        assert_eq!(out.last().copied(), Some(20.0));
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn resample_linear_single_sample_is_constant() {
        let out = resample_linear(&[7.0], 4);
        assert_eq!(out, vec![7.0, 7.0, 7.0, 7.0]);
    }

    #[test]
    fn py_slice_handles_negative_bounds() {
        let pts: Vec<Point> = (0..10).map(|x| Point::new(x, 0)).collect();
        let tail = py_slice(&pts, Some(-3), None);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].x, 7);
    }

    #[test]
    fn equal_calibration_pulses_is_a_calibration_error() {
        let post = Postprocessor::new(single_row_cfg(12, false, false));
        let signal = vec![Point::new(0, 50); 20];
        let ref_pulses = vec![(50, 50)];
        let err = post.resample_and_scale(&[signal], &ref_pulses).unwrap_err();
        assert_eq!(err.kind(), "CalibrationError");
    }

    #[test]
    fn scales_voltage_by_reference_pulses() {
        let post = Postprocessor::new(single_row_cfg(12, false, false));
        // volt_0=100 (0 mV), volt_1=0 (1 mV); a flat trace at y=50 should read 0.5.
        let signal: Vec<Point> = (0..12).map(|x| Point::new(x, 50)).collect();
        let table = post.resample_and_scale(&[signal], &[(100, 0)]).unwrap();
        // Lead I is the first of the 12 slots sharing trace row 0, so it
        // lands at column-position 0.
        assert!((table.column(crate::lead::Lead::I)[0] - 0.5).abs() < 1e-9);
    }

    /// A row carrying a baseline segment, a calibration pulse, a single
    /// baseline return column, then a waveform — shaped so
    /// `segment_calibration` finds a clean cut right after the pulse.
    fn row_with_pulse() -> Vec<Point> {
        let mut pts = Vec::new();
        for x in 0..10 {
            pts.push(Point::new(x, 50)); // baseline, before the pulse
        }
        for x in 10..20 {
            pts.push(Point::new(x, 30)); // elevated plateau
        }
        pts.push(Point::new(20, 50)); // one column back at baseline
        for x in 21..40 {
            // gentle monotone ramp standing in for the waveform
            let y = 40 + (x - 21) / 2;
            pts.push(Point::new(x, y));
        }
        pts
    }

    #[test]
    fn cabrera_inverts_only_avr_other_leads_bitwise_equal() {
        // All 12 physical rows carry identical data, so which physical row
        // feeds a given lead (which differs between STANDARD and CABRERA
        // ordering) cannot change that lead's values — only the explicit
        // aVR sign flip should show up as a difference (spec.md §8).
        let raw_signals: Vec<Vec<Point>> = (0..12).map(|_| row_with_pulse()).collect();

        let cfg_std = Configuration::new(Layout::new(12, 1), vec![], false, false, None).unwrap();
        let cfg_cab = Configuration::new(Layout::new(12, 1), vec![], false, true, None).unwrap();

        let post_std = Postprocessor::new(cfg_std);
        let (signals, pulses) = post_std.segment_calibration(&raw_signals);
        let table_std = post_std.resample_and_scale(&signals, &pulses).unwrap();

        let post_cab = Postprocessor::new(cfg_cab);
        let table_cab = post_cab.resample_and_scale(&signals, &pulses).unwrap();

        for &lead in &crate::lead::Lead::STANDARD {
            let std_col = table_std.column(lead);
            let cab_col = table_cab.column(lead);
            if lead == crate::lead::Lead::AVR {
                for (s, c) in std_col.iter().zip(cab_col.iter()) {
                    assert!((s + c).abs() < 1e-9, "aVR should be exactly negated under cabrera");
                }
            } else {
                assert_eq!(std_col, cab_col, "{lead:?} should be bitwise unaffected by cabrera");
            }
        }
    }

    #[test]
    fn segment_calibration_splits_pulse_from_waveform() {
        let post = Postprocessor::new(single_row_cfg(1, false, false));
        let raw = vec![row_with_pulse()];
        let (signals, pulses) = post.segment_calibration(&raw);

        let (v0, v1) = pulses[0];
        assert_eq!(v0, 50, "baseline is the row's first (outermost, left) column");
        assert_eq!(v1, 30, "v1 is the highest point (min y) of the pulse plateau");
        assert!(signals[0].len() < raw[0].len(), "waveform is shorter than the raw row once the pulse is sliced off");
    }
}
