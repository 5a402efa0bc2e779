//! A minimal 1-D peak finder, standing in for `scipy.signal.find_peaks`
//! (spec.md explicitly allows "any SciPy-equivalent implementation").
//!
//! Used twice by the extractor: once to locate the N loudest rows for ROI
//! anchoring (with a minimum inter-peak distance), and once, undistanced,
//! to find the excursions in a polyline's distance-to-ROI series that need
//! peak-delineation correction.

/// Indices of local maxima in `values`, optionally thinned so that no two
/// returned peaks are closer than `distance` samples (ties broken by
/// keeping the taller peak, scipy's `distance` semantics).
///
/// A flat-topped maximum is reported at the midpoint of its plateau.
pub fn find_peaks(values: &[f64], distance: Option<usize>) -> Vec<usize> {
    let n = values.len();
    if n < 3 {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    let mut i = 1;
    while i < n - 1 {
        if values[i - 1] < values[i] {
            let mut j = i;
            while j < n - 1 && values[j] == values[j + 1] {
                j += 1;
            }
            if j < n - 1 && values[j + 1] < values[j] {
                candidates.push((i + j) / 2);
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }

    match distance {
        None | Some(0) | Some(1) => candidates,
        Some(d) => thin_by_distance(&candidates, values, d),
    }
}

/// Greedily keep the tallest peaks first, dropping any candidate within
/// `distance` samples of an already-kept, taller peak.
fn thin_by_distance(candidates: &[usize], values: &[f64], distance: usize) -> Vec<usize> {
    let mut order: Vec<usize> = candidates.to_vec();
    order.sort_by(|&a, &b| values[b].partial_cmp(&values[a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<usize> = Vec::new();
    for idx in order {
        let too_close = kept.iter().any(|&k| k.abs_diff(idx) < distance);
        if !too_close {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_simple_peak() {
        let v = [0.0, 1.0, 3.0, 1.0, 0.0];
        assert_eq!(find_peaks(&v, None), vec![2]);
    }

    #[test]
    fn flat_top_reports_midpoint() {
        let v = [0.0, 1.0, 3.0, 3.0, 3.0, 1.0, 0.0];
        assert_eq!(find_peaks(&v, None), vec![3]);
    }

    #[test]
    fn distance_drops_the_shorter_neighbor() {
        let v = [0.0, 5.0, 0.0, 0.0, 6.0, 0.0];
        assert_eq!(find_peaks(&v, Some(4)), vec![4]);
    }

    #[test]
    fn no_peaks_in_monotone_series() {
        let v = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert!(find_peaks(&v, None).is_empty());
    }
}
