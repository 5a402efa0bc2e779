//! Stage 2: recover `n` polylines (one per trace row) from a binarised
//! chart by tracing connected ink clusters column by column (spec.md §4.2).

use crate::error::DigitizationError;
use crate::geometry::Point;
use crate::image::Image;
use crate::peaks::find_peaks;

const ROI_WINDOW: u32 = 10;
const ROI_DISTANCE_FRACTION: f64 = 0.1;

/// A maximal run of consecutive black pixels in one column, stored as its
/// inclusive row range.
pub type Cluster = (i64, i64);

fn cluster_mean(c: Cluster) -> f64 {
    (c.0 + c.1) as f64 / 2.0
}

/// One DP record: the row this cluster was assigned, the predecessor node
/// it was reached from, the path length so far, and its cumulative cost.
#[derive(Clone, Copy)]
struct Cell {
    y: i64,
    predecessor: Option<(usize, usize)>,
    length: u32,
    score: f64,
}

pub struct SignalExtractor {
    n: usize,
}

impl SignalExtractor {
    pub fn new(n: usize) -> Self {
        SignalExtractor { n }
    }

    pub fn extract_signals(&self, ecg: &Image) -> Result<Vec<Vec<Point>>, DigitizationError> {
        let width = ecg.width() as usize;
        let rois = self.get_roi(ecg)?;

        // cache[col][cluster_index_in_col] -> per-roi Cell, lazily populated.
        let clusters_by_col: Vec<Vec<Cluster>> = (0..width).map(|c| self.get_clusters(ecg, c as u32)).collect();
        let mut cache: Vec<Vec<Vec<Option<Cell>>>> = (0..width)
            .map(|c| vec![vec![None; self.n]; clusters_by_col[c].len()])
            .collect();

        // Each column is processed only against its literal predecessor
        // `col - 1`. When that column has no clusters, `col`'s own turn is
        // skipped entirely — its cache entries stay unset and only appear
        // later, lazily, the first time some future column references them
        // as a predecessor (spec.md §4.2.4). A column reached this way
        // always restarts (length 1, score 0) rather than bridging back
        // through the gap to whatever was last populated.
        for col in 1..width {
            if clusters_by_col[col - 1].is_empty() {
                continue;
            }
            for cluster_idx in 0..clusters_by_col[col].len() {
                let c = clusters_by_col[col][cluster_idx];
                for roi_i in 0..self.n {
                    let mut best_prev: Option<usize> = None;
                    let mut best_cost = f64::INFINITY;
                    for pc_idx in 0..clusters_by_col[col - 1].len() {
                        let pc = clusters_by_col[col - 1][pc_idx];
                        let prev_score = match &cache[col - 1][pc_idx][roi_i] {
                            Some(cell) => cell.score,
                            None => {
                                // Lazy init: a predecessor with no cached
                                // state yet starts fresh at its own cluster
                                // centre, length 1, score 0.
                                let ctr = cluster_mean(pc).ceil() as i64;
                                cache[col - 1][pc_idx][roi_i] =
                                    Some(Cell { y: ctr, predecessor: None, length: 1, score: 0.0 });
                                0.0
                            }
                        };
                        let ctr = cluster_mean(pc).ceil() as i64;
                        let d = (ctr - rois[roi_i]).abs() as f64;
                        let g = gap(pc, c) as f64;
                        let cost = prev_score + d + (width as f64 / 10.0) * g;
                        if cost < best_cost {
                            best_cost = cost;
                            best_prev = Some(pc_idx);
                        }
                    }
                    let pc_idx = best_prev.expect("col - 1 has at least one cluster");
                    let prev_cell = cache[col - 1][pc_idx][roi_i].expect("lazily initialised above");
                    let y = cluster_mean(clusters_by_col[col - 1][pc_idx]).ceil() as i64;
                    cache[col][cluster_idx][roi_i] = Some(Cell {
                        y,
                        predecessor: Some((col - 1, pc_idx)),
                        length: prev_cell.length + 1,
                        score: best_cost,
                    });
                }
            }
        }

        Ok(self.backtrack(&cache, &clusters_by_col, &rois))
    }

    /// 10-row sliding-window standard deviation peaks, spaced at least
    /// `0.1 * height` apart, tallest-`n` kept and returned sorted top-to-bottom.
    fn get_roi(&self, ecg: &Image) -> Result<Vec<i64>, DigitizationError> {
        let (w, h) = (ecg.width(), ecg.height());
        let window = ROI_WINDOW.min(h);
        let shift = (window.saturating_sub(1)) / 2;
        let mut stds = vec![0.0f64; h as usize];
        if h >= window {
            for i in 0..=(h - window) {
                let mut values = Vec::with_capacity((window * w) as usize);
                for row in i..(i + window) {
                    for col in 0..w {
                        values.push(ecg.gray(row, col) as f64);
                    }
                }
                stds[(i + shift) as usize] = stddev(&values);
            }
        }
        let min_distance = (h as f64 * ROI_DISTANCE_FRACTION) as usize;
        let mut peak_idx = find_peaks(&stds, Some(min_distance));
        peak_idx.sort_by(|&a, &b| stds[b].partial_cmp(&stds[a]).unwrap_or(std::cmp::Ordering::Equal));
        if peak_idx.len() < self.n {
            return Err(DigitizationError::RoiCount(format!(
                "expected {} regions of interest, found {}",
                self.n,
                peak_idx.len()
            )));
        }
        peak_idx.truncate(self.n);
        peak_idx.sort_unstable();
        Ok(peak_idx.into_iter().map(|i| i as i64).collect())
    }

    fn get_clusters(&self, ecg: &Image, col: u32) -> Vec<Cluster> {
        const BLACK: u8 = 0;
        let mut clusters = Vec::new();
        let mut run_start: Option<i64> = None;
        let h = ecg.height();
        for row in 0..h {
            let is_black = ecg.gray(row, col) == BLACK;
            match (is_black, run_start) {
                (true, None) => run_start = Some(row as i64),
                (false, Some(s)) => {
                    clusters.push((s, row as i64 - 1));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = run_start {
            clusters.push((s, h as i64 - 1));
        }
        clusters
    }

    fn backtrack(
        &self,
        cache: &[Vec<Vec<Option<Cell>>>],
        clusters_by_col: &[Vec<Cluster>],
        rois: &[i64],
    ) -> Vec<Vec<Point>> {
        let mut signals = Vec::with_capacity(self.n);
        for roi_i in 0..self.n {
            let roi = rois[roi_i];

            let mut max_len = 0u32;
            for col in 0..cache.len() {
                for cluster_idx in 0..cache[col].len() {
                    if let Some(cell) = cache[col][cluster_idx][roi_i] {
                        max_len = max_len.max(cell.length);
                    }
                }
            }

            let mut best_node: Option<(usize, usize)> = None;
            let mut best_dist = i64::MAX;
            for col in 0..cache.len() {
                for cluster_idx in 0..cache[col].len() {
                    if let Some(cell) = cache[col][cluster_idx][roi_i] {
                        if cell.length == max_len {
                            let ctr = cluster_mean(clusters_by_col[col][cluster_idx]).ceil() as i64;
                            let dist = (ctr - roi).abs();
                            if dist < best_dist {
                                best_dist = dist;
                                best_node = Some((col, cluster_idx));
                            }
                        }
                    }
                }
            }

            let mut points = Vec::new();
            let mut clusters_on_path = Vec::new();
            let mut cur = best_node;
            while let Some((col, cluster_idx)) = cur {
                let cell = cache[col][cluster_idx][roi_i].expect("node reachable from max-length search");
                points.push(Point::new(col as i64, cell.y));
                clusters_on_path.push(clusters_by_col[col][cluster_idx]);
                cur = cell.predecessor;
            }
            points.reverse();
            clusters_on_path.reverse();

            let roi_dist: Vec<f64> = points.iter().map(|p| (p.y - roi).abs() as f64).collect();
            let correction_peaks = find_peaks(&roi_dist, None);
            for p in correction_peaks {
                if p == 0 {
                    continue;
                }
                let cluster = clusters_on_path[p - 1];
                let farthest = if (cluster.0 - roi).abs() >= (cluster.1 - roi).abs() { cluster.0 } else { cluster.1 };
                points[p] = Point::new(points[p].x, farthest);
            }

            signals.push(points);
        }
        signals
    }
}

/// Vertical whitespace between two clusters: 0 when adjacent/overlapping,
/// the row count strictly between them otherwise.
fn gap(pc: Cluster, c: Cluster) -> i64 {
    let (pc_min, pc_max) = pc;
    let (c_min, c_max) = c;
    if pc_min <= c_min && pc_max <= c_max {
        (c_min - pc_max - 1).max(0)
    } else if pc_min >= c_min && pc_max >= c_max {
        (pc_min - c_max - 1).max(0)
    } else {
        0
    }
}

fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colorspace::ColorSpace;

    fn gray_image(w: u32, h: u32, fill: u8) -> Image {
        Image::new(w, h, ColorSpace::Gray, vec![fill; (w * h) as usize])
    }

    #[test]
    fn gap_is_zero_for_adjacent_clusters() {
        assert_eq!(gap((0, 5), (6, 10)), 0);
    }

    #[test]
    fn gap_counts_rows_strictly_between() {
        assert_eq!(gap((0, 5), (10, 15)), 4);
    }

    #[test]
    fn get_clusters_finds_one_run() {
        let mut img = gray_image(4, 20, 255);
        for row in 8..12 {
            img.set_gray(row, 1, 0);
        }
        let extractor = SignalExtractor::new(1);
        let clusters = extractor.get_clusters(&img, 1);
        assert_eq!(clusters, vec![(8, 11)]);
    }

    #[test]
    fn too_few_rois_is_an_error() {
        let img = gray_image(50, 50, 255);
        let extractor = SignalExtractor::new(3);
        let err = extractor.get_roi(&img).unwrap_err();
        assert_eq!(err.kind(), "RoiCountError");
    }

    #[test]
    fn lazy_init_restarts_path_after_a_skipped_column() {
        // A column with zero ink anywhere (col 1) splits the chart: column 2
        // is only ever reachable as col1's successor, and col1 is empty, so
        // column 2's own turn is skipped and its cache is filled lazily —
        // fresh, length 1 — the first time column 3 looks it up. The
        // resulting path must start at column 2, not bridge back to column 0.
        let mut img = gray_image(6, 40, 255);
        for col in [0u32, 2, 3, 4, 5] {
            for row in 19..=21 {
                img.set_gray(row, col, 0);
            }
        }
        let extractor = SignalExtractor::new(1);
        let signals = extractor.extract_signals(&img).expect("should trace");
        assert_eq!(signals.len(), 1);
        let xs: Vec<i64> = signals[0].iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![2, 3, 4, 5], "path must restart at column 2, not include column 0 across the gap");
    }

    #[test]
    fn traces_a_single_flat_line() {
        let mut img = gray_image(30, 40, 255);
        for col in 0..30 {
            img.set_gray(20, col, 0);
        }
        // Give the ROI detector something non-uniform to latch onto near row 20.
        for col in 0..30 {
            img.set_gray(19, col, 0);
            img.set_gray(21, col, 0);
        }
        let extractor = SignalExtractor::new(1);
        let signals = extractor.extract_signals(&img).expect("should trace");
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].len(), 30);
        for p in &signals[0] {
            assert!((p.y - 20).abs() <= 1);
        }
    }
}
