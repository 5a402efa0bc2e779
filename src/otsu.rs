//! Otsu's thresholding (Otsu 1979): the single intensity threshold that
//! maximises between-class variance of a 256-bin intensity histogram.
//!
//! Implemented directly from the formula in SPEC_FULL.md rather than via
//! `imageproc::contrast::otsu_level`, since the spec pins an exact
//! between-class-variance formula (and its boundary handling) that a
//! generic library routine isn't guaranteed to reproduce bit-for-bit.

use crate::image::Image;

const LEVELS: usize = 256;

/// Compute the Otsu threshold `k*` for a GRAY image.
pub fn threshold(img: &Image) -> u8 {
    let mut hist = [0u64; LEVELS];
    for &v in img.data() {
        hist[v as usize] += 1;
    }
    threshold_from_histogram(&hist)
}

/// Same computation, taking a precomputed 256-bin histogram directly (useful
/// for testing the formula in isolation from image decoding).
pub fn threshold_from_histogram(hist: &[u64; LEVELS]) -> u8 {
    let n: f64 = hist.iter().sum::<u64>() as f64;
    let p: Vec<f64> = hist.iter().map(|&c| c as f64 / n).collect();

    // omega(k) = sum_{i<k} p[i]; mu(k) = sum_{i<k} (i+1)*p[i]
    let mut omega = vec![0.0; LEVELS + 1];
    let mut mu = vec![0.0; LEVELS + 1];
    for k in 0..LEVELS {
        omega[k + 1] = omega[k] + p[k];
        mu[k + 1] = mu[k] + (k as f64 + 1.0) * p[k];
    }
    let mu_t = mu[LEVELS];

    let mut best_k = 0usize;
    let mut best_sigma = f64::MIN;
    for k in 0..LEVELS {
        let w = omega[k];
        let sigma_b = if w == 0.0 || w == 1.0 {
            0.0
        } else {
            (mu_t * w - mu[k]).powi(2) / (w * (1.0 - w))
        };
        if sigma_b > best_sigma {
            best_sigma = sigma_b;
            best_k = k;
        }
    }
    best_k as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colorspace::ColorSpace;

    #[test]
    fn bimodal_histogram_splits_near_midpoint() {
        // Dense cluster near 10, dense cluster near 240: threshold should
        // land cleanly between them.
        let mut data = Vec::new();
        for _ in 0..100 {
            data.push(10u8);
        }
        for _ in 0..100 {
            data.push(240u8);
        }
        let img = Image::new(200, 1, ColorSpace::Gray, data);
        let k = threshold(&img);
        assert!(k > 10 && k < 240, "threshold {k} should split the two clusters");
    }

    #[test]
    fn uniform_histogram_is_deterministic() {
        let mut hist = [0u64; LEVELS];
        for h in hist.iter_mut() {
            *h = 1;
        }
        // Just assert it doesn't panic and returns a valid level.
        let k = threshold_from_histogram(&hist);
        assert!((k as usize) < LEVELS);
    }
}
