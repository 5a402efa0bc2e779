//! Stage 1: locate the chart rectangle inside the page and binarise it,
//! separating ink from the printed grid (spec.md §4.1).

use crate::colorspace::ColorSpace;
use crate::contours::largest_bounding_rect;
use crate::error::DigitizationError;
use crate::geometry::Rectangle;
use crate::image::Image;
use crate::otsu;
use imageproc::edges::canny;

/// HSV value-channel threshold for keeping ink over the printed grid.
/// Hard-coded in the reference system, tuned for one paper style; exposed
/// here as a constant rather than threaded through `Configuration` so it
/// keeps matching behaviour bit-for-bit, per the open question in
/// SPEC_FULL.md/spec.md §9.
pub const GRIDLINE_VALUE_THRESHOLD: u8 = 168;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 200.0;
const BORDER_WIDTH: u32 = 10;
const BORDER_BLACK_FRACTION: f64 = 0.95;
const GAP_BRIDGE_FRACTION: f64 = 0.02;

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Preprocessor
    }

    /// Locate the chart, crop to it, and binarise. Returns the binarised
    /// GRAY image plus the crop rectangle in original-page coordinates.
    pub fn preprocess(&self, ecg: &Image) -> Result<(Image, Rectangle), DigitizationError> {
        let rect = self.localize_chart(ecg)?;
        let cropped = ecg.crop(&rect);
        let binarized = self.remove_gridlines(&cropped);
        Ok((binarized, rect))
    }

    /// Canny edges -> external contours -> 1%-arc-length polygon
    /// approximation -> bounding rects -> the largest by area.
    pub fn localize_chart(&self, ecg: &Image) -> Result<Rectangle, DigitizationError> {
        let bgr = ecg.to_bgr();
        let gray = bgr.to_gray_image();
        let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);
        largest_bounding_rect(&edges)
            .ok_or_else(|| DigitizationError::ImageFormat("no contours found while locating the chart".to_string()))
    }

    /// HSV value-channel masking, Otsu binarisation, and border/gap cleanup.
    pub fn remove_gridlines(&self, cropped: &Image) -> Image {
        let hsv = cropped.to_hsv();

        // The in-range mask itself — 255 where the pixel's HSV value clears
        // the threshold (paper), 0 otherwise (gridline ink, or anything else
        // masked out) — is the working image handed to Otsu, per spec.md
        // §4.1 ("the mask alone ... is retained as the working image").
        // Graying the *masked colour* instead would let a high-V,
        // low-luminance gridline pixel fall back under Otsu's threshold and
        // reappear as ink.
        let (w, h) = (cropped.width(), cropped.height());
        let mut mask_gray = Image::new(w, h, ColorSpace::Gray, vec![0u8; (w * h) as usize]);
        for row in 0..h {
            for col in 0..w {
                let v = hsv.pixel(row, col)[2];
                if v >= GRIDLINE_VALUE_THRESHOLD {
                    mask_gray.set_gray(row, col, 255);
                }
            }
        }

        let k = otsu::threshold(&mask_gray);
        let binarized = mask_gray.threshold(k, 255);

        self.outline_borders(binarized)
    }

    /// Wipe thick scanned-in black margins off the first/last 10 rows and
    /// columns, then bridge small horizontal ink gaps on the topmost and
    /// bottommost ink-bearing rows.
    fn outline_borders(&self, mut ecg: Image) -> Image {
        let (w, h) = (ecg.width(), ecg.height());
        const BLACK: u8 = 0;
        const WHITE: u8 = 255;

        let border_rows: Vec<u32> = (0..BORDER_WIDTH.min(h))
            .chain((h.saturating_sub(BORDER_WIDTH))..h)
            .collect();
        for row in border_rows {
            if ecg.gray_row_fraction(row, BLACK) >= BORDER_BLACK_FRACTION {
                ecg.fill_gray_row(row, WHITE);
            }
        }
        let border_cols: Vec<u32> = (0..BORDER_WIDTH.min(w))
            .chain((w.saturating_sub(BORDER_WIDTH))..w)
            .collect();
        for col in border_cols {
            if ecg.gray_col_fraction(col, BLACK) >= BORDER_BLACK_FRACTION {
                ecg.fill_gray_col(col, WHITE);
            }
        }

        self.bridge_extreme_row_gaps(&mut ecg);
        ecg
    }

    fn bridge_extreme_row_gaps(&self, ecg: &mut Image) {
        const BLACK: u8 = 0;
        let (w, h) = (ecg.width(), ecg.height());
        let ink_rows: Vec<u32> = (0..h).filter(|&r| ecg.gray_row(r).iter().any(|&v| v == BLACK)).collect();
        let Some(&top) = ink_rows.first() else { return };
        let bottom = *ink_rows.last().unwrap();
        let max_dist = (GAP_BRIDGE_FRACTION * w as f64) as i64;

        for row in [top, bottom] {
            let ink_cols: Vec<i64> =
                (0..w).filter(|&c| ecg.gray(row, c) == BLACK).map(|c| c as i64).collect();
            for pair in ink_cols.windows(2) {
                let (p1, p2) = (pair[0], pair[1]);
                if (p2 - p1).abs() <= max_dist {
                    for c in p1..=p2 {
                        ecg.set_gray(row, c as u32, BLACK);
                    }
                }
            }
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
