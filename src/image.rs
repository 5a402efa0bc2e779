//! Tagged raster image: a dense pixel buffer plus a [`ColorSpace`] label.
//!
//! Mirrors the reference system's `Image` class — one buffer, reinterpreted
//! as GRAY/BGR/RGB/HSV depending on a tag, with conversions dispatching on
//! the tag rather than through a class hierarchy (see the design note on
//! "polymorphism over colour space" in SPEC_FULL.md). Binary (post-Otsu)
//! images are GRAY with values drawn from {0 = ink, 255 = paper}.

use crate::colorspace::ColorSpace;
use crate::error::DigitizationError;
use crate::geometry::{Point, Rectangle};
use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};

#[derive(Debug, Clone)]
pub struct Image {
    width: u32,
    height: u32,
    space: ColorSpace,
    /// Row-major, `channels()` bytes per pixel.
    data: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, space: ColorSpace, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize) * space.channels());
        Image { width, height, space, data }
    }

    /// Decode a file from disk into a BGR image, matching the reference
    /// system's default colour space for freshly loaded rasters.
    pub fn open(path: &str) -> Result<Self, DigitizationError> {
        let dyn_img = image::open(path)
            .map_err(|e| DigitizationError::ImageFormat(format!("cannot decode '{path}': {e}")))?;
        Ok(Self::from_dynamic(&dyn_img))
    }

    pub fn from_dynamic(img: &DynamicImage) -> Self {
        let rgb = img.to_rgb8();
        let (w, h) = rgb.dimensions();
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for px in rgb.pixels() {
            // RGB -> BGR: swap channel order, same bytes.
            data.push(px[2]);
            data.push(px[1]);
            data.push(px[0]);
        }
        Image { width: w, height: h, space: ColorSpace::Bgr, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn space(&self) -> ColorSpace {
        self.space
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn channels(&self) -> usize {
        self.space.channels()
    }

    /// White pixel value(s) for the current colour space.
    pub fn white(&self) -> Vec<u8> {
        match self.space {
            ColorSpace::Gray => vec![255],
            ColorSpace::Hsv => vec![0, 0, 255],
            ColorSpace::Bgr | ColorSpace::Rgb => vec![255, 255, 255],
        }
    }

    /// Black pixel value(s) for the current colour space.
    pub fn black(&self) -> Vec<u8> {
        match self.space {
            ColorSpace::Gray => vec![0],
            ColorSpace::Hsv | ColorSpace::Bgr | ColorSpace::Rgb => vec![0, 0, 0],
        }
    }

    #[inline]
    fn offset(&self, row: u32, col: u32) -> usize {
        (row as usize * self.width as usize + col as usize) * self.channels()
    }

    /// Pixel at (row, col) as a channel slice.
    pub fn pixel(&self, row: u32, col: u32) -> &[u8] {
        let o = self.offset(row, col);
        &self.data[o..o + self.channels()]
    }

    pub fn set_pixel(&mut self, row: u32, col: u32, value: &[u8]) {
        let c = self.channels();
        let o = self.offset(row, col);
        self.data[o..o + c].copy_from_slice(value);
    }

    /// GRAY-only convenience accessor (most of the pipeline operates on
    /// single-channel binarised images after the preprocessor runs).
    pub fn gray(&self, row: u32, col: u32) -> u8 {
        debug_assert_eq!(self.channels(), 1);
        self.data[self.offset(row, col)]
    }

    pub fn set_gray(&mut self, row: u32, col: u32, value: u8) {
        debug_assert_eq!(self.channels(), 1);
        let o = self.offset(row, col);
        self.data[o] = value;
    }

    /// Contiguous GRAY row slice (valid only for single-channel images).
    pub fn gray_row(&self, row: u32) -> &[u8] {
        debug_assert_eq!(self.channels(), 1);
        let start = row as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }

    pub fn fill_gray_row(&mut self, row: u32, value: u8) {
        debug_assert_eq!(self.channels(), 1);
        let start = row as usize * self.width as usize;
        for v in &mut self.data[start..start + self.width as usize] {
            *v = value;
        }
    }

    pub fn fill_gray_col(&mut self, col: u32, value: u8) {
        for r in 0..self.height {
            self.set_gray(r, col, value);
        }
    }

    pub fn gray_col(&self, col: u32) -> Vec<u8> {
        (0..self.height).map(|r| self.gray(r, col)).collect()
    }

    /// Fraction of a GRAY row equal to `value`.
    pub fn gray_row_fraction(&self, row: u32, value: u8) -> f64 {
        let row_data = self.gray_row(row);
        row_data.iter().filter(|&&v| v == value).count() as f64 / row_data.len() as f64
    }

    pub fn gray_col_fraction(&self, col: u32, value: u8) -> f64 {
        let count = (0..self.height).filter(|&r| self.gray(r, col) == value).count();
        count as f64 / self.height as f64
    }

    pub fn copy(&self) -> Image {
        self.clone()
    }

    pub fn crop(&self, rect: &Rectangle) -> Image {
        let x0 = rect.top_left.x.max(0) as u32;
        let y0 = rect.top_left.y.max(0) as u32;
        let x1 = (rect.bottom_right.x as u32).min(self.width);
        let y1 = (rect.bottom_right.y as u32).min(self.height);
        let w = x1.saturating_sub(x0);
        let h = y1.saturating_sub(y0);
        let c = self.channels();
        let mut data = Vec::with_capacity((w * h) as usize * c);
        for row in y0..y1 {
            let start = self.offset(row, x0);
            data.extend_from_slice(&self.data[start..start + (w as usize) * c]);
        }
        Image { width: w, height: h, space: self.space, data }
    }

    /// Otsu/global threshold: pixels `<= k` become black, others become `value`.
    /// Operates on (and returns) a GRAY image.
    pub fn threshold(&self, k: u8, value: u8) -> Image {
        debug_assert_eq!(self.channels(), 1);
        let data = self.data.iter().map(|&p| if p <= k { 0 } else { value }).collect();
        Image { width: self.width, height: self.height, space: ColorSpace::Gray, data }
    }

    pub fn to_gray(&self) -> Image {
        match self.space {
            ColorSpace::Gray => self.clone(),
            ColorSpace::Bgr => self.map_channels(ColorSpace::Gray, |p| vec![bgr_to_gray(p[0], p[1], p[2])]),
            ColorSpace::Rgb => self.map_channels(ColorSpace::Gray, |p| vec![bgr_to_gray(p[2], p[1], p[0])]),
            ColorSpace::Hsv => {
                let bgr = self.to_bgr();
                bgr.to_gray()
            }
        }
    }

    pub fn to_bgr(&self) -> Image {
        match self.space {
            ColorSpace::Bgr => self.clone(),
            ColorSpace::Gray => self.map_channels(ColorSpace::Bgr, |p| vec![p[0], p[0], p[0]]),
            ColorSpace::Rgb => self.map_channels(ColorSpace::Bgr, |p| vec![p[2], p[1], p[0]]),
            ColorSpace::Hsv => self.map_channels(ColorSpace::Bgr, |p| {
                let (r, g, b) = hsv_to_rgb(p[0], p[1], p[2]);
                vec![b, g, r]
            }),
        }
    }

    pub fn to_rgb(&self) -> Image {
        match self.space {
            ColorSpace::Rgb => self.clone(),
            ColorSpace::Gray => self.map_channels(ColorSpace::Rgb, |p| vec![p[0], p[0], p[0]]),
            ColorSpace::Bgr => self.map_channels(ColorSpace::Rgb, |p| vec![p[2], p[1], p[0]]),
            ColorSpace::Hsv => self.map_channels(ColorSpace::Rgb, |p| {
                let (r, g, b) = hsv_to_rgb(p[0], p[1], p[2]);
                vec![r, g, b]
            }),
        }
    }

    pub fn to_hsv(&self) -> Image {
        match self.space {
            ColorSpace::Hsv => self.clone(),
            ColorSpace::Bgr => self.map_channels(ColorSpace::Hsv, |p| {
                let (h, s, v) = rgb_to_hsv(p[2], p[1], p[0]);
                vec![h, s, v]
            }),
            ColorSpace::Rgb => self.map_channels(ColorSpace::Hsv, |p| {
                let (h, s, v) = rgb_to_hsv(p[0], p[1], p[2]);
                vec![h, s, v]
            }),
            ColorSpace::Gray => self.to_bgr().to_hsv(),
        }
    }

    fn map_channels(&self, to: ColorSpace, f: impl Fn(&[u8]) -> Vec<u8>) -> Image {
        let from_c = self.channels();
        let to_c = to.channels();
        let pixels = (self.width as usize) * (self.height as usize);
        let mut data = Vec::with_capacity(pixels * to_c);
        for i in 0..pixels {
            let p = &self.data[i * from_c..i * from_c + from_c];
            data.extend_from_slice(&f(p));
        }
        Image { width: self.width, height: self.height, space: to, data }
    }

    /// A thick line segment, drawn with the given BGR/RGB triple (channel
    /// order follows the image's own colour space — the caller picks colours
    /// in whatever order the image is tagged with).
    pub fn draw_line(&mut self, p1: Point, p2: Point, color: &[u8], thickness: u32) {
        let c = self.channels();
        debug_assert_eq!(color.len(), c);
        let half = (thickness as i64) / 2;
        for (x, y) in bresenham(p1, p2) {
            for oy in -half..=half {
                for ox in -half..=half {
                    let px = x + ox;
                    let py = y + oy;
                    if px >= 0 && py >= 0 && (px as u32) < self.width && (py as u32) < self.height {
                        self.set_pixel(py as u32, px as u32, color);
                    }
                }
            }
        }
    }

    /// A horizontal dashed line made of `dash_len`-pixel segments spaced every
    /// `period` pixels, from `x=0` to the image width.
    pub fn draw_dashed_hline(&mut self, y: i64, color: &[u8], dash_len: u32, period: u32) {
        let mut x = 0i64;
        while x < self.width as i64 {
            let end = (x + dash_len as i64 - 1).min(self.width as i64 - 1);
            self.draw_line(Point::new(x, y), Point::new(end, y), color, 1);
            x += period as i64;
        }
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        let rgb = self.to_rgb();
        RgbImage::from_raw(rgb.width, rgb.height, rgb.data).expect("dimensions match buffer")
    }

    pub fn to_gray_image(&self) -> GrayImage {
        let gray = self.to_gray();
        GrayImage::from_raw(gray.width, gray.height, gray.data).expect("dimensions match buffer")
    }

    /// Encode to PNG bytes in memory, without touching the filesystem —
    /// lets a caller assemble every output artifact before writing any of
    /// them (spec.md §7).
    pub fn encode_png(&self) -> Result<Vec<u8>, DigitizationError> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(self.to_rgb_image())
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| DigitizationError::ImageFormat(format!("cannot encode png: {e}")))?;
        Ok(buf)
    }

    pub fn save_png(&self, path: &str) -> Result<(), DigitizationError> {
        let bytes = self.encode_png()?;
        std::fs::write(path, bytes)
            .map_err(|e| DigitizationError::ImageFormat(format!("cannot write '{path}': {e}")))
    }

    /// Paste `other` into `self` at `(row, col)`, overwriting in place.
    pub fn paste(&mut self, other: &Image, row: u32, col: u32) {
        debug_assert_eq!(self.space, other.space);
        for r in 0..other.height {
            for c in 0..other.width {
                let px = other.pixel(r, c).to_vec();
                self.set_pixel(row + r, col + c, &px);
            }
        }
    }
}

fn bgr_to_gray(b: u8, g: u8, r: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round().clamp(0.0, 255.0) as u8
}

/// RGB -> HSV using OpenCV's 8-bit convention: H in [0,179], S and V in [0,255].
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max == 0.0 { 0.0 } else { delta / max * 255.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / delta).rem_euclid(6.0))
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    if h < 0.0 {
        h += 360.0;
    }
    h /= 2.0; // OpenCV scales degrees (0-360) down to a byte (0-179)

    (h.round().clamp(0.0, 179.0) as u8, s.round().clamp(0.0, 255.0) as u8, v.round().clamp(0.0, 255.0) as u8)
}

fn hsv_to_rgb(h: u8, s: u8, v: u8) -> (u8, u8, u8) {
    let hf = h as f64 * 2.0; // back to 0-360
    let sf = s as f64 / 255.0;
    let vf = v as f64 / 255.0;

    let c = vf * sf;
    let x = c * (1.0 - ((hf / 60.0) % 2.0 - 1.0).abs());
    let m = vf - c;

    let (r1, g1, b1) = match hf as u32 {
        0..=59 => (c, x, 0.0),
        60..=119 => (x, c, 0.0),
        120..=179 => (0.0, c, x),
        180..=239 => (0.0, x, c),
        240..=299 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r1 + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((g1 + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((b1 + m) * 255.0).round().clamp(0.0, 255.0) as u8,
    )
}

/// Integer Bresenham line rasterisation, `p1` to `p2` inclusive.
fn bresenham(p1: Point, p2: Point) -> Vec<(i64, i64)> {
    let (mut x0, mut y0) = (p1.x, p1.y);
    let (x1, y1) = (p2.x, p2.y);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut pts = Vec::new();
    loop {
        pts.push((x0, y0));
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    pts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_bgr(w: u32, h: u32, color: [u8; 3]) -> Image {
        let data: Vec<u8> = color.iter().cycle().take((w * h * 3) as usize).cloned().collect();
        Image::new(w, h, ColorSpace::Bgr, data)
    }

    #[test]
    fn crop_extracts_subregion() {
        let mut img = solid_bgr(10, 10, [0, 0, 0]);
        img.set_pixel(5, 5, &[9, 9, 9]);
        let cropped = img.crop(&Rectangle::new(Point::new(3, 3), Point::new(8, 8)));
        assert_eq!(cropped.width(), 5);
        assert_eq!(cropped.height(), 5);
        assert_eq!(cropped.pixel(2, 2), &[9, 9, 9]);
    }

    #[test]
    fn threshold_binarizes_gray() {
        let img = Image::new(3, 1, ColorSpace::Gray, vec![10, 128, 250]);
        let bin = img.threshold(127, 255);
        assert_eq!(bin.data(), &[0, 255, 255]);
    }

    #[test]
    fn white_value_is_high_for_hsv() {
        let gray = Image::new(1, 1, ColorSpace::Gray, vec![0]);
        assert_eq!(gray.white(), vec![255]);
        let hsv = gray.to_hsv();
        assert_eq!(hsv.white(), vec![0, 0, 255]);
    }

    #[test]
    fn gray_roundtrip_is_stable_for_gray_input() {
        let gray = Image::new(2, 2, ColorSpace::Gray, vec![0, 64, 128, 255]);
        let bgr = gray.to_bgr();
        let back = bgr.to_gray();
        assert_eq!(back.data(), gray.data());
    }

    #[test]
    fn rgb_to_hsv_pure_red_matches_opencv_convention() {
        let (h, s, v) = rgb_to_hsv(255, 0, 0);
        assert_eq!(h, 0);
        assert_eq!(s, 255);
        assert_eq!(v, 255);
    }

    #[test]
    fn draw_line_sets_endpoints() {
        let mut img = solid_bgr(20, 20, [255, 255, 255]);
        img.draw_line(Point::new(0, 0), Point::new(10, 0), &[0, 0, 0], 1);
        assert_eq!(img.pixel(0, 5), &[0, 0, 0]);
    }
}
