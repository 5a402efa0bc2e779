//! Colour-space tag for [`crate::image::Image`]. Kept as a fieldless enum so
//! conversions dispatch on the (from, to) pair rather than through a class
//! hierarchy, per the design note on avoiding a polymorphic `Image` type.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Gray,
    Bgr,
    Rgb,
    Hsv,
}

impl ColorSpace {
    /// Number of channels stored per pixel for this colour space.
    pub fn channels(self) -> usize {
        match self {
            ColorSpace::Gray => 1,
            ColorSpace::Bgr | ColorSpace::Rgb | ColorSpace::Hsv => 3,
        }
    }
}
