//! Typed errors surfaced by the digitisation core.
//!
//! The four kinds mirror the ones the caller is expected to distinguish on:
//! a malformed input/localisation failure, a failed ROI search, a collapsed
//! calibration pulse, and an unavailable external collaborator (OCR). None
//! of these are recovered inside the core — the failing stage aborts the
//! invocation and the caller logs the kind and moves on to the next input.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigitizationError {
    #[error("image format error: {0}")]
    ImageFormat(String),

    #[error("roi count error: {0}")]
    RoiCount(String),

    #[error("calibration error: {0}")]
    Calibration(String),

    #[error("external tool error: {0}")]
    ExternalTool(String),
}

impl DigitizationError {
    /// Short, stable tag for the error kind, used in log lines alongside the filename.
    pub fn kind(&self) -> &'static str {
        match self {
            DigitizationError::ImageFormat(_) => "ImageFormatError",
            DigitizationError::RoiCount(_) => "RoiCountError",
            DigitizationError::Calibration(_) => "CalibrationError",
            DigitizationError::ExternalTool(_) => "ExternalToolError",
        }
    }
}
