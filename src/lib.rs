//! Digitises a scanned/printed 12-lead ECG raster into a tabular sample
//! table (millivolts) and a diagnostic trace overlay.
//!
//! The three pipeline stages — [`preprocessor`], [`extractor`],
//! [`postprocessor`] — are pure functions of an [`image::Image`] and a
//! [`config::Configuration`]; [`pipeline`] wires them together and owns the
//! filesystem boundary. [`batch`] runs many digitisations across a worker
//! pool with per-file error isolation, the ambient replacement for the
//! excluded desktop GUI's dispatch model.

pub mod batch;
pub mod colorspace;
pub mod config;
pub mod contours;
pub mod error;
pub mod extractor;
pub mod geometry;
pub mod image;
pub mod lead;
pub mod metadata;
pub mod otsu;
pub mod peaks;
pub mod pipeline;
pub mod postprocessor;
pub mod preprocessor;
pub mod sampletable;
