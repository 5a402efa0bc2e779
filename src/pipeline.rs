//! Wires the three stages together into one digitisation, and handles the
//! filesystem boundary: reading the page, writing `<base>.csv`,
//! `<base>_trace.png` and, if a metadata collaborator was supplied,
//! `<base>_metadata.txt` (spec.md §4.4, §6).

use std::fs;
use std::path::Path;

use log::info;

use crate::config::Configuration;
use crate::error::DigitizationError;
use crate::extractor::SignalExtractor;
use crate::image::Image;
use crate::metadata::MetadataExtractor;
use crate::postprocessor::Postprocessor;
use crate::preprocessor::Preprocessor;
use crate::sampletable::SampleTable;

/// Run the pipeline over an already-decoded page, without touching the
/// filesystem. Returns the sample table and the trace overlay, cropped to
/// the located chart rectangle.
pub fn digitize_buffer(ecg: &Image, config: &Configuration) -> Result<(SampleTable, Image), DigitizationError> {
    let preprocessor = Preprocessor::new();
    let (ecg_crop, rect) = preprocessor.preprocess(ecg)?;

    let extractor = SignalExtractor::new(config.trace_row_count());
    let raw_signals = extractor.extract_signals(&ecg_crop)?;

    // The overlay is drawn over the pre-binarisation crop (spec.md §4.3
    // Inputs/§4.3.3), not the binarised image the extractor traced.
    let original_crop = ecg.crop(&rect);
    let postprocessor = Postprocessor::new(config.clone());
    postprocessor.postprocess(&raw_signals, &original_crop)
}

/// Digitise one file on disk, writing its outputs alongside `output_dir`.
/// `metadata_extractor`, when supplied, additionally renders a masked copy
/// of the page (chart region blanked out) and writes whatever text it
/// extracts to `<base>_metadata.txt`.
pub fn digitize_path(
    path: &Path,
    output_dir: &Path,
    config: &Configuration,
    metadata_extractor: Option<&dyn MetadataExtractor>,
) -> Result<(), DigitizationError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| DigitizationError::ImageFormat(format!("cannot derive an output name from {path:?}")))?;
    let out_base = output_dir.join(stem);

    let path_str = path
        .to_str()
        .ok_or_else(|| DigitizationError::ImageFormat(format!("non UTF-8 path {path:?}")))?;
    let ecg = Image::open(path_str)?;

    let preprocessor = Preprocessor::new();
    let (ecg_crop, rect) = preprocessor.preprocess(&ecg)?;

    let extractor = SignalExtractor::new(config.trace_row_count());
    let raw_signals = extractor.extract_signals(&ecg_crop)?;

    // The overlay is drawn over the pre-binarisation crop (spec.md §4.3
    // Inputs/§4.3.3), not the binarised image the extractor traced.
    let original_crop = ecg.crop(&rect);
    let postprocessor = Postprocessor::new(config.clone());
    let (table, trace) = postprocessor.postprocess(&raw_signals, &original_crop)?;

    // Every fallible step runs to completion in memory before any file is
    // touched, so a later failure can never leave an earlier output behind
    // (spec.md §7, "partial output files are not written on failure").
    let csv_bytes = table.to_csv().into_bytes();

    let mut page = ecg.copy();
    page.paste(&trace, rect.top_left.y as u32, rect.top_left.x as u32);
    let trace_bytes = page.encode_png()?;

    let metadata_bytes = match metadata_extractor {
        Some(extractor) => {
            let mut masked = ecg.copy();
            let (w, h) = (rect.width() as u32, rect.height() as u32);
            let blank =
                Image::new(w, h, ecg.space(), vec![255u8; (w as usize) * (h as usize) * ecg.space().channels()]);
            masked.paste(&blank, rect.top_left.y as u32, rect.top_left.x as u32);
            Some(extractor.extract(&masked)?.into_bytes())
        }
        None => None,
    };

    fs::create_dir_all(output_dir)
        .map_err(|e| DigitizationError::ImageFormat(format!("cannot create {output_dir:?}: {e}")))?;

    let csv_path = format!("{}.csv", out_base.display());
    fs::write(&csv_path, &csv_bytes)
        .map_err(|e| DigitizationError::ImageFormat(format!("cannot write {csv_path}: {e}")))?;

    let trace_path = format!("{}_trace.png", out_base.display());
    fs::write(&trace_path, &trace_bytes)
        .map_err(|e| DigitizationError::ImageFormat(format!("cannot write {trace_path}: {e}")))?;

    if let Some(bytes) = metadata_bytes {
        let metadata_path = format!("{}_metadata.txt", out_base.display());
        fs::write(&metadata_path, &bytes)
            .map_err(|e| DigitizationError::ImageFormat(format!("cannot write {metadata_path}: {e}")))?;
    }

    info!("{} digitized", stem);
    Ok(())
}
