//! The optional text-extraction collaborator (spec.md §6): reading patient
//! or study metadata off the scanned page is explicitly out of scope for
//! this crate, but the pipeline still has a seam for a caller to plug one
//! in (an OCR engine, a barcode reader, whatever the deployment needs).

use crate::error::DigitizationError;
use crate::image::Image;

pub trait MetadataExtractor {
    fn extract(&self, page: &Image) -> Result<String, DigitizationError>;
}
