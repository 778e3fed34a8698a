//! Image pair decoding and geometry reconciliation.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) for both halves of a
//! puzzle and produces an [`ImagePair`] whose images share the original's
//! dimensions. Alpha is dropped: the comparison is purely RGB.

use image::RgbImage;
use image::imageops::FilterType;

use crate::types::{Dimensions, ImagePair, PipelineError};

/// Decode a single image to 8-bit RGB.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

/// Decode both images of a pair and reconcile their geometry.
///
/// # Errors
///
/// Propagates the first [`decode_rgb`] failure, original image first.
pub fn decode_pair(original: &[u8], altered: &[u8]) -> Result<ImagePair, PipelineError> {
    let original = decode_rgb(original)?;
    let altered = decode_rgb(altered)?;
    Ok(ImagePair::reconciled(original, altered))
}

/// Resample `altered` to the dimensions of `original` if they differ.
///
/// The original's geometry is authoritative. A mismatch is not an
/// error, but it is logged since it usually means the asset pair was
/// exported at different scales.
#[must_use = "returns the altered image at the original's size"]
pub fn reconcile(original: &RgbImage, altered: RgbImage) -> RgbImage {
    let target = Dimensions::of(original);
    let actual = Dimensions::of(&altered);
    if target == actual {
        return altered;
    }

    tracing::warn!(
        original_width = target.width,
        original_height = target.height,
        altered_width = actual.width,
        altered_height = actual.height,
        "image size mismatch, resampling altered image to original size"
    );
    image::imageops::resize(&altered, target.width, target.height, FilterType::Triangle)
}
