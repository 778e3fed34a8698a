//! spotdiff-pipeline: Pure difference-detection pipeline (sans-IO).
//!
//! Finds the regions where two near-identical images differ and turns
//! them into normalized hotspots through:
//! load -> smooth -> multi-channel difference mask -> morphology ->
//! region extraction -> consolidation -> normalization.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and images and returns structured data. Filesystem access
//! lives in `spotdiff-io`.

pub mod blur;
pub mod color;
pub mod consolidate;
pub mod diagnostics;
pub mod load;
pub mod mask;
pub mod morphology;
pub mod normalize;
pub mod pipeline;
pub mod profile;
pub mod region;
pub mod session;
pub mod types;

pub use consolidate::ConsolidationStrategy;
pub use mask::ChannelMasks;
pub use pipeline::Pipeline;
pub use profile::{
    IgnoreRegion, ParameterProfile, ProfileOverrides, Sensitivity, SignalChannels,
    StructuringElement,
};
pub use session::{ManualBox, SessionState, StageResults, TuningSession};
pub use types::{
    BoundingBox, Detection, Dimensions, GrayImage, ImagePair, PipelineError, Region, RgbImage,
    Spot, StagedResult,
};

/// Run the full pipeline on two encoded images.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP) for the original and the
/// altered image plus a profile, and produces the detected spots with
/// the original's dimensions.
///
/// # Pipeline steps
///
/// 1. Validate the profile
/// 2. Decode both images, resampling the altered one if sizes differ
/// 3. Neutralize the ignore region and blur both images
/// 4. Threshold the enabled signal channels and take their union
/// 5. Morphological opening and closing
/// 6. Fill holes, label components, filter by size
/// 7. Merge close boxes, prune enclosed boxes, pad
/// 8. Normalize to relative coordinates
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the profile is invalid.
/// Returns [`PipelineError::EmptyInput`] if either byte slice is empty.
/// Returns [`PipelineError::ImageDecode`] if an image format is unrecognized.
pub fn detect(
    original: &[u8],
    altered: &[u8],
    profile: &ParameterProfile,
) -> Result<Detection, PipelineError> {
    Ok(detect_staged(original, altered, profile)?.into_detection())
}

/// Run the full pipeline on two encoded images, keeping every
/// intermediate.
///
/// # Errors
///
/// Same as [`detect`].
pub fn detect_staged(
    original: &[u8],
    altered: &[u8],
    profile: &ParameterProfile,
) -> Result<StagedResult, PipelineError> {
    let staged = Pipeline::from_bytes(original, altered, profile.clone())?
        .smooth()
        .difference()
        .clean()
        .extract()
        .consolidate()
        .normalize()
        .into_result();
    Ok(staged)
}

/// Run the full pipeline on an already-loaded pair, keeping every
/// intermediate.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the profile is invalid.
pub fn detect_pair(
    pair: ImagePair,
    profile: &ParameterProfile,
) -> Result<StagedResult, PipelineError> {
    let staged = Pipeline::new(pair, profile.clone())?
        .smooth()
        .difference()
        .clean()
        .extract()
        .consolidate()
        .normalize()
        .into_result();
    Ok(staged)
}
