//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::detect`] which runs everything in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use spotdiff_pipeline::{ImagePair, ParameterProfile, Pipeline, PipelineError};
//! # fn run(pair: ImagePair) -> Result<(), PipelineError> {
//! let staged = Pipeline::new(pair, ParameterProfile::default())?
//!     .smooth()
//!     .difference()
//!     .clean()
//!     .extract()
//!     .consolidate()
//!     .normalize()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state,
//! carrying all previously computed intermediates. The profile is
//! validated once, in [`Pipeline::new`], so every later transition is
//! infallible.

use image::{GrayImage, RgbImage};

use crate::consolidate;
use crate::mask::{self, ChannelCounts, ChannelMasks};
use crate::profile::ParameterProfile;
use crate::types::{
    BoundingBox, Dimensions, ImagePair, PipelineError, Region, Spot, StagedResult,
};

/// Stage names in execution order, as used in diagnostics and logs.
pub const STAGE_NAMES: [&str; 6] = [
    "smooth",
    "difference",
    "clean",
    "extract",
    "consolidate",
    "normalize",
];

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any pixel work.
///
/// Call [`smooth`](Self::smooth) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .smooth() to continue"]
pub struct Pending {
    profile: ParameterProfile,
    pair: ImagePair,
    ignore: Option<BoundingBox>,
}

impl Pending {
    /// The input pair.
    #[must_use]
    pub const fn pair(&self) -> &ImagePair {
        &self.pair
    }

    /// The validated profile this run uses.
    #[must_use]
    pub const fn profile(&self) -> &ParameterProfile {
        &self.profile
    }

    /// The ignored rectangle, if the profile defines a non-empty one.
    #[must_use]
    pub const fn ignore_region(&self) -> Option<BoundingBox> {
        self.ignore
    }

    /// Neutralize the ignore region and blur both images.
    pub fn smooth(self) -> Smoothed {
        let mut altered = self.pair.altered().clone();
        mask::neutralize_ignore_region(self.pair.original(), &mut altered, self.ignore);

        let kernel = self.profile.blur_kernel_size;
        let smoothed_original = crate::blur::smooth(self.pair.original(), kernel);
        let smoothed_altered = crate::blur::smooth(&altered, kernel);
        tracing::debug!(
            kernel = crate::blur::effective_kernel_size(kernel),
            "smoothed image pair"
        );

        Smoothed {
            profile: self.profile,
            pair: self.pair,
            ignore: self.ignore,
            smoothed_original,
            smoothed_altered,
        }
    }
}

// ───────────────────────── Stage 1: Smoothed ─────────────────────────

/// Pipeline state after Gaussian smoothing.
///
/// Call [`difference`](Self::difference) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .difference() to continue"]
pub struct Smoothed {
    profile: ParameterProfile,
    pair: ImagePair,
    ignore: Option<BoundingBox>,
    smoothed_original: RgbImage,
    smoothed_altered: RgbImage,
}

impl Smoothed {
    /// Blurred original image.
    #[must_use]
    pub const fn smoothed_original(&self) -> &RgbImage {
        &self.smoothed_original
    }

    /// Blurred altered image.
    #[must_use]
    pub const fn smoothed_altered(&self) -> &RgbImage {
        &self.smoothed_altered
    }

    /// Threshold every enabled signal channel and take their union.
    pub fn difference(self) -> Differenced {
        let (raw_mask, channel_masks) = mask::difference_mask(
            &self.smoothed_original,
            &self.smoothed_altered,
            &self.profile,
            self.ignore,
        );
        let counts = channel_masks.counts();
        tracing::debug!(
            luma = counts.luma,
            hue = counts.hue,
            saturation = counts.saturation,
            perceptual = counts.perceptual,
            "channel pixel counts"
        );

        Differenced {
            profile: self.profile,
            pair: self.pair,
            ignore: self.ignore,
            smoothed_original: self.smoothed_original,
            smoothed_altered: self.smoothed_altered,
            channel_masks,
            raw_mask,
        }
    }
}

// ─────────────────────── Stage 2: Differenced ────────────────────────

/// Pipeline state after computing the raw difference mask.
///
/// Call [`clean`](Self::clean) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .clean() to continue"]
pub struct Differenced {
    profile: ParameterProfile,
    pair: ImagePair,
    ignore: Option<BoundingBox>,
    smoothed_original: RgbImage,
    smoothed_altered: RgbImage,
    channel_masks: ChannelMasks,
    raw_mask: GrayImage,
}

impl Differenced {
    /// Union of the thresholded channels, before morphology.
    #[must_use]
    pub const fn raw_mask(&self) -> &GrayImage {
        &self.raw_mask
    }

    /// Thresholded mask of each enabled channel.
    #[must_use]
    pub const fn channel_masks(&self) -> &ChannelMasks {
        &self.channel_masks
    }

    /// Per-channel on-pixel counts.
    #[must_use]
    pub fn channel_counts(&self) -> ChannelCounts {
        self.channel_masks.counts()
    }

    /// Apply opening, closing and separation erosion.
    ///
    /// The ignore region is cleared again afterwards since dilation can
    /// grow regions into it.
    pub fn clean(self) -> Cleaned {
        let mut cleaned = crate::morphology::clean(&self.raw_mask, &self.profile);
        mask::clear_region(&mut cleaned, self.ignore);

        Cleaned {
            profile: self.profile,
            pair: self.pair,
            smoothed_original: self.smoothed_original,
            smoothed_altered: self.smoothed_altered,
            channel_masks: self.channel_masks,
            raw_mask: self.raw_mask,
            mask: cleaned,
        }
    }
}

// ───────────────────────── Stage 3: Cleaned ──────────────────────────

/// Pipeline state after morphological cleanup.
///
/// Call [`extract`](Self::extract) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .extract() to continue"]
pub struct Cleaned {
    profile: ParameterProfile,
    pair: ImagePair,
    smoothed_original: RgbImage,
    smoothed_altered: RgbImage,
    channel_masks: ChannelMasks,
    raw_mask: GrayImage,
    mask: GrayImage,
}

impl Cleaned {
    /// The cleaned difference mask.
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// Label connected components and apply the size filters.
    pub fn extract(self) -> Extracted {
        let regions = crate::region::extract_regions(&self.mask, &self.profile);
        tracing::debug!(regions = regions.len(), "extracted regions");

        Extracted {
            profile: self.profile,
            pair: self.pair,
            smoothed_original: self.smoothed_original,
            smoothed_altered: self.smoothed_altered,
            channel_masks: self.channel_masks,
            raw_mask: self.raw_mask,
            mask: self.mask,
            regions,
        }
    }
}

// ──────────────────────── Stage 4: Extracted ─────────────────────────

/// Pipeline state after region extraction.
///
/// Call [`consolidate`](Self::consolidate) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .consolidate() to continue"]
pub struct Extracted {
    profile: ParameterProfile,
    pair: ImagePair,
    smoothed_original: RgbImage,
    smoothed_altered: RgbImage,
    channel_masks: ChannelMasks,
    raw_mask: GrayImage,
    mask: GrayImage,
    regions: Vec<Region>,
}

impl Extracted {
    /// Regions that passed the size filters.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Merge, prune and pad the region boxes.
    pub fn consolidate(self) -> Consolidated {
        let dimensions = self.pair.dimensions();
        let raw: Vec<BoundingBox> = self.regions.iter().map(|r| r.bbox).collect();
        let consolidated = consolidate::consolidate(
            &raw,
            self.profile.merge_distance,
            self.profile.consolidation,
        );
        let boxes = consolidate::pad(&consolidated, self.profile.padding, dimensions);
        tracing::debug!(
            before = raw.len(),
            after = boxes.len(),
            "consolidated boxes"
        );

        Consolidated {
            pair: self.pair,
            smoothed_original: self.smoothed_original,
            smoothed_altered: self.smoothed_altered,
            channel_masks: self.channel_masks,
            raw_mask: self.raw_mask,
            mask: self.mask,
            regions: self.regions,
            consolidated,
            boxes,
            dimensions,
        }
    }
}

// ─────────────────────── Stage 5: Consolidated ───────────────────────

/// Pipeline state after consolidation and padding.
///
/// Call [`normalize`](Self::normalize) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .normalize() to continue"]
pub struct Consolidated {
    pair: ImagePair,
    smoothed_original: RgbImage,
    smoothed_altered: RgbImage,
    channel_masks: ChannelMasks,
    raw_mask: GrayImage,
    mask: GrayImage,
    regions: Vec<Region>,
    consolidated: Vec<BoundingBox>,
    boxes: Vec<BoundingBox>,
    dimensions: Dimensions,
}

impl Consolidated {
    /// Final padded boxes.
    #[must_use]
    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    /// Boxes after merging and pruning, before padding.
    #[must_use]
    pub fn unpadded(&self) -> &[BoundingBox] {
        &self.consolidated
    }

    /// Convert the final boxes to spots.
    pub fn normalize(self) -> Normalized {
        let spots = crate::normalize::normalize(&self.boxes, self.dimensions);
        Normalized {
            pair: self.pair,
            smoothed_original: self.smoothed_original,
            smoothed_altered: self.smoothed_altered,
            channel_masks: self.channel_masks,
            raw_mask: self.raw_mask,
            mask: self.mask,
            regions: self.regions,
            consolidated: self.consolidated,
            boxes: self.boxes,
            spots,
            dimensions: self.dimensions,
        }
    }
}

// ──────────────────────── Stage 6: Normalized ────────────────────────

/// Final pipeline state.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`StagedResult`] containing all intermediates.
#[must_use = "call .into_result() to extract the StagedResult"]
pub struct Normalized {
    pair: ImagePair,
    smoothed_original: RgbImage,
    smoothed_altered: RgbImage,
    channel_masks: ChannelMasks,
    raw_mask: GrayImage,
    mask: GrayImage,
    regions: Vec<Region>,
    consolidated: Vec<BoundingBox>,
    boxes: Vec<BoundingBox>,
    spots: Vec<Spot>,
    dimensions: Dimensions,
}

impl Normalized {
    /// The detected spots.
    #[must_use]
    pub fn spots(&self) -> &[Spot] {
        &self.spots
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Consume the pipeline and return the full [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            pair: self.pair,
            smoothed_original: self.smoothed_original,
            smoothed_altered: self.smoothed_altered,
            channel_masks: self.channel_masks,
            raw_mask: self.raw_mask,
            mask: self.mask,
            regions: self.regions,
            consolidated: self.consolidated,
            boxes: self.boxes,
            spots: self.spots,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental difference-detection pipeline.
///
/// Each stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or call them out of
/// order.
pub struct Pipeline;

impl Pipeline {
    /// Validate `profile` and wrap the pair for processing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the profile fails
    /// [`ParameterProfile::validate`].
    #[allow(clippy::new_ret_no_self)]
    pub fn new(pair: ImagePair, profile: ParameterProfile) -> Result<Pending, PipelineError> {
        profile.validate()?;
        let ignore = profile.ignore_region.rect(pair.dimensions());
        Ok(Pending {
            profile,
            pair,
            ignore,
        })
    }

    /// Validate `profile`, then decode both images.
    ///
    /// The profile is checked before any decoding so a bad configuration
    /// is reported without touching pixel data.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad profile, then
    /// [`PipelineError::EmptyInput`] or [`PipelineError::ImageDecode`]
    /// for unusable image bytes.
    pub fn from_bytes(
        original: &[u8],
        altered: &[u8],
        profile: ParameterProfile,
    ) -> Result<Pending, PipelineError> {
        profile.validate()?;
        let pair = crate::load::decode_pair(original, altered)?;
        Self::new(pair, profile)
    }
}
