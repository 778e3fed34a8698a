//! Parameter profiles: named sensitivity presets plus per-field overrides.
//!
//! A [`ParameterProfile`] carries every threshold and kernel size the
//! pipeline uses. Profiles are plain data: they serialize with serde so
//! a tuned profile can be saved as JSON and replayed later, and they are
//! validated once, before any pixel work, by [`ParameterProfile::validate`].

use imageproc::distance_transform::Norm;
use serde::{Deserialize, Serialize};

use crate::consolidate::ConsolidationStrategy;
use crate::types::{BoundingBox, Dimensions, PipelineError};

/// Shape of the structuring element used for morphology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StructuringElement {
    /// Disk (Euclidean distance). Rounds off corners of regions.
    #[default]
    Ellipse,
    /// Square (chessboard distance). Keeps regions rectangular.
    Square,
}

impl StructuringElement {
    /// The `imageproc` distance norm that realizes this shape.
    #[must_use]
    pub const fn norm(self) -> Norm {
        match self {
            Self::Ellipse => Norm::L2,
            Self::Square => Norm::LInf,
        }
    }
}

/// Which photometric signal channels contribute to the difference mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct SignalChannels {
    /// Absolute luma difference.
    pub luma: bool,
    /// Circular hue distance, gated by saturation.
    pub hue: bool,
    /// Absolute HSV saturation difference.
    pub saturation: bool,
    /// Weighted CIE L\*a\*b\* distance.
    pub perceptual: bool,
}

impl SignalChannels {
    /// Every channel enabled.
    pub const ALL: Self = Self {
        luma: true,
        hue: true,
        saturation: true,
        perceptual: true,
    };

    /// No channel enabled. Useful as a base for building a single-channel set.
    pub const NONE: Self = Self {
        luma: false,
        hue: false,
        saturation: false,
        perceptual: false,
    };

    /// Whether at least one channel is enabled.
    #[must_use]
    pub const fn any(self) -> bool {
        self.luma || self.hue || self.saturation || self.perceptual
    }
}

impl Default for SignalChannels {
    fn default() -> Self {
        Self::ALL
    }
}

/// Bottom-right rectangle excluded from detection, sized as fractions of
/// the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IgnoreRegion {
    /// Fraction of the image width covered, `[0, 1)`.
    pub width_fraction: f64,
    /// Fraction of the image height covered, `[0, 1)`.
    pub height_fraction: f64,
}

impl IgnoreRegion {
    /// Default fraction for both axes.
    pub const DEFAULT_FRACTION: f64 = 0.12;

    /// No ignore region.
    pub const DISABLED: Self = Self {
        width_fraction: 0.0,
        height_fraction: 0.0,
    };

    /// The ignored rectangle for an image of the given size, or `None`
    /// when it would be empty.
    ///
    /// The rectangle spans `floor(width * width_fraction)` columns and
    /// `floor(height * height_fraction)` rows ending at the bottom-right
    /// corner.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn rect(&self, dims: Dimensions) -> Option<BoundingBox> {
        let w = (f64::from(dims.width) * self.width_fraction).floor() as u32;
        let h = (f64::from(dims.height) * self.height_fraction).floor() as u32;
        if w == 0 || h == 0 {
            return None;
        }
        let w = w.min(dims.width);
        let h = h.min(dims.height);
        Some(BoundingBox::new(dims.width - w, dims.height - h, w, h))
    }
}

impl Default for IgnoreRegion {
    fn default() -> Self {
        Self {
            width_fraction: Self::DEFAULT_FRACTION,
            height_fraction: Self::DEFAULT_FRACTION,
        }
    }
}

/// Named sensitivity presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sensitivity {
    /// High thresholds, aggressive noise removal. Only obvious changes.
    Low,
    /// Balanced defaults.
    #[default]
    Medium,
    /// Lower thresholds for subtle changes.
    High,
    /// Lowest thresholds. Expect some false positives on noisy assets.
    VeryHigh,
}

/// Every tunable of the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterProfile {
    /// Gaussian smoothing kernel size. Coerced to odd; 0 or 1 disables.
    pub blur_kernel_size: i32,
    /// Enabled signal channels.
    pub channels: SignalChannels,
    /// Luma difference threshold (0–255).
    pub luma_threshold: u8,
    /// Hue distance threshold in degrees (0–180).
    pub hue_threshold: u8,
    /// Saturation difference threshold (0–255).
    pub saturation_threshold: u8,
    /// Weighted L\*a\*b\* distance threshold (0–255).
    pub perceptual_threshold: u8,
    /// Morphology structuring element shape.
    pub structuring_element: StructuringElement,
    /// Morphology kernel size. 0 disables opening and closing.
    pub morph_kernel_size: i32,
    /// Opening iterations (noise removal).
    pub open_iterations: u32,
    /// Closing iterations (fills gaps inside regions).
    pub close_iterations: u32,
    /// Square erosion applied after closing to split touching regions.
    /// 0 disables.
    pub separation_erode_size: i32,
    /// Minimum filled pixel area of a region.
    pub min_area: u64,
    /// Minimum width and height of a region's box. 0 disables.
    pub min_box_side: u32,
    /// Regions wider than this fraction of the image are discarded as
    /// full-frame artifacts. 1.0 disables.
    pub max_width_fraction: f64,
    /// Boxes within this many pixels of each other are merged.
    pub merge_distance: u32,
    /// Order of merging and containment pruning.
    pub consolidation: ConsolidationStrategy,
    /// Pixels added on every side of each final box.
    pub padding: u32,
    /// Bottom-right watermark area excluded from detection.
    pub ignore_region: IgnoreRegion,
}

impl ParameterProfile {
    /// Default blur kernel size.
    pub const DEFAULT_BLUR_KERNEL_SIZE: i32 = 5;
    /// Default morphology kernel size.
    pub const DEFAULT_MORPH_KERNEL_SIZE: i32 = 5;
    /// Default padding around final boxes.
    pub const DEFAULT_PADDING: u32 = 10;

    /// The profile for a named preset.
    #[must_use]
    pub fn preset(sensitivity: Sensitivity) -> Self {
        let base = Self {
            blur_kernel_size: Self::DEFAULT_BLUR_KERNEL_SIZE,
            channels: SignalChannels::ALL,
            luma_threshold: 30,
            hue_threshold: 30,
            saturation_threshold: 40,
            perceptual_threshold: 25,
            structuring_element: StructuringElement::Ellipse,
            morph_kernel_size: Self::DEFAULT_MORPH_KERNEL_SIZE,
            open_iterations: 2,
            close_iterations: 3,
            separation_erode_size: 0,
            min_area: 150,
            min_box_side: 0,
            max_width_fraction: 1.0,
            merge_distance: 30,
            consolidation: ConsolidationStrategy::default(),
            padding: Self::DEFAULT_PADDING,
            ignore_region: IgnoreRegion::default(),
        };

        match sensitivity {
            Sensitivity::Low => Self {
                blur_kernel_size: 7,
                luma_threshold: 45,
                hue_threshold: 40,
                saturation_threshold: 55,
                perceptual_threshold: 40,
                open_iterations: 3,
                close_iterations: 2,
                min_area: 300,
                merge_distance: 35,
                ..base
            },
            Sensitivity::Medium => base,
            Sensitivity::High => Self {
                luma_threshold: 20,
                hue_threshold: 20,
                saturation_threshold: 30,
                perceptual_threshold: 18,
                open_iterations: 1,
                close_iterations: 3,
                min_area: 100,
                merge_distance: 25,
                ..base
            },
            Sensitivity::VeryHigh => Self {
                blur_kernel_size: 3,
                luma_threshold: 15,
                hue_threshold: 12,
                saturation_threshold: 22,
                perceptual_threshold: 12,
                open_iterations: 1,
                close_iterations: 2,
                min_area: 80,
                merge_distance: 20,
                ..base
            },
        }
    }

    /// Apply `overrides` on top of this profile.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &ProfileOverrides) -> Self {
        overrides.apply(&mut self);
        self
    }

    /// Check the profile for values the pipeline cannot honor.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.blur_kernel_size < 0 {
            return invalid(format!(
                "blur_kernel_size must be non-negative, got {}",
                self.blur_kernel_size
            ));
        }
        if self.morph_kernel_size < 0 {
            return invalid(format!(
                "morph_kernel_size must be non-negative, got {}",
                self.morph_kernel_size
            ));
        }
        for (name, size) in [
            ("morph_kernel_size", self.morph_kernel_size),
            ("separation_erode_size", self.separation_erode_size),
        ] {
            if size > crate::morphology::MAX_KERNEL_SIZE {
                return invalid(format!(
                    "{name} must be at most {}, got {size}",
                    crate::morphology::MAX_KERNEL_SIZE
                ));
            }
        }
        if self.morph_kernel_size == 0 && (self.open_iterations > 0 || self.close_iterations > 0)
        {
            return invalid(
                "morph_kernel_size is 0 but open/close iterations are requested".to_string(),
            );
        }
        if self.separation_erode_size < 0 {
            return invalid(format!(
                "separation_erode_size must be non-negative, got {}",
                self.separation_erode_size
            ));
        }
        if !self.channels.any() {
            return invalid("at least one signal channel must be enabled".to_string());
        }
        for (name, value) in [
            ("ignore_region.width_fraction", self.ignore_region.width_fraction),
            ("ignore_region.height_fraction", self.ignore_region.height_fraction),
        ] {
            if !(0.0..1.0).contains(&value) {
                return invalid(format!("{name} must be in [0, 1), got {value}"));
            }
        }
        if !(self.max_width_fraction > 0.0 && self.max_width_fraction <= 1.0) {
            return invalid(format!(
                "max_width_fraction must be in (0, 1], got {}",
                self.max_width_fraction
            ));
        }
        Ok(())
    }
}

impl Default for ParameterProfile {
    fn default() -> Self {
        Self::preset(Sensitivity::default())
    }
}

/// Optional replacements for individual profile fields.
///
/// `None` leaves the preset's value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOverrides {
    pub blur_kernel_size: Option<i32>,
    pub channels: Option<SignalChannels>,
    pub luma_threshold: Option<u8>,
    pub hue_threshold: Option<u8>,
    pub saturation_threshold: Option<u8>,
    pub perceptual_threshold: Option<u8>,
    pub structuring_element: Option<StructuringElement>,
    pub morph_kernel_size: Option<i32>,
    pub open_iterations: Option<u32>,
    pub close_iterations: Option<u32>,
    pub separation_erode_size: Option<i32>,
    pub min_area: Option<u64>,
    pub min_box_side: Option<u32>,
    pub max_width_fraction: Option<f64>,
    pub merge_distance: Option<u32>,
    pub consolidation: Option<ConsolidationStrategy>,
    pub padding: Option<u32>,
    pub ignore_region: Option<IgnoreRegion>,
}

impl ProfileOverrides {
    /// Write every `Some` field into `profile`.
    pub fn apply(&self, profile: &mut ParameterProfile) {
        let overrides = self;
        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = overrides.$field {
                    profile.$field = value;
                })*
            };
        }
        set!(
            blur_kernel_size,
            channels,
            luma_threshold,
            hue_threshold,
            saturation_threshold,
            perceptual_threshold,
            structuring_element,
            morph_kernel_size,
            open_iterations,
            close_iterations,
            separation_erode_size,
            min_area,
            min_box_side,
            max_width_fraction,
            merge_distance,
            consolidation,
            padding,
            ignore_region,
        );
    }

    /// Whether no field is overridden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_validates() {
        for s in [
            Sensitivity::Low,
            Sensitivity::Medium,
            Sensitivity::High,
            Sensitivity::VeryHigh,
        ] {
            ParameterProfile::preset(s).validate().unwrap();
        }
    }

    #[test]
    fn default_is_medium() {
        assert_eq!(
            ParameterProfile::default(),
            ParameterProfile::preset(Sensitivity::Medium)
        );
    }

    #[test]
    fn presets_get_more_sensitive() {
        let low = ParameterProfile::preset(Sensitivity::Low);
        let very_high = ParameterProfile::preset(Sensitivity::VeryHigh);
        assert!(very_high.luma_threshold < low.luma_threshold);
        assert!(very_high.perceptual_threshold < low.perceptual_threshold);
        assert!(very_high.min_area < low.min_area);
    }

    #[test]
    fn overrides_replace_only_set_fields() {
        let overrides = ProfileOverrides {
            min_area: Some(5),
            padding: Some(0),
            ..ProfileOverrides::default()
        };
        let profile = ParameterProfile::preset(Sensitivity::High).with_overrides(&overrides);
        let high = ParameterProfile::preset(Sensitivity::High);
        assert_eq!(profile.min_area, 5);
        assert_eq!(profile.padding, 0);
        assert_eq!(profile.luma_threshold, high.luma_threshold);
        assert!(!overrides.is_empty());
        assert!(ProfileOverrides::default().is_empty());
    }

    #[test]
    fn negative_kernel_is_invalid() {
        let profile = ParameterProfile {
            blur_kernel_size: -1,
            ..ParameterProfile::default()
        };
        assert!(matches!(
            profile.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let profile = ParameterProfile {
            morph_kernel_size: -3,
            ..ParameterProfile::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn oversized_morphology_kernels_are_invalid() {
        let largest = ParameterProfile {
            morph_kernel_size: crate::morphology::MAX_KERNEL_SIZE,
            separation_erode_size: crate::morphology::MAX_KERNEL_SIZE,
            ..ParameterProfile::default()
        };
        largest.validate().unwrap();

        let profile = ParameterProfile {
            morph_kernel_size: 513,
            ..ParameterProfile::default()
        };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("morph_kernel_size"));

        let profile = ParameterProfile {
            separation_erode_size: 1001,
            ..ParameterProfile::default()
        };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("separation_erode_size"));
    }

    #[test]
    fn zero_blur_kernel_is_valid() {
        let profile = ParameterProfile {
            blur_kernel_size: 0,
            ..ParameterProfile::default()
        };
        profile.validate().unwrap();
    }

    #[test]
    fn morph_iterations_need_a_kernel() {
        let profile = ParameterProfile {
            morph_kernel_size: 0,
            ..ParameterProfile::default()
        };
        assert!(profile.validate().is_err());

        let profile = ParameterProfile {
            morph_kernel_size: 0,
            open_iterations: 0,
            close_iterations: 0,
            ..ParameterProfile::default()
        };
        profile.validate().unwrap();
    }

    #[test]
    fn no_channels_is_invalid() {
        let profile = ParameterProfile {
            channels: SignalChannels::NONE,
            ..ParameterProfile::default()
        };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("signal channel"));
    }

    #[test]
    fn ignore_fraction_out_of_range_is_invalid() {
        let profile = ParameterProfile {
            ignore_region: IgnoreRegion {
                width_fraction: 1.0,
                height_fraction: 0.1,
            },
            ..ParameterProfile::default()
        };
        assert!(profile.validate().is_err());

        let profile = ParameterProfile {
            max_width_fraction: 0.0,
            ..ParameterProfile::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn ignore_rect_is_bottom_right() {
        let dims = Dimensions {
            width: 100,
            height: 50,
        };
        let rect = IgnoreRegion::default().rect(dims).unwrap();
        assert_eq!(rect, BoundingBox::new(88, 44, 12, 6));
        assert!(IgnoreRegion::DISABLED.rect(dims).is_none());
    }

    #[test]
    fn ignore_rect_floors_fractional_size() {
        let dims = Dimensions {
            width: 10,
            height: 10,
        };
        let rect = IgnoreRegion::default().rect(dims).unwrap();
        assert_eq!(rect, BoundingBox::new(9, 9, 1, 1));
    }

    #[test]
    fn profile_json_round_trip_and_partial() {
        let profile = ParameterProfile::preset(Sensitivity::Low);
        let json = serde_json::to_string(&profile).unwrap();
        let back: ParameterProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);

        let partial: ParameterProfile = serde_json::from_str(r#"{"min_area": 7}"#).unwrap();
        assert_eq!(partial.min_area, 7);
        assert_eq!(partial.padding, ParameterProfile::DEFAULT_PADDING);
    }

    #[test]
    fn structuring_element_norms() {
        assert!(matches!(StructuringElement::Ellipse.norm(), Norm::L2));
        assert!(matches!(StructuringElement::Square.norm(), Norm::LInf));
    }
}
