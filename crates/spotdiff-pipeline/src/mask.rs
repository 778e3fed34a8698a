//! Difference mask: per-pixel binary map of candidate changes.
//!
//! Plain grayscale differencing misses isoluminant edits (a red shirt
//! turned green at equal brightness), so the mask is the union of several
//! signal channels, each thresholded on its own scale:
//!
//! | channel     | per-pixel signal                                   |
//! |-------------|----------------------------------------------------|
//! | luma        | `|Y1 - Y2|`                                        |
//! | hue         | circular hue distance in degrees, saturation-gated |
//! | saturation  | `|S1 - S2|`                                        |
//! | perceptual  | `0.5·ΔL + 2·Δa + 2·Δb` on the 8-bit L\*a\*b\* scale |
//!
//! A pixel is on when any enabled channel exceeds its threshold. The
//! ignore region is forced off afterwards. Each enabled channel's own
//! thresholded mask is kept alongside the union for debug output.

use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::color;
use crate::profile::{ParameterProfile, SignalChannels};
use crate::types::BoundingBox;

/// Mask value for "difference".
pub const ON: u8 = 255;

/// Lightness weight of the perceptual channel.
pub const PERCEPTUAL_LIGHTNESS_WEIGHT: f32 = 0.5;

/// Weight of each chrominance axis of the perceptual channel.
pub const PERCEPTUAL_CHROMA_WEIGHT: f32 = 2.0;

/// How many pixels each channel switched on, before the union.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounts {
    pub luma: u64,
    pub hue: u64,
    pub saturation: u64,
    pub perceptual: u64,
}

impl ChannelCounts {
    fn of(masks: &ChannelMasks) -> Self {
        let count = |m: Option<&GrayImage>| m.map_or(0, count_on);
        Self {
            luma: count(masks.luma.as_ref()),
            hue: count(masks.hue.as_ref()),
            saturation: count(masks.saturation.as_ref()),
            perceptual: count(masks.perceptual.as_ref()),
        }
    }
}

/// Thresholded mask of each enabled channel, before the union.
///
/// Disabled channels are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMasks {
    pub luma: Option<GrayImage>,
    pub hue: Option<GrayImage>,
    pub saturation: Option<GrayImage>,
    pub perceptual: Option<GrayImage>,
}

impl ChannelMasks {
    fn for_channels(channels: SignalChannels, width: u32, height: u32) -> Self {
        let blank = |enabled: bool| enabled.then(|| GrayImage::new(width, height));
        Self {
            luma: blank(channels.luma),
            hue: blank(channels.hue),
            saturation: blank(channels.saturation),
            perceptual: blank(channels.perceptual),
        }
    }

    /// On-pixel count of each channel.
    #[must_use]
    pub fn counts(&self) -> ChannelCounts {
        ChannelCounts::of(self)
    }

    /// Enabled channels as `(name, mask)`, in luma, hue, saturation,
    /// perceptual order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &GrayImage)> {
        [
            ("luma", &self.luma),
            ("hue", &self.hue),
            ("saturation", &self.saturation),
            ("perceptual", &self.perceptual),
        ]
        .into_iter()
        .filter_map(|(name, mask)| mask.as_ref().map(|m| (name, m)))
    }

    fn clear_region(&mut self, region: Option<BoundingBox>) {
        for mask in [
            &mut self.luma,
            &mut self.hue,
            &mut self.saturation,
            &mut self.perceptual,
        ]
        .into_iter()
        .flatten()
        {
            clear_region(mask, region);
        }
    }
}

fn set_on(mask: &mut Option<GrayImage>, x: u32, y: u32) {
    if let Some(m) = mask {
        m.put_pixel(x, y, Luma([ON]));
    }
}

/// Absolute luma difference.
#[must_use]
pub fn luma_difference(a: Rgb<u8>, b: Rgb<u8>) -> u8 {
    color::luma(a).abs_diff(color::luma(b))
}

/// Circular hue distance in whole degrees, or `None` when neither pixel
/// is saturated enough for hue to be meaningful.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hue_difference(a: &color::Hsv, b: &color::Hsv) -> Option<u8> {
    if !(a.is_chromatic() || b.is_chromatic()) {
        return None;
    }
    Some(color::hue_distance(a.hue, b.hue).round() as u8)
}

/// Absolute HSV saturation difference.
#[must_use]
pub const fn saturation_difference(a: &color::Hsv, b: &color::Hsv) -> u8 {
    a.saturation.abs_diff(b.saturation)
}

/// Weighted per-axis L\*a\*b\* distance, saturating at 255.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn perceptual_difference(a: Rgb<u8>, b: Rgb<u8>) -> u8 {
    let [la, aa, ba] = color::lab(a).to_byte_scale();
    let [lb, ab, bb] = color::lab(b).to_byte_scale();
    let combined = PERCEPTUAL_CHROMA_WEIGHT.mul_add(
        (ba - bb).abs(),
        PERCEPTUAL_CHROMA_WEIGHT.mul_add(
            (aa - ab).abs(),
            PERCEPTUAL_LIGHTNESS_WEIGHT * (la - lb).abs(),
        ),
    );
    combined.round().clamp(0.0, 255.0) as u8
}

/// Copy the original's pixels into `altered` over the ignore region.
///
/// Run before smoothing so differences inside the region cannot bleed
/// out of it through the blur kernel.
pub fn neutralize_ignore_region(
    original: &RgbImage,
    altered: &mut RgbImage,
    region: Option<BoundingBox>,
) {
    let Some(rect) = region else {
        return;
    };
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            altered.put_pixel(x, y, *original.get_pixel(x, y));
        }
    }
}

/// Force every pixel of `region` off.
pub fn clear_region(mask: &mut GrayImage, region: Option<BoundingBox>) {
    let Some(rect) = region else {
        return;
    };
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            mask.put_pixel(x, y, Luma([0]));
        }
    }
}

/// Number of on pixels.
#[must_use]
pub fn count_on(mask: &GrayImage) -> u64 {
    mask.pixels().map(|p| u64::from(p.0[0] == ON)).sum()
}

/// Build the thresholded union of all enabled channels.
///
/// Both images must have the same dimensions. The ignore region (if
/// any) is cleared in the union and in every channel mask.
#[must_use = "returns the difference mask and per-channel masks"]
pub fn difference_mask(
    original: &RgbImage,
    altered: &RgbImage,
    profile: &ParameterProfile,
    ignore: Option<BoundingBox>,
) -> (GrayImage, ChannelMasks) {
    let (w, h) = original.dimensions();
    let channels = profile.channels;
    let need_hsv = channels.hue || channels.saturation;

    let mut per_channel = ChannelMasks::for_channels(channels, w, h);
    let mut mask = GrayImage::new(w, h);

    for (x, y, pa) in original.enumerate_pixels() {
        let pb = *altered.get_pixel(x, y);
        let pa = *pa;
        let mut on = false;

        if channels.luma && luma_difference(pa, pb) > profile.luma_threshold {
            set_on(&mut per_channel.luma, x, y);
            on = true;
        }
        if need_hsv {
            let (ha, hb) = (color::hsv(pa), color::hsv(pb));
            if channels.hue
                && hue_difference(&ha, &hb).is_some_and(|d| d > profile.hue_threshold)
            {
                set_on(&mut per_channel.hue, x, y);
                on = true;
            }
            if channels.saturation
                && saturation_difference(&ha, &hb) > profile.saturation_threshold
            {
                set_on(&mut per_channel.saturation, x, y);
                on = true;
            }
        }
        if channels.perceptual
            && perceptual_difference(pa, pb) > profile.perceptual_threshold
        {
            set_on(&mut per_channel.perceptual, x, y);
            on = true;
        }

        if on {
            mask.put_pixel(x, y, Luma([ON]));
        }
    }

    clear_region(&mut mask, ignore);
    per_channel.clear_region(ignore);
    (mask, per_channel)
}
