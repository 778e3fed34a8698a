//! Morphological cleanup of the difference mask.
//!
//! Opening (erode then dilate) removes specks left by compression noise;
//! closing (dilate then erode) fills gaps so one changed object becomes
//! one connected region. Both use [`imageproc::morphology`] with a
//! structuring element of radius `(kernel_size - 1) / 2`.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};

use crate::profile::ParameterProfile;

/// Largest kernel size whose radius fits the `u8` `imageproc` takes.
pub const MAX_KERNEL_SIZE: i32 = 511;

/// Radius of a structuring element for an odd-ish kernel size.
///
/// Kernel sizes 0 and 1 give radius 0 (identity). Sizes above
/// [`MAX_KERNEL_SIZE`] are rejected by [`ParameterProfile::validate`].
#[must_use]
pub fn radius_for_kernel(kernel_size: i32) -> u8 {
    let size = u32::try_from(kernel_size).unwrap_or(0);
    u8::try_from(size.saturating_sub(1) / 2).unwrap_or(u8::MAX)
}

/// Erode `iterations` times, then dilate `iterations` times.
#[must_use = "returns the opened mask"]
pub fn open(mask: &GrayImage, norm: Norm, radius: u8, iterations: u32) -> GrayImage {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = erode(&out, norm, radius);
    }
    for _ in 0..iterations {
        out = dilate(&out, norm, radius);
    }
    out
}

/// Dilate `iterations` times, then erode `iterations` times.
#[must_use = "returns the closed mask"]
pub fn close(mask: &GrayImage, norm: Norm, radius: u8, iterations: u32) -> GrayImage {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = dilate(&out, norm, radius);
    }
    for _ in 0..iterations {
        out = erode(&out, norm, radius);
    }
    out
}

/// Apply the profile's opening, closing and optional separation erosion.
#[must_use = "returns the cleaned mask"]
pub fn clean(mask: &GrayImage, profile: &ParameterProfile) -> GrayImage {
    let norm = profile.structuring_element.norm();
    let radius = radius_for_kernel(profile.morph_kernel_size);

    let mut out = if radius == 0 {
        mask.clone()
    } else {
        let opened = open(mask, norm, radius, profile.open_iterations);
        close(&opened, norm, radius, profile.close_iterations)
    };

    let separation = radius_for_kernel(profile.separation_erode_size);
    if separation > 0 {
        out = erode(&out, Norm::LInf, separation);
    }
    out
}
