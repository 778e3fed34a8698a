//! Gaussian smoothing applied to both images before differencing.
//!
//! Smoothing suppresses compression artifacts and anti-aliasing noise
//! that would otherwise show up as scattered single-pixel differences.
//! The amount is expressed as a kernel size (as in most image tools)
//! and converted to a Gaussian sigma for
//! [`imageproc::filter::gaussian_blur_f32`].

use image::{GrayImage, RgbImage};

/// Coerce a requested kernel size to an odd value of at least 1.
///
/// Zero becomes 1 and even sizes are rounded up to the next odd size.
/// Negative sizes are rejected earlier by profile validation; here they
/// are treated as 1.
#[must_use]
pub fn effective_kernel_size(requested: i32) -> u32 {
    let k = u32::try_from(requested).unwrap_or(0).max(1);
    if k % 2 == 0 { k + 1 } else { k }
}

/// Gaussian sigma for an odd kernel size.
///
/// Uses the conventional `0.3 * ((k - 1) * 0.5 - 1) + 0.8` rule, so a
/// 5×5 kernel gives sigma 1.1.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sigma_for_kernel(kernel_size: u32) -> f32 {
    let k = kernel_size as f32;
    0.3f32.mul_add((k - 1.0).mul_add(0.5, -1.0), 0.8)
}

/// Blur an RGB image by blurring each channel independently.
///
/// A kernel size of 1 (after coercion) returns the image unchanged.
#[must_use = "returns the blurred RGB image"]
pub fn smooth(image: &RgbImage, kernel_size: i32) -> RgbImage {
    let k = effective_kernel_size(kernel_size);
    if k <= 1 {
        return image.clone();
    }
    let sigma = sigma_for_kernel(k);

    let (w, h) = image.dimensions();

    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
    });

    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}
