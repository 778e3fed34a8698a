//! Per-pixel color representations used by the signal channels.
//!
//! All conversions take 8-bit sRGB and produce values on the scales the
//! thresholds are expressed in:
//!
//! - luma: 0–255 (Rec. 601 weights),
//! - HSV: hue in degrees `[0, 360)`, saturation and value 0–255,
//! - CIE L\*a\*b\* (D65): `L` 0–100, `a`/`b` roughly ±128.

use image::Rgb;

/// Saturation (0–255) at or below which hue is considered undefined.
pub const HUE_SATURATION_FLOOR: u8 = 30;

/// D65 reference white.
const D65_X: f32 = 0.950_47;
const D65_Y: f32 = 1.0;
const D65_Z: f32 = 1.088_83;

/// Linear sRGB to XYZ (D65).
#[allow(clippy::unreadable_literal)]
const SRGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

/// Rec. 601 luma, rounded to the nearest integer.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn luma(pixel: Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0.map(f32::from);
    0.114f32
        .mul_add(b, 0.299f32.mul_add(r, 0.587 * g))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// A pixel in HSV space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    /// Hue angle in degrees, `[0, 360)`. Zero for achromatic pixels.
    pub hue: f32,
    /// Saturation, 0–255.
    pub saturation: u8,
    /// Value (max channel), 0–255.
    pub value: u8,
}

impl Hsv {
    /// Whether this pixel carries enough color for its hue to mean anything.
    #[must_use]
    pub const fn is_chromatic(&self) -> bool {
        self.saturation > HUE_SATURATION_FLOOR
    }
}

/// Convert an sRGB pixel to HSV.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hsv(pixel: Rgb<u8>) -> Hsv {
    let [r, g, b] = pixel.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = f32::from(max - min);

    let saturation = if max == 0 {
        0
    } else {
        (chroma * 255.0 / f32::from(max)).round() as u8
    };

    let hue = if max == min {
        0.0
    } else {
        let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
        let sector = if max == pixel.0[0] {
            (g - b) / chroma
        } else if max == pixel.0[1] {
            (b - r) / chroma + 2.0
        } else {
            (r - g) / chroma + 4.0
        };
        (sector * 60.0).rem_euclid(360.0)
    };

    Hsv {
        hue,
        saturation,
        value: max,
    }
}

/// Circular distance between two hue angles in degrees, `0..=180`.
#[must_use]
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}

/// A pixel in CIE L\*a\*b\* space (D65).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    /// Lightness, 0–100.
    pub l: f32,
    /// Green–red axis.
    pub a: f32,
    /// Blue–yellow axis.
    pub b: f32,
}

impl Lab {
    /// Rescale to the common 8-bit encoding: `L·255/100`, `a+128`, `b+128`.
    #[must_use]
    pub fn to_byte_scale(self) -> [f32; 3] {
        [self.l * 255.0 / 100.0, self.a + 128.0, self.b + 128.0]
    }
}

/// Convert an sRGB pixel to CIE L\*a\*b\*.
#[must_use]
pub fn lab(pixel: Rgb<u8>) -> Lab {
    let [r, g, b] = pixel.0.map(srgb_to_linear);
    let m = &SRGB_TO_XYZ;
    let x = m[0][2].mul_add(b, m[0][0].mul_add(r, m[0][1] * g)) / D65_X;
    let y = m[1][2].mul_add(b, m[1][0].mul_add(r, m[1][1] * g)) / D65_Y;
    let z = m[2][2].mul_add(b, m[2][0].mul_add(r, m[2][1] * g)) / D65_Z;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    Lab {
        l: 116.0f32.mul_add(fy, -16.0),
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// sRGB transfer function inverse, 8-bit in, linear `[0, 1]` out.
fn srgb_to_linear(channel: u8) -> f32 {
    let c = f32::from(channel) / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// The CIE L\*a\*b\* companding function.
fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}
