//! Debug image rendering.
//!
//! [`annotate`] draws the final spots over a copy of the original: a
//! thick red outline per box, its 1-based id in a built-in 5x7 digit
//! font, and a green dot at the center. The ignore region, when present,
//! is outlined in gray and crossed out.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use spotdiff_pipeline::{BoundingBox, Spot};

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const IGNORE_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

/// Outline thickness in pixels.
const STROKE: u32 = 3;
const CENTER_RADIUS: i32 = 5;
/// Each font pixel becomes a `LABEL_SCALE`×`LABEL_SCALE` block.
const LABEL_SCALE: u32 = 3;
const LABEL_INSET: u32 = 5;

/// Draw spots (and optionally the ignore region) over `original`.
#[must_use]
pub fn annotate(original: &RgbImage, spots: &[Spot], ignore: Option<BoundingBox>) -> RgbImage {
    let mut img = original.clone();

    if let Some(region) = ignore {
        outline(&mut img, region, 1, IGNORE_COLOR);
        cross(&mut img, region, IGNORE_COLOR);
    }

    for spot in spots {
        outline(&mut img, spot.bbox(), STROKE, BOX_COLOR);
        draw_label(
            &mut img,
            &spot.id.to_string(),
            spot.x + LABEL_INSET,
            spot.y + LABEL_INSET,
            BOX_COLOR,
        );
        draw_filled_circle_mut(
            &mut img,
            (signed(spot.center_x), signed(spot.center_y)),
            CENTER_RADIUS,
            CENTER_COLOR,
        );
    }
    img
}

/// Binarize a mask for viewing: any nonzero pixel becomes white.
#[must_use]
pub fn render_mask(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y).0[0] == 0 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Blend [`BOX_COLOR`] at half strength into every masked pixel.
///
/// `mask` must have the dimensions of `base`; extra mask pixels are
/// ignored.
#[must_use]
pub fn overlay_mask(base: &RgbImage, mask: &GrayImage) -> RgbImage {
    let mut img = base.clone();
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let on = mask.get_pixel_checked(x, y).is_some_and(|m| m.0[0] != 0);
        if on {
            for (c, tint) in pixel.0.iter_mut().zip(BOX_COLOR.0) {
                *c = c.midpoint(tint);
            }
        }
    }
    img
}

fn signed(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Hollow rectangle `thickness` pixels wide, growing outward from `b`.
fn outline(img: &mut RgbImage, b: BoundingBox, thickness: u32, color: Rgb<u8>) {
    if b.width == 0 || b.height == 0 {
        return;
    }
    for offset in 0..thickness {
        let rect = Rect::at(signed(b.x) - signed(offset), signed(b.y) - signed(offset))
            .of_size(b.width + offset * 2, b.height + offset * 2);
        draw_hollow_rect_mut(img, rect, color);
    }
}

#[allow(clippy::cast_precision_loss)]
fn cross(img: &mut RgbImage, b: BoundingBox, color: Rgb<u8>) {
    if b.width == 0 || b.height == 0 {
        return;
    }
    let (left, top) = (b.x as f32, b.y as f32);
    let (right, bottom) = ((b.right() - 1) as f32, (b.bottom() - 1) as f32);
    draw_line_segment_mut(img, (left, top), (right, bottom), color);
    draw_line_segment_mut(img, (right, top), (left, bottom), color);
}

/// 5x7 digit glyphs, one row per byte, most significant of the low five
/// bits on the left.
const fn glyph(c: char) -> Option<[u8; 7]> {
    Some(match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00110, 0b01000, 0b10000, 0b11111],
        '3' => [0b01110, 0b10001, 0b00001, 0b00110, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b01110, 0b10000, 0b11110, 0b10001, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00001, 0b01110],
        _ => return None,
    })
}

/// Draw digits at `(x, y)`, clipped to the image. Other characters
/// advance the cursor without drawing.
fn draw_label(img: &mut RgbImage, text: &str, x: u32, y: u32, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    let mut cursor = x;
    for c in text.chars() {
        if let Some(rows) = glyph(c) {
            for (row, bits) in (0u32..).zip(rows) {
                for col in 0..5u32 {
                    if (bits >> (4 - col)) & 1 == 0 {
                        continue;
                    }
                    for dy in 0..LABEL_SCALE {
                        for dx in 0..LABEL_SCALE {
                            let px = cursor + col * LABEL_SCALE + dx;
                            let py = y + row * LABEL_SCALE + dy;
                            if px < w && py < h {
                                img.put_pixel(px, py, color);
                            }
                        }
                    }
                }
            }
        }
        cursor += 6 * LABEL_SCALE;
    }
}
