//! Coordinate normalization: pixel boxes to resolution-independent spots.
//!
//! Consumers place circular tap targets, so each box is reduced to a
//! center and radius expressed as fractions of the image size. The
//! radius gets a margin so the tap circle is a little larger than the
//! box it came from.

use crate::types::{BoundingBox, Dimensions, Spot};

/// Multiplier applied to half the longer box side to get the tap radius.
pub const RADIUS_MARGIN: f64 = 1.2;

/// Round to four decimal places.
#[must_use]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Convert final boxes to spots with 1-based ids in box order.
///
/// `center_x`/`center_y` are integer pixel centers (`x + width / 2`);
/// relative coordinates are those centers divided by the image size.
#[must_use]
pub fn normalize(boxes: &[BoundingBox], dims: Dimensions) -> Vec<Spot> {
    let width = f64::from(dims.width.max(1));
    let height = f64::from(dims.height.max(1));

    boxes
        .iter()
        .zip(1u32..)
        .map(|(b, id)| {
            let center_x = b.x + b.width / 2;
            let center_y = b.y + b.height / 2;
            let half_side = f64::from(b.width.max(b.height)) / 2.0;
            Spot {
                id,
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                center_x,
                center_y,
                relative_x: round4(f64::from(center_x) / width),
                relative_y: round4(f64::from(center_y) / height),
                relative_radius: round4(half_side * RADIUS_MARGIN / width),
            }
        })
        .collect()
}
