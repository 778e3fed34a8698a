//! Shared types for the spotdiff detection pipeline.

use serde::{Deserialize, Serialize};

use crate::mask::ChannelMasks;

/// Re-export `GrayImage` so downstream crates can reference masks
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can reference the loaded
/// image pair without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of any `image` buffer.
    #[must_use]
    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// An axis-aligned rectangle in pixel coordinates.
///
/// Covers columns `x..x + width` and rows `y..y + height`. Boxes produced
/// by the pipeline always lie inside the image they were extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl BoundingBox {
    /// Create a new box.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge (exclusive).
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Bottom edge (exclusive).
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether `self` lies entirely within `other` (edges may touch).
    #[must_use]
    pub const fn is_within(&self, other: &Self) -> bool {
        other.x <= self.x
            && other.y <= self.y
            && self.right() <= other.right()
            && self.bottom() <= other.bottom()
    }

    /// Whether the pixel at `(px, py)` lies inside the box.
    #[must_use]
    pub const fn contains_point(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// The minimal box enclosing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right - x, bottom - y)
    }

    /// Grow the box by `amount` on every side, clipped to `bounds`.
    #[must_use]
    pub fn padded(&self, amount: u32, bounds: Dimensions) -> Self {
        let x = self.x.saturating_sub(amount);
        let y = self.y.saturating_sub(amount);
        let right = self.right().saturating_add(amount).min(bounds.width);
        let bottom = self.bottom().saturating_add(amount).min(bounds.height);
        Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// A `size`×`size` box centered on `(cx, cy)`, clipped to `bounds`.
    #[must_use]
    pub fn centered(cx: u32, cy: u32, size: u32, bounds: Dimensions) -> Self {
        let half = size / 2;
        let x = cx.saturating_sub(half).min(bounds.width);
        let y = cy.saturating_sub(half).min(bounds.height);
        let right = cx.saturating_add(size - half).min(bounds.width);
        let bottom = cy.saturating_add(size - half).min(bounds.height);
        Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }
}

/// A connected component extracted from a difference mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Minimal bounding box of the component.
    pub bbox: BoundingBox,
    /// Number of pixels in the component after hole filling.
    pub area: u64,
}

/// A normalized, serializable difference hotspot.
///
/// Pixel fields describe the final (padded) box; `relative_*` fields are
/// fractions of the image size rounded to four decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    /// 1-based identifier in final-box order.
    pub id: u32,
    /// Box left edge in pixels.
    pub x: u32,
    /// Box top edge in pixels.
    pub y: u32,
    /// Box width in pixels.
    pub width: u32,
    /// Box height in pixels.
    pub height: u32,
    /// Box center column in pixels.
    pub center_x: u32,
    /// Box center row in pixels.
    pub center_y: u32,
    /// Center column as a fraction of image width.
    pub relative_x: f64,
    /// Center row as a fraction of image height.
    pub relative_y: f64,
    /// Tap radius as a fraction of image width.
    pub relative_radius: f64,
}

impl Spot {
    /// The pixel box this spot was built from.
    #[must_use]
    pub const fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.width, self.height)
    }
}

/// An original image and its altered counterpart, with equal dimensions.
///
/// Construct through [`crate::load::decode_pair`] or
/// [`ImagePair::reconciled`] so the dimension invariant holds.
#[derive(Debug, Clone)]
pub struct ImagePair {
    original: RgbImage,
    altered: RgbImage,
}

impl ImagePair {
    /// Pair two decoded images, resampling `altered` to the original's
    /// dimensions when they differ.
    #[must_use]
    pub fn reconciled(original: RgbImage, altered: RgbImage) -> Self {
        let altered = crate::load::reconcile(&original, altered);
        Self { original, altered }
    }

    /// The reference image.
    #[must_use]
    pub const fn original(&self) -> &RgbImage {
        &self.original
    }

    /// The image containing the differences.
    #[must_use]
    pub const fn altered(&self) -> &RgbImage {
        &self.altered
    }

    /// Shared dimensions of both images.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.original)
    }
}

/// Result of running the full detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detected spots in final-box order.
    pub spots: Vec<Spot>,
    /// Dimensions of the original image in pixels.
    pub dimensions: Dimensions,
}

/// Result of running the pipeline with every intermediate preserved.
///
/// Used by debug rendering and the tuning session, which need the masks
/// and the boxes before padding alongside the final spots.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// The reconciled input pair.
    pub pair: ImagePair,
    /// Blurred original.
    pub smoothed_original: RgbImage,
    /// Blurred altered image (ignore region neutralized).
    pub smoothed_altered: RgbImage,
    /// Thresholded mask of each enabled channel.
    pub channel_masks: ChannelMasks,
    /// Union of the channel masks before morphology.
    pub raw_mask: GrayImage,
    /// Mask after morphological cleanup.
    pub mask: GrayImage,
    /// Components surviving the area and shape filters.
    pub regions: Vec<Region>,
    /// Boxes after merging and pruning, before padding.
    pub consolidated: Vec<BoundingBox>,
    /// Final padded boxes.
    pub boxes: Vec<BoundingBox>,
    /// Normalized output.
    pub spots: Vec<Spot>,
    /// Image dimensions in pixels.
    pub dimensions: Dimensions,
}

impl StagedResult {
    /// Drop the intermediates, keeping only the output.
    #[must_use]
    pub fn into_detection(self) -> Detection {
        Detection {
            spots: self.spots,
            dimensions: self.dimensions,
        }
    }
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode an input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Parameter profile is invalid.
    #[error("invalid parameter profile: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: Dimensions = Dimensions {
        width: 100,
        height: 80,
    };

    #[test]
    fn right_and_bottom_are_exclusive() {
        let b = BoundingBox::new(10, 20, 5, 7);
        assert_eq!(b.right(), 15);
        assert_eq!(b.bottom(), 27);
        assert!(b.contains_point(14, 26));
        assert!(!b.contains_point(15, 26));
        assert!(!b.contains_point(14, 27));
    }

    #[test]
    fn union_is_minimal_enclosing_box() {
        let a = BoundingBox::new(10, 10, 10, 10);
        let b = BoundingBox::new(30, 5, 5, 30);
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(10, 5, 25, 30));
        assert!(a.is_within(&u));
        assert!(b.is_within(&u));
    }

    #[test]
    fn is_within_allows_shared_edges() {
        let outer = BoundingBox::new(0, 0, 10, 10);
        assert!(outer.is_within(&outer));
        assert!(BoundingBox::new(0, 0, 10, 5).is_within(&outer));
        assert!(!BoundingBox::new(1, 1, 10, 5).is_within(&outer));
    }

    #[test]
    fn padded_clips_to_bounds() {
        let b = BoundingBox::new(5, 70, 10, 8);
        let p = b.padded(10, BOUNDS);
        assert_eq!(p, BoundingBox::new(0, 60, 25, 20));
    }

    #[test]
    fn padded_interior_grows_symmetrically() {
        let b = BoundingBox::new(40, 30, 20, 20);
        assert_eq!(b.padded(10, BOUNDS), BoundingBox::new(30, 20, 40, 40));
    }

    #[test]
    fn centered_box_clipped_at_corner() {
        let b = BoundingBox::centered(5, 78, 40, BOUNDS);
        assert_eq!(b, BoundingBox::new(0, 58, 25, 22));
        let interior = BoundingBox::centered(50, 40, 40, BOUNDS);
        assert_eq!(interior, BoundingBox::new(30, 20, 40, 40));
    }

    #[test]
    fn dimensions_pixel_count() {
        assert_eq!(BOUNDS.pixel_count(), 8000);
    }

    #[test]
    fn spot_bbox_round_trips_pixel_fields() {
        let spot = Spot {
            id: 1,
            x: 3,
            y: 4,
            width: 5,
            height: 6,
            center_x: 5,
            center_y: 7,
            relative_x: 0.0,
            relative_y: 0.0,
            relative_radius: 0.0,
        };
        assert_eq!(spot.bbox(), BoundingBox::new(3, 4, 5, 6));
    }

    #[test]
    fn pipeline_error_messages() {
        assert_eq!(
            PipelineError::EmptyInput.to_string(),
            "input image data is empty"
        );
        assert!(
            PipelineError::InvalidConfig("bad".to_string())
                .to_string()
                .contains("bad")
        );
    }
}
