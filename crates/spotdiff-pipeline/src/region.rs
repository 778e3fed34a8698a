//! Region extraction: connected components of the cleaned mask.
//!
//! Only outer boundaries matter. A ring-shaped difference (a changed
//! picture frame) is one region, and anything drawn inside its hole is
//! part of it. This is achieved by filling holes before labelling:
//! background pixels that cannot reach the image border through
//! 4-connected background become foreground. Foreground is then
//! labelled with 8-connectivity, the dual of 4-connected background.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::mask::ON;
use crate::profile::ParameterProfile;
use crate::types::{BoundingBox, Dimensions, Region};

/// `connected_components` needs at least two pixels.
fn is_degenerate(mask: &GrayImage) -> bool {
    u64::from(mask.width()) * u64::from(mask.height()) < 2
}

/// Fill every background hole enclosed by foreground.
#[must_use = "returns the hole-filled mask"]
pub fn fill_holes(mask: &GrayImage) -> GrayImage {
    // A single pixel lies on the border and cannot enclose anything.
    if is_degenerate(mask) {
        return mask.clone();
    }
    let (w, h) = mask.dimensions();
    // Label the background: with ON as the "background" color the zero
    // pixels are the components.
    let background = connected_components(mask, Connectivity::Four, Luma([ON]));

    let mut touches_border = vec![false; 1];
    let mut mark = |label: u32| {
        let i = label as usize;
        if i >= touches_border.len() {
            touches_border.resize(i + 1, false);
        }
        touches_border[i] = true;
    };
    for x in 0..w {
        mark(background.get_pixel(x, 0).0[0]);
        mark(background.get_pixel(x, h.saturating_sub(1)).0[0]);
    }
    for y in 0..h {
        mark(background.get_pixel(0, y).0[0]);
        mark(background.get_pixel(w.saturating_sub(1), y).0[0]);
    }

    GrayImage::from_fn(w, h, |x, y| {
        let label = background.get_pixel(x, y).0[0];
        let is_foreground = mask.get_pixel(x, y).0[0] == ON;
        let is_hole = label != 0 && !touches_border.get(label as usize).copied().unwrap_or(false);
        if is_foreground || is_hole {
            Luma([ON])
        } else {
            Luma([0])
        }
    })
}

/// Label 8-connected components of a hole-filled mask.
///
/// Each component becomes a [`Region`] with its minimal bounding box
/// and pixel count. Order follows label order and carries no meaning.
#[must_use]
pub fn label_regions(filled: &GrayImage) -> Vec<Region> {
    if is_degenerate(filled) {
        return filled
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] != 0)
            .map(|(x, y, _)| Region {
                bbox: BoundingBox::new(x, y, 1, 1),
                area: 1,
            })
            .collect();
    }
    let labels = connected_components(filled, Connectivity::Eight, Luma([0]));

    // (min_x, min_y, max_x, max_y, area) per label; index 0 unused.
    let mut acc: Vec<Option<(u32, u32, u32, u32, u64)>> = Vec::new();
    for (x, y, p) in labels.enumerate_pixels() {
        let label = p.0[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= acc.len() {
            acc.resize(label + 1, None);
        }
        acc[label] = Some(match acc[label] {
            None => (x, y, x, y, 1),
            Some((x0, y0, x1, y1, n)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y), n + 1),
        });
    }

    acc.into_iter()
        .flatten()
        .map(|(x0, y0, x1, y1, area)| Region {
            bbox: BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1),
            area,
        })
        .collect()
}

/// Whether a region passes the profile's size filters.
#[must_use]
pub fn keep_region(region: &Region, profile: &ParameterProfile, dims: Dimensions) -> bool {
    let b = &region.bbox;
    if region.area < profile.min_area {
        return false;
    }
    if b.width < profile.min_box_side || b.height < profile.min_box_side {
        return false;
    }
    f64::from(b.width) <= f64::from(dims.width) * profile.max_width_fraction
}

/// Fill holes, label components and apply the size filters.
#[must_use]
pub fn extract_regions(mask: &GrayImage, profile: &ParameterProfile) -> Vec<Region> {
    let dims = Dimensions::of(mask);
    label_regions(&fill_holes(mask))
        .into_iter()
        .filter(|r| keep_region(r, profile, dims))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::count_on;

    fn draw_rect(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([ON]));
            }
        }
    }

    fn permissive() -> ParameterProfile {
        ParameterProfile {
            min_area: 1,
            ..ParameterProfile::default()
        }
    }

    #[test]
    fn empty_mask_has_no_regions() {
        let mask = GrayImage::new(10, 10);
        assert!(extract_regions(&mask, &permissive()).is_empty());
    }

    #[test]
    fn single_pixel_masks_do_not_panic() {
        let off = GrayImage::new(1, 1);
        assert_eq!(fill_holes(&off), off);
        assert!(label_regions(&off).is_empty());

        let on = GrayImage::from_pixel(1, 1, Luma([ON]));
        assert_eq!(fill_holes(&on), on);
        assert_eq!(
            label_regions(&on),
            vec![Region {
                bbox: BoundingBox::new(0, 0, 1, 1),
                area: 1,
            }]
        );
        assert!(label_regions(&GrayImage::new(0, 0)).is_empty());
    }

    #[test]
    fn two_separate_blobs() {
        let mut mask = GrayImage::new(40, 40);
        draw_rect(&mut mask, 2, 3, 5, 4);
        draw_rect(&mut mask, 20, 20, 10, 10);
        let mut regions = extract_regions(&mask, &permissive());
        regions.sort_by_key(|r| r.bbox.x);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bbox, BoundingBox::new(2, 3, 5, 4));
        assert_eq!(regions[0].area, 20);
        assert_eq!(regions[1].bbox, BoundingBox::new(20, 20, 10, 10));
        assert_eq!(regions[1].area, 100);
    }

    #[test]
    fn diagonal_neighbors_are_one_region() {
        let mut mask = GrayImage::new(10, 10);
        mask.put_pixel(2, 2, Luma([ON]));
        mask.put_pixel(3, 3, Luma([ON]));
        let regions = extract_regions(&mask, &permissive());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, BoundingBox::new(2, 2, 2, 2));
    }

    #[test]
    fn ring_hole_is_filled_and_inner_blob_absorbed() {
        let mut mask = GrayImage::new(30, 30);
        draw_rect(&mut mask, 5, 5, 20, 20);
        // Hollow out the middle, then put a blob back inside the hole.
        for y in 7..23 {
            for x in 7..23 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        draw_rect(&mut mask, 12, 12, 3, 3);

        let filled = fill_holes(&mask);
        assert_eq!(count_on(&filled), 400);

        let regions = extract_regions(&mask, &permissive());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, BoundingBox::new(5, 5, 20, 20));
        assert_eq!(regions[0].area, 400);
    }

    #[test]
    fn open_notch_is_not_a_hole() {
        let mut mask = GrayImage::new(20, 20);
        draw_rect(&mut mask, 5, 5, 10, 10);
        // Channel from the interior out through the top edge.
        for y in 5..10 {
            mask.put_pixel(10, y, Luma([0]));
        }
        let filled = fill_holes(&mask);
        assert_eq!(filled.get_pixel(10, 7).0[0], 0);
    }

    #[test]
    fn min_area_filters_small_regions() {
        let mut mask = GrayImage::new(40, 40);
        draw_rect(&mut mask, 0, 0, 3, 3);
        draw_rect(&mut mask, 20, 20, 10, 10);
        let profile = ParameterProfile {
            min_area: 50,
            ..ParameterProfile::default()
        };
        let regions = extract_regions(&mask, &profile);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 100);
    }

    #[test]
    fn shape_filters() {
        let dims = Dimensions {
            width: 100,
            height: 100,
        };
        let thin = Region {
            bbox: BoundingBox::new(0, 0, 50, 4),
            area: 200,
        };
        let wide = Region {
            bbox: BoundingBox::new(0, 0, 97, 30),
            area: 2910,
        };
        let profile = ParameterProfile {
            min_area: 1,
            min_box_side: 5,
            max_width_fraction: 0.95,
            ..ParameterProfile::default()
        };
        assert!(!keep_region(&thin, &profile, dims));
        assert!(!keep_region(&wide, &profile, dims));
        assert!(keep_region(&thin, &permissive(), dims));
        assert!(keep_region(&wide, &permissive(), dims));
    }
}
