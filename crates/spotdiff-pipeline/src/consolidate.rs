//! Region consolidation: proximity merging, containment pruning, padding.
//!
//! Raw component boxes over-segment real differences (a recolored shirt
//! with a pattern yields many small components) and may nest inside
//! each other. Consolidation turns them into a small set of boxes that
//! each represent one semantic change.
//!
//! Merging is transitive: if A is close to B and B is close to C, all
//! three end up in one box even when A and C are far apart. One pass is
//! a connected-components problem over the "is close" relation, solved
//! with a disjoint-set forest.
//!
//! A single pass is not enough. Each group collapses to its union box,
//! and that larger box can be close to another group's box although no
//! member pair was. [`merge_until_stable`] therefore repeats the pass on
//! its own output until the box count stops shrinking; only then are the
//! boxes pairwise non-close.

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, Dimensions};

/// Order in which merging and containment pruning are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsolidationStrategy {
    /// Merge close boxes only.
    MergeOnly,
    /// Drop enclosed boxes, then merge the rest.
    #[default]
    PruneThenMerge,
    /// Merge first, then drop boxes left enclosed by a merged box.
    MergeThenPrune,
    /// Drop enclosed boxes only.
    PruneOnly,
}

/// Whether `a`, grown by `distance` on every side, strictly overlaps `b`.
///
/// Symmetric in `a` and `b`. Boxes that merely touch after growing are
/// not close.
#[must_use]
pub fn is_close(a: &BoundingBox, b: &BoundingBox, distance: u32) -> bool {
    let d = i64::from(distance);
    let (ax, ay) = (i64::from(a.x), i64::from(a.y));
    let (ar, ab) = (i64::from(a.right()), i64::from(a.bottom()));
    let (bx, by) = (i64::from(b.x), i64::from(b.y));
    let (br, bb) = (i64::from(b.right()), i64::from(b.bottom()));

    ax - d < br && bx < ar + d && ay - d < bb && by < ab + d
}

/// One union-find pass: group boxes connected through the close
/// relation and collapse each group to its enclosing box.
///
/// All pairwise relations are evaluated against the input boxes before
/// any group is collapsed. Groups are emitted in order of their first
/// member.
#[must_use]
pub fn merge_close(boxes: &[BoundingBox], distance: u32) -> Vec<BoundingBox> {
    let n = boxes.len();
    let mut sets = UnionFind::<usize>::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if is_close(&boxes[i], &boxes[j], distance) {
                sets.union(i, j);
            }
        }
    }

    let mut group_of_root: Vec<Option<usize>> = vec![None; n];
    let mut merged: Vec<BoundingBox> = Vec::new();
    for (i, bbox) in boxes.iter().enumerate() {
        let root = sets.find_mut(i);
        match group_of_root[root] {
            Some(g) => merged[g] = merged[g].union(bbox),
            None => {
                group_of_root[root] = Some(merged.len());
                merged.push(*bbox);
            }
        }
    }
    merged
}

/// Merge until no two boxes are close.
///
/// A collapsed group can grow close to another group, so [`merge_close`]
/// is repeated on its own output until the count stops shrinking. Each
/// round removes at least one box, bounding the loop by the input size.
#[must_use]
pub fn merge_until_stable(boxes: &[BoundingBox], distance: u32) -> Vec<BoundingBox> {
    let mut current = merge_close(boxes, distance);
    loop {
        let next = merge_close(&current, distance);
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

/// Remove every box enclosed by another box (edges may coincide).
///
/// Of several identical boxes exactly one, the first, survives.
#[must_use]
pub fn prune_contained(boxes: &[BoundingBox]) -> Vec<BoundingBox> {
    boxes
        .iter()
        .enumerate()
        .filter(|&(i, bbox)| {
            !boxes.iter().enumerate().any(|(j, other)| {
                j != i && bbox.is_within(other) && (bbox != other || j < i)
            })
        })
        .map(|(_, bbox)| *bbox)
        .collect()
}

/// Grow every box by `padding`, clipped to the image.
#[must_use]
pub fn pad(boxes: &[BoundingBox], padding: u32, bounds: Dimensions) -> Vec<BoundingBox> {
    boxes.iter().map(|b| b.padded(padding, bounds)).collect()
}

/// Merge and prune according to `strategy`, then sort into reading order
/// (top to bottom, left to right).
///
/// The output is pairwise non-close whenever merging is part of the
/// strategy, free of enclosed boxes whenever pruning is, and does not
/// depend on the order of the input.
#[must_use]
pub fn consolidate(
    boxes: &[BoundingBox],
    distance: u32,
    strategy: ConsolidationStrategy,
) -> Vec<BoundingBox> {
    let mut out = match strategy {
        ConsolidationStrategy::MergeOnly => merge_until_stable(boxes, distance),
        ConsolidationStrategy::PruneThenMerge => {
            merge_until_stable(&prune_contained(boxes), distance)
        }
        ConsolidationStrategy::MergeThenPrune => {
            prune_contained(&merge_until_stable(boxes, distance))
        }
        ConsolidationStrategy::PruneOnly => prune_contained(boxes),
    };
    out.sort_by_key(|b| (b.y, b.x, b.height, b.width));
    out
}
