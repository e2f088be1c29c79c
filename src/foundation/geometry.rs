//! Pure rectangle predicates used by the classifier and the allocator.

use crate::foundation::core::PxRect;

/// Part of `frame` that lands on the display, `None` when fully off-screen.
pub fn visible_rect(frame: PxRect, bounds: PxRect) -> Option<PxRect> {
    frame.intersect(bounds)
}

/// Pixel count of `frame` that lands on the display.
pub fn visible_pixels(frame: PxRect, bounds: PxRect) -> u64 {
    visible_rect(frame, bounds).map_or(0, PxRect::area)
}

/// Largest number of rectangles sharing a common point, counting `candidate` itself.
///
/// Axis-aligned rectangles that intersect pairwise always share a common point, so this is also
/// the size of the largest set of mutually overlapping rectangles that includes `candidate`.
pub fn overlap_depth_with(placed: &[PxRect], candidate: PxRect) -> usize {
    fn depth(region: PxRect, rest: &[PxRect]) -> usize {
        let Some((head, tail)) = rest.split_first() else {
            return 0;
        };
        let without = depth(region, tail);
        match region.intersect(*head) {
            Some(shared) => without.max(1 + depth(shared, tail)),
            None => without,
        }
    }

    if candidate.is_empty() {
        return 0;
    }
    1 + depth(candidate, placed)
}

/// Largest number of mutually overlapping rectangles in `rects`.
pub fn max_overlap_depth(rects: &[PxRect]) -> usize {
    (0..rects.len())
        .map(|i| overlap_depth_with(&rects[i + 1..], rects[i]))
        .max()
        .unwrap_or(0)
}

/// Bounding box of all non-empty rectangles, `None` when there are none.
pub fn bounding_rect(rects: impl IntoIterator<Item = PxRect>) -> Option<PxRect> {
    rects
        .into_iter()
        .filter(|r| !r.is_empty())
        .reduce(PxRect::union)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/geometry.rs"]
mod tests;
