use super::*;

fn r(l: i32, t: i32, rr: i32, b: i32) -> PxRect {
    PxRect::new(l, t, rr, b)
}

#[test]
fn visible_pixels_clip_to_bounds() {
    let bounds = r(0, 0, 100, 100);
    assert_eq!(visible_pixels(r(-50, 0, 50, 10), bounds), 500);
    assert_eq!(visible_pixels(r(200, 200, 300, 300), bounds), 0);
}

#[test]
fn depth_counts_candidate_alone() {
    assert_eq!(overlap_depth_with(&[], r(0, 0, 10, 10)), 1);
    assert_eq!(overlap_depth_with(&[r(20, 20, 30, 30)], r(0, 0, 10, 10)), 1);
}

#[test]
fn pairwise_overlaps_without_common_point_stay_at_two() {
    // Two disjoint rects each overlapping the candidate.
    let placed = [r(0, 0, 10, 10), r(20, 0, 30, 10)];
    assert_eq!(overlap_depth_with(&placed, r(5, 0, 25, 10)), 2);
}

#[test]
fn stacked_rects_reach_full_depth() {
    let placed = [r(0, 0, 10, 10), r(2, 2, 12, 12)];
    assert_eq!(overlap_depth_with(&placed, r(5, 5, 8, 8)), 3);
    assert_eq!(max_overlap_depth(&[r(0, 0, 10, 10), r(2, 2, 12, 12), r(5, 5, 8, 8)]), 3);
}

#[test]
fn bounding_rect_skips_empties() {
    assert_eq!(bounding_rect([]), None);
    assert_eq!(
        bounding_rect([r(0, 0, 0, 0), r(5, 5, 10, 10), r(0, 20, 2, 30)]),
        Some(r(0, 5, 10, 30))
    );
}
