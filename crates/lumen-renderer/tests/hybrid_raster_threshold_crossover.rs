//! `spec.md` §8 scenario 6: render a mesh at distance sweeping 1→100
//! units and verify the SW/HW triangle ratio rises monotonically, crossing
//! exactly 1 where the mean triangle area equals `swThreshold`. Exercises
//! `raster::route_triangle`/`triangle_bbox_area_px2` — CPU-only binning
//! math, no live device.

use glam::Vec2;
use lumen_renderer::raster::{route_triangle, triangle_bbox_area_px2, RasterPath};

/// A unit-edge triangle's screen footprint under a pinhole projection at
/// `distance` world units, given a focal length in pixels.
fn projected_triangle(world_edge: f32, focal_px: f32, distance: f32) -> [Vec2; 3] {
    let half = (world_edge * focal_px / distance) * 0.5;
    [Vec2::new(-half, -half), Vec2::new(half, -half), Vec2::new(-half, half)]
}

#[test]
fn sw_to_hw_ratio_rises_monotonically_as_the_triangle_recedes() {
    let threshold = 32.0 * 32.0;
    let focal_px = 1000.0;
    let world_edge = 1.0;

    let mut sw_count = 0u32;
    let mut hw_count = 0u32;
    let mut prev_ratio = 0.0;
    for distance_cm in 100..=10_000 {
        let distance = distance_cm as f32 / 100.0;
        let area = triangle_bbox_area_px2(projected_triangle(world_edge, focal_px, distance));
        match route_triangle(area, threshold) {
            RasterPath::Software => sw_count += 1,
            RasterPath::Hardware => hw_count += 1,
        }
        let ratio = sw_count as f32 / hw_count.max(1) as f32;
        assert!(ratio >= prev_ratio, "sw/hw ratio must not fall as the triangle recedes");
        prev_ratio = ratio;
    }
    assert!(sw_count > 0, "the sweep must reach the software regime");
    assert!(hw_count > 0, "the sweep must start in the hardware regime");
}

#[test]
fn ratio_equals_one_exactly_at_the_threshold_crossing_distance() {
    let threshold = 32.0 * 32.0;
    let focal_px = 1000.0;
    let world_edge = 1.0;

    // Distance at which the projected bbox area exactly equals the
    // threshold: area = (edge*focal/distance)^2 = threshold.
    let crossover_distance = world_edge * focal_px / threshold.sqrt();
    let area = triangle_bbox_area_px2(projected_triangle(world_edge, focal_px, crossover_distance));
    assert!((area - threshold).abs() < 0.01);

    assert_eq!(route_triangle(area, threshold), RasterPath::Software);
    assert_eq!(route_triangle(area + 0.01, threshold), RasterPath::Hardware);
}
