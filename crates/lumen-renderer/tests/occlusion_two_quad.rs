//! `spec.md` §8 scenario 2: two opaque quads 10 units apart facing the
//! camera. Exercises the two-pass culler's occlusion test (`hzb_occludes`)
//! against a hand-built HZB strip — CPU-only, no live device.

use lumen_renderer::cull::hzb_occludes;

/// A single mip row of a reversed-Z HZB: one conservative-far depth sample
/// per screen column.
struct HzbRow {
    texels: Vec<f32>,
}

impl HzbRow {
    fn sample(&self, column: usize) -> f32 {
        self.texels[column]
    }
}

#[test]
fn far_quad_is_occluded_behind_near_quad_then_revealed_after_moving_laterally() {
    // The near quad covers columns 0..4 at depth 0.9 (close); the rest of
    // the row sees the empty background at depth 0.1.
    let hzb = HzbRow { texels: vec![0.9, 0.9, 0.9, 0.9, 0.1, 0.1, 0.1, 0.1] };
    let far_quad_depth = 0.1;

    // Far quad's clusters project onto a column still under the near
    // quad's footprint: occluded.
    let overlapping_column = 1;
    assert!(hzb_occludes(hzb.sample(overlapping_column), far_quad_depth));

    // After moving laterally out from behind the near quad, its clusters
    // project onto open background columns: no longer occluded.
    let moved_column = 5;
    assert!(!hzb_occludes(hzb.sample(moved_column), far_quad_depth));
}

#[test]
fn moving_the_occluder_within_one_frame_is_caught_by_the_post_pass() {
    let far_quad_depth = 0.1;
    let far_quad_column = 2;

    // Main pass tests against last frame's HZB, which still shows the near
    // quad covering this column: the far quad's clusters are culled here
    // for occlusion only, not rejected outright.
    let stale_hzb = HzbRow { texels: vec![0.9; 8] };
    assert!(hzb_occludes(stale_hzb.sample(far_quad_column), far_quad_depth));

    // The near quad moved away this frame. The post pass rebuilds the HZB
    // from the current frame's own depth and retests exactly the clusters
    // the main pass culled for occlusion; the column is now open.
    let rebuilt_hzb = HzbRow { texels: vec![0.1; 8] };
    assert!(!hzb_occludes(rebuilt_hzb.sample(far_quad_column), far_quad_depth));
}
