/// Shared CPU/GPU helper for toroidal (wrap-around) addressing, used by
/// both the radiance clipmap scroll and its GPU injection shader so the two
/// sides never disagree on the remap rule (the "single source of truth"
/// redesign flag).
pub fn toroidal_wrap(coord: i32, offset: i32, resolution: i32) -> i32 {
    (coord + offset).rem_euclid(resolution)
}

/// How many voxels (and along which axes) the clipmap must scroll given a
/// camera move, so a level only re-injects the slab that became stale.
pub fn scroll_delta(prev_origin: [i32; 3], new_origin: [i32; 3]) -> [i32; 3] {
    [
        new_origin[0] - prev_origin[0],
        new_origin[1] - prev_origin[1],
        new_origin[2] - prev_origin[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_negative_and_positive() {
        assert_eq!(toroidal_wrap(0, -1, 8), 7);
        assert_eq!(toroidal_wrap(7, 1, 8), 0);
        assert_eq!(toroidal_wrap(3, 3, 8), 6);
    }

    #[test]
    fn one_voxel_translation_preserves_addressing_identity() {
        // Translating the window by exactly one voxel and then the inverse
        // amount must return every coordinate to its original slot.
        for c in 0..8 {
            let shifted = toroidal_wrap(c, 1, 8);
            let back = toroidal_wrap(shifted, -1, 8);
            assert_eq!(back, c);
        }
    }
}
