use glam::Vec2;
use glam::Vec3;

/// Octahedral direction encoding, shared by the probe atlas packer and its
/// GPU sampling shader (the "single source of truth" redesign flag, same
/// rationale as [`crate::toroidal`]).
pub fn encode(dir: Vec3) -> Vec2 {
    let dir = dir / (dir.x.abs() + dir.y.abs() + dir.z.abs());
    let mut result = Vec2::new(dir.x, dir.y);
    if dir.z < 0.0 {
        result = Vec2::new(
            (1.0 - dir.y.abs()) * signed_or_one(dir.x),
            (1.0 - dir.x.abs()) * signed_or_one(dir.y),
        );
    }
    result
}

pub fn decode(encoded: Vec2) -> Vec3 {
    let mut dir = Vec3::new(encoded.x, encoded.y, 1.0 - encoded.x.abs() - encoded.y.abs());
    if dir.z < 0.0 {
        let x = (1.0 - encoded.y.abs()) * signed_or_one(encoded.x);
        let y = (1.0 - encoded.x.abs()) * signed_or_one(encoded.y);
        dir.x = x;
        dir.y = y;
    }
    dir.normalize()
}

fn signed_or_one(v: f32) -> f32 {
    if v >= 0.0 { 1.0 } else { -1.0 }
}

/// Maps an octahedral `[-1, 1]^2` coordinate to a texel index within a
/// `side x side` probe block, used to address the flattened radiance atlas.
pub fn block_texel(encoded: Vec2, side: u32) -> (u32, u32) {
    let u = ((encoded.x * 0.5 + 0.5) * side as f32).clamp(0.0, side as f32 - 1.0) as u32;
    let v = ((encoded.y * 0.5 + 0.5) * side as f32).clamp(0.0, side as f32 - 1.0) as u32;
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_aligned_directions_round_trip() {
        for dir in [Vec3::X, Vec3::Y, Vec3::Z, -Vec3::X, -Vec3::Y, -Vec3::Z] {
            let encoded = encode(dir);
            let decoded = decode(encoded);
            assert!(decoded.dot(dir) > 0.99, "{dir:?} -> {decoded:?}");
        }
    }

    #[test]
    fn block_texel_stays_within_bounds() {
        for dir in [Vec3::new(1.0, 1.0, 1.0).normalize(), Vec3::new(-1.0, 0.3, -0.2).normalize()] {
            let (u, v) = block_texel(encode(dir), 8);
            assert!(u < 8 && v < 8);
        }
    }
}
