use glam::{IVec3, Vec3};

/// Mirrors the defaults in the original engine's `SDFConfig`
/// (`defaultMeshResolution = 64`, `meshPadding = 0.1`).
#[derive(Debug, Clone, Copy)]
pub struct MeshSdfConfig {
    pub resolution: u32,
    pub padding: f32,
}

impl Default for MeshSdfConfig {
    fn default() -> Self {
        Self {
            resolution: 64,
            padding: 0.1,
        }
    }
}

pub struct MeshSdfVolume {
    pub resolution: IVec3,
    pub voxel_size: f32,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    pub voxels: Vec<f32>,
}

impl MeshSdfVolume {
    pub fn voxel_index(&self, x: i32, y: i32, z: i32) -> usize {
        let res = self.resolution;
        (z as usize * res.y as usize + y as usize) * res.x as usize + x as usize
    }
}

/// Closest distance from `p` to triangle `(a, b, c)`, using the standard
/// clamped-barycentric projection (matches
/// `SDFGenerator::pointTriangleDistance` in the reference implementation).
pub fn point_triangle_distance(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return ap.length();
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return bp.length();
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (p - (a + ab * v)).length();
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return cp.length();
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (p - (a + ac * w)).length();
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (p - (b + (c - b) * w)).length();
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (p - (a + ab * v + ac * w)).length()
}

/// Returns the sign of the winding of the nearest triangle relative to the
/// sample point, used to turn the unsigned point-triangle distance into a
/// signed field (negative = inside).
fn nearest_triangle_normal_sign(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let normal = (b - a).cross(c - a);
    if normal.length_squared() < f32::EPSILON {
        return 1.0;
    }
    normal.dot(p - a).signum()
}

/// Voxelizes a triangle mesh into a signed distance volume by brute-force
/// min-distance-to-any-triangle per voxel. This is the CPU fallback path;
/// the GPU path in `lumen-renderer` parallelizes the same per-voxel query
/// over a compute dispatch. Grounded on `SDFGenerator::generateSDFCPU` in
/// the reference implementation.
pub fn generate_mesh_sdf_cpu(
    positions: &[Vec3],
    indices: &[u32],
    config: MeshSdfConfig,
) -> MeshSdfVolume {
    let mut bounds_min = Vec3::splat(f32::MAX);
    let mut bounds_max = Vec3::splat(f32::MIN);
    for &p in positions {
        bounds_min = bounds_min.min(p);
        bounds_max = bounds_max.max(p);
    }

    let extent = (bounds_max - bounds_min).max(Vec3::splat(f32::EPSILON));
    let padding = extent * config.padding;
    bounds_min -= padding;
    bounds_max += padding;

    let res = config.resolution.max(1) as i32;
    let resolution = IVec3::splat(res);
    let voxel_size = (bounds_max - bounds_min).max_element() / res as f32;

    let mut voxels = vec![0.0f32; (res * res * res) as usize];

    for z in 0..res {
        for y in 0..res {
            for x in 0..res {
                let sample = bounds_min
                    + Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5) * voxel_size;

                let mut best_dist = f32::MAX;
                let mut best_sign = 1.0f32;

                for tri in indices.chunks_exact(3) {
                    let a = positions[tri[0] as usize];
                    let b = positions[tri[1] as usize];
                    let c = positions[tri[2] as usize];

                    let dist = point_triangle_distance(sample, a, b, c);
                    if dist < best_dist {
                        best_dist = dist;
                        best_sign = nearest_triangle_normal_sign(sample, a, b, c);
                    }
                }

                let index = (z * resolution.y + y) * resolution.x + x;
                voxels[index as usize] = best_dist * best_sign;
            }
        }
    }

    MeshSdfVolume {
        resolution,
        voxel_size,
        bounds_min,
        bounds_max,
        voxels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube() -> (Vec<Vec3>, Vec<u32>) {
        let positions = vec![
            Vec3::new(-0.5, -0.5, -0.5),
            Vec3::new(0.5, -0.5, -0.5),
            Vec3::new(0.5, 0.5, -0.5),
            Vec3::new(-0.5, 0.5, -0.5),
            Vec3::new(-0.5, -0.5, 0.5),
            Vec3::new(0.5, -0.5, 0.5),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(-0.5, 0.5, 0.5),
        ];
        let indices = vec![
            0, 1, 2, 0, 2, 3, // back
            4, 6, 5, 4, 7, 6, // front
            0, 4, 5, 0, 5, 1, // bottom
            3, 2, 6, 3, 6, 7, // top
            0, 3, 7, 0, 7, 4, // left
            1, 5, 6, 1, 6, 2, // right
        ];
        (positions, indices)
    }

    #[test]
    fn center_voxel_is_inside_a_closed_cube() {
        let (positions, indices) = unit_cube();
        let volume = generate_mesh_sdf_cpu(
            &positions,
            &indices,
            MeshSdfConfig {
                resolution: 16,
                padding: 0.2,
            },
        );

        let center = volume.resolution.x / 2;
        let idx = volume.voxel_index(center, center, center);
        assert!(volume.voxels[idx] < 0.0, "center of a closed cube should be inside (negative)");
    }

    #[test]
    fn corner_voxel_is_outside() {
        let (positions, indices) = unit_cube();
        let volume = generate_mesh_sdf_cpu(
            &positions,
            &indices,
            MeshSdfConfig {
                resolution: 16,
                padding: 0.2,
            },
        );

        let idx = volume.voxel_index(0, 0, 0);
        assert!(volume.voxels[idx] > 0.0, "padded corner voxel should be outside (positive)");
    }
}
