use crate::bounds::Sphere;
use glam::{Mat4, Vec4};

/// Six world-space frustum planes, normal pointing inward, extracted with
/// the Gribb-Hartmann method from a combined view-projection matrix.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_proj(view_proj: Mat4) -> Self {
        let rows = view_proj.transpose();
        let row = |i: usize| -> Vec4 {
            match i {
                0 => rows.x_axis,
                1 => rows.y_axis,
                2 => rows.z_axis,
                _ => rows.w_axis,
            }
        };

        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let mut planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near (reversed-Z: near is w = z)
            r3 - r2, // far
        ];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > f32::EPSILON {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Returns true if `sphere` is entirely outside at least one plane.
    pub fn cull_sphere(&self, sphere: Sphere) -> bool {
        self.planes.iter().any(|plane| {
            plane.truncate().dot(sphere.center) + plane.w < -sphere.radius
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn sphere_at_origin_survives_identity_frustum() {
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let frustum = Frustum::from_view_proj(proj * view);

        assert!(!frustum.cull_sphere(Sphere::new(Vec3::ZERO, 1.0)));
    }

    #[test]
    fn sphere_far_to_the_side_is_culled() {
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let frustum = Frustum::from_view_proj(proj * view);

        assert!(frustum.cull_sphere(Sphere::new(Vec3::new(1000.0, 0.0, 0.0), 1.0)));
    }
}
