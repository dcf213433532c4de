use glam::{Mat4, Vec3, Vec4};

/// A bounding sphere used throughout the cluster hierarchy and instance list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere enclosing both `self` and `other`. Used when merging cluster
    /// bounds up the hierarchy.
    pub fn merge(self, other: Self) -> Self {
        let diff = other.center - self.center;
        let dist = diff.length();

        if dist + other.radius <= self.radius {
            return self;
        }
        if dist + self.radius <= other.radius {
            return other;
        }

        let radius = (self.radius + other.radius + dist) * 0.5;
        let center = if dist > f32::EPSILON {
            self.center + diff * ((radius - self.radius) / dist)
        } else {
            self.center
        };

        Self { center, radius }
    }

    pub fn transformed(self, transform: Mat4) -> Self {
        let center = transform.transform_point3(self.center);
        let scale = transform.x_axis.truncate().length().max(
            transform
                .y_axis
                .truncate()
                .length()
                .max(transform.z_axis.truncate().length()),
        );
        Self {
            center,
            radius: self.radius * scale,
        }
    }
}

/// A cone used to reject back-facing clusters before rasterization.
///
/// `axis` is the average outward normal direction, `cutoff` is the cosine
/// of the half-angle beyond which the cluster can never face the viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalCone {
    pub axis: Vec3,
    pub cutoff: f32,
}

impl NormalCone {
    /// Returns true if the cluster is guaranteed to be back-facing from
    /// `view_pos` given its bounding sphere, per the Nanite cluster culling
    /// cone test: a cluster can be culled only if every point on it faces
    /// away from the viewer, which holds when the view direction from the
    /// sphere surface closest to the camera still falls outside the cone.
    pub fn is_backfacing(&self, sphere: Sphere, view_pos: Vec3) -> bool {
        if self.cutoff >= 1.0 {
            // Degenerate cone (flat or single-sided geometry): never cull.
            return false;
        }

        let to_view = view_pos - sphere.center;
        let dist = to_view.length();
        if dist <= sphere.radius {
            return false;
        }

        let cos_angle = self.axis.dot(to_view) / dist;
        let sin_angle_cutoff = (1.0 - self.cutoff * self.cutoff).sqrt();
        let sin_angle = sphere.radius / dist;

        cos_angle < -(sin_angle_cutoff + sin_angle).min(1.0)
    }
}

/// Axis-aligned rectangle used by the 2D atlas packers (surface cache,
/// virtual shadow map physical pages).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2i,
    pub max: Vec2i,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vec2i {
    pub x: i32,
    pub y: i32,
}

impl Vec2i {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Rect {
    pub const fn from_size(min: Vec2i, width: i32, height: i32) -> Self {
        Self {
            min,
            max: Vec2i::new(min.x + width, min.y + height),
        }
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> i32 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }
}

/// Visibility-entry depth encoding: reversed-Z float depth packed into a
/// 17-bit integer ordinal, preserving monotonic ordering for the atomic-max
/// tie-break used by the rasterizer (see `lumen_renderer::visibility`).
pub fn quantize_depth_17bit(depth: f32) -> u32 {
    debug_assert!((0.0..=1.0).contains(&depth));
    (depth * ((1u32 << 17) - 1) as f32).round() as u32
}

pub fn plane_from_vec4(v: Vec4) -> Vec4 {
    v / v.truncate().length()
}
