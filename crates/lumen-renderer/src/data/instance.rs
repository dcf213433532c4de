use bitflags::bitflags;
use bytemuck::{NoUninit, Zeroable};
use glam::Mat4;
use lumen_math::bounds::Sphere;

use super::handles::MeshId;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, NoUninit)]
    #[repr(C)]
    pub struct InstanceFlags: u32 {
        const VISIBLE        = 1 << 0;
        const CASTS_SHADOW   = 1 << 1;
        const RECEIVES_GI    = 1 << 2;
        const STATIC         = 1 << 3;
    }
}

/// CPU-side instance record: the renderer only holds a reference into the
/// caller's scene data (`spec.md` §3 ownership rule — instances are owned
/// by the scene, the renderer never takes ownership).
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: u32,
    pub mesh: MeshId,
    pub transform: Mat4,
    pub prev_transform: Mat4,
    pub bounds: Sphere,
    pub flags: InstanceFlags,
}

impl Instance {
    pub fn world_bounds(&self) -> Sphere {
        self.bounds.transformed(self.transform)
    }
}

/// GPU-resident instance record consumed by the culler and the visibility
/// resolve pass.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Zeroable, NoUninit)]
pub struct GpuInstance {
    pub transform: [[f32; 4]; 4],
    pub prev_transform: [[f32; 4]; 4],
    pub bounding_sphere: [f32; 4],
    pub hierarchy_offset: u32,
    pub cluster_offset: u32,
    pub cluster_count: u32,
    pub flags: u32,
}

impl GpuInstance {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}
