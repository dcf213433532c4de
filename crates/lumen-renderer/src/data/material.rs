use bytemuck::{NoUninit, Zeroable};

/// Bindless PBR material, addressed by `u32` index from the material
/// binning pass. Fixed 48-byte layout per `spec.md` §6.
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable, NoUninit)]
pub struct Material {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub roughness: f32,
    pub metallic: f32,
    pub albedo_texture: u32,
    pub normal_texture: u32,
    pub orm_texture: u32,
}

impl Material {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

const _: () = assert!(Material::SIZE == 48);

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    Directional = 0,
    Point = 1,
    Spot = 2,
}

/// Fixed 64-byte light record, covering directional/point/spot with the
/// fields each needs; unused fields are left zeroed rather than branching
/// the layout per type, so one buffer and one stride serve every light.
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable, NoUninit)]
pub struct Light {
    pub position: [f32; 3],
    pub range: f32,
    pub direction: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub light_type: u32,
    pub inner_cone_cos: f32,
    pub outer_cone_cos: f32,
    pub shadow_map_index: u32,
    pub _pad: u32,
}

impl Light {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

const _: () = assert!(Light::SIZE == 64);
