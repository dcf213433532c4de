use glam::{Mat4, Vec3, Vec4};
use lumen_gpu::shader_cache::CompiledShader;

/// What the collaborator-provided GPU context must expose: device/allocator
/// access and command-buffer acquire/submit. `lumen_gpu::Device` implements
/// this for the real Vulkan backend; tests can stub it.
pub trait GpuContext {
    fn device(&self) -> &lumen_gpu::Device;
}

/// The external shader source compiler (`spec.md` §6): takes preprocessed
/// source plus a permutation's `defines` and produces SPIR-V and
/// reflection. The core only ever calls this on a `ShaderCache` miss.
pub trait ShaderCompiler {
    fn compile(
        &self,
        source: &str,
        stage: ash::vk::ShaderStageFlags,
        defines: &[(String, String)],
        include_paths: &[std::path::PathBuf],
    ) -> eyre::Result<CompiledShader>;
}

/// Read-only per-frame access to the caller's scene: meshes, instances,
/// lights, materials. The renderer never mutates scene data; it only
/// reads it once per frame when building its own GPU-resident copies.
pub trait SceneSource {
    fn instances(&self) -> &[crate::data::Instance];
    fn lights(&self) -> &[crate::data::Light];
    fn materials(&self) -> &[crate::data::Material];
}

/// The camera block of the per-frame `FrameContext`: the matrices a shader
/// needs directly, plus the previous-frame view-projection the temporal
/// system needs for reprojection.
#[derive(Debug, Clone, Copy)]
pub struct CameraBlock {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub prev_view_proj: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
    pub fov_y: f32,
    pub aspect: f32,
    pub frustum_planes: [Vec4; 6],
}

#[derive(Debug, Clone, Copy)]
pub struct SunLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Everything the Frame Orchestrator consumes for one frame (`spec.md`
/// §6). The scene's lights/instances/materials come through `SceneSource`
/// separately since they change less often than the camera block.
pub struct FrameContext {
    pub frame_index: u32,
    pub delta_seconds: f32,
    pub total_seconds: f32,
    pub camera: CameraBlock,
    pub sun: SunLight,
    pub ambient: AmbientLight,
}
