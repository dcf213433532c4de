use ash::vk;
use bytemuck::{NoUninit, Zeroable};
use glam::{Mat4, Vec4};
use lumen_gpu::{
    Access, Buffer, BufferKind, BufferRequest, CommandBuffer, Device, Pipeline, PipelineKind,
    PipelineLayout,
};

use crate::error::{InitError, InitResult};
use crate::traits::CameraBlock;

/// Matches the reference `CullPushConstants` layout bit-for-bit: `viewProj;
/// frustumPlanes[6]; cameraPosition(xyz=pos,w=near); screenParams(x=width,
/// y=height,z=lodScale,w=errorThreshold); clusterCount; nodeCount;
/// frameIndex; flags` (`spec.md` §6).
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Zeroable, NoUninit)]
pub struct CullPushConstants {
    pub view_proj: [[f32; 4]; 4],
    pub frustum_planes: [[f32; 4]; 6],
    pub camera_position_near: [f32; 4],
    pub screen_params: [f32; 4],
    pub cluster_count: u32,
    pub node_count: u32,
    pub frame_index: u32,
    pub flags: u32,
}

impl CullPushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(
        camera: &CameraBlock,
        screen_width: f32,
        screen_height: f32,
        error_threshold: f32,
        cluster_count: u32,
        node_count: u32,
        frame_index: u32,
        flags: CullFlags,
    ) -> Self {
        Self {
            view_proj: camera.view_proj.to_cols_array_2d(),
            frustum_planes: camera.frustum_planes.map(Vec4::to_array),
            camera_position_near: [
                camera.position.x,
                camera.position.y,
                camera.position.z,
                camera.near,
            ],
            screen_params: [screen_width, screen_height, 1.0, error_threshold],
            cluster_count,
            node_count,
            frame_index,
            flags: flags.bits(),
        }
    }
}

const _: () = assert!(CullPushConstants::SIZE % 16 == 0);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CullFlags: u32 {
        const POST_PASS     = 1 << 0;
        const FREEZE_CULLING = 1 << 1;
    }
}

/// The per-frame transient queues the culler reads and writes, sized once
/// at init per `RenderConfig::max_candidate_nodes`/`max_visible_clusters`
/// and reset with a `vkCmdFillBuffer` at frame begin rather than
/// recreated (the "allocation of transient per-frame queues" redesign
/// flag).
pub struct CullQueues {
    pub candidate_nodes: Buffer,
    pub candidate_clusters: Buffer,
    pub visible_clusters: Buffer,
    pub counters: Buffer,
    pub indirect_dispatch: Buffer,
}

impl CullQueues {
    pub fn create(
        device: &Device,
        max_candidate_nodes: u32,
        max_visible_clusters: u32,
    ) -> InitResult<Self> {
        let make = |size: vk::DeviceSize| -> InitResult<Buffer> {
            Buffer::create(
                device,
                &BufferRequest {
                    size,
                    kind: BufferKind::Storage,
                },
            )
            .map_err(InitError::from)
        };

        Ok(Self {
            candidate_nodes: make(max_candidate_nodes as vk::DeviceSize * 4)?,
            candidate_clusters: make(max_candidate_nodes as vk::DeviceSize * 4)?,
            visible_clusters: make(max_visible_clusters as vk::DeviceSize * 8)?,
            counters: make(16)?,
            indirect_dispatch: make(std::mem::size_of::<vk::DispatchIndirectCommand>() as vk::DeviceSize)?,
        })
    }

    /// Resets every counter/index to zero without reallocating, per the
    /// per-frame suballocator redesign flag.
    pub fn reset(&self, device: &Device, cmd: &CommandBuffer) {
        cmd.fill_buffer(device, self.counters.buffer, 0);
        cmd.fill_buffer(device, self.indirect_dispatch.buffer, 0);
    }

    pub fn destroy(&self, device: &Device) {
        self.candidate_nodes.destroy(device);
        self.candidate_clusters.destroy(device);
        self.visible_clusters.destroy(device);
        self.counters.destroy(device);
        self.indirect_dispatch.destroy(device);
    }
}

/// Two-pass hierarchical cluster culler (`spec.md` 4.E): a main pass that
/// culls against the previous frame's reprojected HZB, and a post pass
/// (run after the new HZB is built) that re-admits anything the main pass
/// rejected only for occlusion, catching newly-disoccluded geometry within
/// the same frame.
pub struct Culler {
    main_pass: Pipeline,
    post_pass: Pipeline,
    layout: PipelineLayout,
}

impl Culler {
    pub fn create(
        device: &Device,
        layout: PipelineLayout,
        main_shader: vk::ShaderModule,
        post_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let main_pass = Pipeline::create(device, &layout, PipelineKind::Compute { shader: main_shader })
            .map_err(InitError::from)?;
        let post_pass = Pipeline::create(device, &layout, PipelineKind::Compute { shader: post_shader })
            .map_err(InitError::from)?;
        Ok(Self {
            main_pass,
            post_pass,
            layout,
        })
    }

    pub fn record_main_pass(
        &self,
        device: &Device,
        cmd: &CommandBuffer,
        push_constants: &CullPushConstants,
        instance_count: u32,
    ) {
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.main_pass.pipeline);
        cmd.push_constants(device, self.layout.layout, vk::ShaderStageFlags::COMPUTE, push_constants);
        cmd.dispatch(device, div_ceil(instance_count, 64), 1, 1);
    }

    pub fn record_post_pass(
        &self,
        device: &Device,
        cmd: &CommandBuffer,
        push_constants: &CullPushConstants,
        instance_count: u32,
    ) {
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.post_pass.pipeline);
        cmd.push_constants(device, self.layout.layout, vk::ShaderStageFlags::COMPUTE, push_constants);
        cmd.dispatch(device, div_ceil(instance_count, 64), 1, 1);
    }

    /// Barrier between the main pass's queue writes and the rasterizer's
    /// reads that happen before the post pass (the new HZB must finish
    /// building, and the main-pass visible-cluster writes must land,
    /// before the post pass appends more entries to the same buffer).
    pub fn barrier_between_passes(&self, device: &Device, cmd: &CommandBuffer, queues: &CullQueues) {
        cmd.pipeline_barriers(
            device,
            &[],
            &[lumen_gpu::BufferBarrier {
                buffer: queues.visible_clusters.buffer,
                src: Access::COMPUTE_WRITE,
                dst: Access::COMPUTE_WRITE,
            }],
        );
    }

    pub fn destroy(&self, device: &Device) {
        self.main_pass.destroy(device);
        self.post_pass.destroy(device);
        self.layout.destroy(device);
    }
}

fn div_ceil(value: u32, denom: u32) -> u32 {
    (value + denom - 1) / denom
}

/// Conservative HZB occlusion test (`spec.md` 4.E): the sphere's nearest
/// possible surface (`sphere_far_depth`) is occluded only if the sampled
/// HZB texel is strictly nearer in reversed-Z terms (smaller value), a
/// direction that only ever produces false negatives, never a wrongly
/// culled visible cluster.
pub fn hzb_occludes(closest_surface_depth: f32, sphere_far_depth: f32) -> bool {
    closest_surface_depth > sphere_far_depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_layout_is_16_byte_aligned() {
        assert_eq!(CullPushConstants::SIZE % 16, 0);
    }

    #[test]
    fn nearer_hzb_sample_occludes_farther_sphere() {
        assert!(hzb_occludes(0.9, 0.1));
    }

    #[test]
    fn equal_depth_does_not_occlude() {
        assert!(!hzb_occludes(0.5, 0.5));
    }

    #[test]
    fn farther_hzb_sample_never_occludes() {
        assert!(!hzb_occludes(0.1, 0.9));
    }
}
