use ash::vk;
use lumen_gpu::{
    Access, CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout,
};

use crate::error::{InitError, InitResult};

pub const HZB_FORMAT: vk::Format = vk::Format::R32_SFLOAT;

/// `floor(log2(max(w,h)))` levels, level 0 seeded from depth (`spec.md`
/// 4.D). Non-power-of-two extents fall back to the largest enclosing
/// power-of-two so every mip halves cleanly.
pub fn mip_count(width: u32, height: u32) -> u32 {
    let max_dim = width.max(height).max(1);
    32 - max_dim.leading_zeros()
}

pub fn enclosing_pow2_extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: width.next_power_of_two(),
        height: height.next_power_of_two(),
    }
}

/// Builds a single-channel hierarchical-Z pyramid with conservative-far
/// (reversed-Z: min) 2x2 downsampling. Mirrors the teacher's
/// `DepthReducePhase` two-pipeline split (an `initial_reduce` sampling the
/// depth buffer, a `reduce` sampling the previous pyramid mip) generalized
/// to an arbitrary mip count instead of a fixed resolution chain.
pub struct HzbBuilder {
    pub pyramid: Image,
    initial_reduce: Pipeline,
    reduce: Pipeline,
    layout: PipelineLayout,
    mip_count: u32,
}

impl HzbBuilder {
    pub fn create(
        device: &Device,
        extent: vk::Extent2D,
        layout: PipelineLayout,
        initial_reduce_shader: vk::ShaderModule,
        reduce_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let pow2_extent = enclosing_pow2_extent(extent.width, extent.height);
        let mip_count = mip_count(pow2_extent.width, pow2_extent.height);

        let mut pyramid = Image::create(
            device,
            &ImageRequest {
                extent: pow2_extent,
                format: HZB_FORMAT,
                mip_level_count: mip_count,
                usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
            },
        )
        .map_err(InitError::from)?;

        for mip in 0..mip_count {
            pyramid
                .create_view(device, mip, 1)
                .map_err(InitError::from)?;
        }

        let initial_reduce = Pipeline::create(
            device,
            &layout,
            PipelineKind::Compute {
                shader: initial_reduce_shader,
            },
        )
        .map_err(InitError::from)?;
        let reduce = Pipeline::create(
            device,
            &layout,
            PipelineKind::Compute {
                shader: reduce_shader,
            },
        )
        .map_err(InitError::from)?;

        Ok(Self {
            pyramid,
            initial_reduce,
            reduce,
            layout,
            mip_count,
        })
    }

    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    /// Rebuilds the pyramid image at a new screen extent, leaving the two
    /// reduce pipelines and layout untouched (`spec.md` 4.R resize
    /// contract: only size-dependent images are destroyed and recreated).
    pub fn resize(&mut self, device: &Device, extent: vk::Extent2D) -> InitResult<()> {
        self.pyramid.destroy(device);

        let pow2_extent = enclosing_pow2_extent(extent.width, extent.height);
        self.mip_count = mip_count(pow2_extent.width, pow2_extent.height);

        self.pyramid = Image::create(
            device,
            &ImageRequest {
                extent: pow2_extent,
                format: HZB_FORMAT,
                mip_level_count: self.mip_count,
                usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
            },
        )
        .map_err(InitError::from)?;
        for mip in 0..self.mip_count {
            self.pyramid.create_view(device, mip, 1).map_err(InitError::from)?;
        }
        Ok(())
    }

    /// Records the full reduce chain: depth -> mip 0, then mip `k` -> mip
    /// `k+1` for every remaining level. Each dispatch is separated by a
    /// barrier since level `k+1`'s read depends on level `k`'s write.
    pub fn record(&self, device: &Device, cmd: &mut CommandBuffer, depth: &Image) {
        cmd.ensure_image_layouts(
            device,
            &[
                (
                    depth,
                    Access::DEPTH_BUFFER_RENDER,
                    Access::COMPUTE_READ,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                ),
                (
                    &self.pyramid,
                    Access::NONE,
                    Access::COMPUTE_WRITE,
                    vk::ImageLayout::GENERAL,
                ),
            ],
        );

        cmd.bind_pipeline(
            device,
            vk::PipelineBindPoint::COMPUTE,
            self.initial_reduce.pipeline,
        );
        dispatch_mip(device, cmd, self.pyramid.extent, 0);

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.reduce.pipeline);
        for mip in 1..self.mip_count {
            cmd.pipeline_barriers(
                device,
                &[lumen_gpu::ImageBarrier {
                    image: &self.pyramid,
                    src: Access::COMPUTE_WRITE,
                    dst: Access::COMPUTE_READ,
                    new_layout: vk::ImageLayout::GENERAL,
                }],
                &[],
            );
            dispatch_mip(device, cmd, self.pyramid.extent, mip);
        }

        cmd.ensure_image_layouts(
            device,
            &[(
                &self.pyramid,
                Access::COMPUTE_WRITE,
                Access::COMPUTE_READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )],
        );
    }

    pub fn destroy(&mut self, device: &Device) {
        self.pyramid.destroy(device);
        self.initial_reduce.destroy(device);
        self.reduce.destroy(device);
        self.layout.destroy(device);
    }
}

fn dispatch_mip(device: &Device, cmd: &CommandBuffer, base_extent: vk::Extent2D, mip: u32) {
    let width = (base_extent.width >> mip).max(1);
    let height = (base_extent.height >> mip).max(1);
    cmd.dispatch(device, div_ceil(width, 8), div_ceil(height, 8), 1);
}

fn div_ceil(value: u32, denom: u32) -> u32 {
    (value + denom - 1) / denom
}

/// Which mip a conservative HZB occlusion test should sample: the coarsest
/// level whose texel footprint still covers the projected AABB, so a
/// single 2x2 tap sees the full bound (`spec.md` 4.E).
pub fn mip_for_aabb_extent(aabb_extent_px: f32, mip_count: u32) -> u32 {
    if aabb_extent_px <= 1.0 {
        return 0;
    }
    (aabb_extent_px.log2().ceil() as u32).min(mip_count.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_matches_power_of_two_chain() {
        assert_eq!(mip_count(1, 1), 1);
        assert_eq!(mip_count(1024, 1024), 11);
        assert_eq!(mip_count(1920, 1080), mip_count(2048, 2048));
    }

    #[test]
    fn npot_extent_rounds_up_to_enclosing_power_of_two() {
        let extent = enclosing_pow2_extent(1920, 1080);
        assert_eq!(extent, vk::Extent2D { width: 2048, height: 2048 });
    }

    #[test]
    fn larger_aabb_picks_coarser_mip() {
        let small = mip_for_aabb_extent(2.0, 11);
        let large = mip_for_aabb_extent(256.0, 11);
        assert!(large > small);
    }

    #[test]
    fn mip_selection_never_exceeds_available_levels() {
        assert_eq!(mip_for_aabb_extent(1_000_000.0, 11), 10);
    }
}
